//! API data models

use crate::matcher::{CatalogExercise, MatchResult};
use crate::service::ProcessResult;
use serde::{Deserialize, Serialize};

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Pipeline result plus catalog match per inferred exercise
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    #[serde(flatten)]
    pub result: ProcessResult,

    /// One entry per exercise, same order
    pub matches: Vec<MatchResult>,
}

/// Manual correction of a single matched exercise
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    /// The match list as the client currently holds it
    pub matches: Vec<MatchResult>,

    /// Position being corrected
    pub index: usize,

    /// Catalog entry the user picked
    pub catalog_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub matches: Vec<MatchResult>,
}

/// One ranked catalog search candidate
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchHit {
    pub exercise: CatalogExercise,
    pub score: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

/// Health check payload
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub model_available: bool,
}
