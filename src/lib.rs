/// Workout Importer
///
/// Turns a shared short-form video link (TikTok, Instagram) into an
/// editable workout template: on-device page collection and frame
/// sampling, server-side scraping with anti-blocking fallbacks, vision
/// model inference, and exercise catalog matching with manual review.

pub mod api;
pub mod collector;
pub mod config;
pub mod inference;
pub mod matcher;
pub mod platform;
pub mod request;
pub mod service;

// Re-export main types for easy access
pub use crate::collector::{CollectedPageData, Collector, ExtractedFrame, PageRenderer};
pub use crate::config::Config;
pub use crate::inference::{create_model, InferredExercise, InferredWorkout, VisionModel};
pub use crate::matcher::{BuiltinCatalog, ExerciseCatalog, ExerciseMatcher, MatchResult};
pub use crate::platform::Platform;
pub use crate::request::ProcessRequest;
pub use crate::service::{InferencePath, ProcessResult, ProcessService};
