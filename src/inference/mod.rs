pub mod providers;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Vision model provider types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ModelProvider {
    OpenAI,
    Gemini,
}

/// Vision/text model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::OpenAI,
            endpoint: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2048,
            temperature: 0.2,
            timeout_seconds: 45,
        }
    }
}

/// A still image handed to a vision-capable inference call
#[derive(Debug, Clone)]
pub struct InferenceImage {
    pub data: Vec<u8>,
    pub media_type: String,
}

/// One exercise as inferred by the model.
///
/// Every field is untrusted: the model returns best-effort JSON with no
/// schema guarantee, so parsing defaults anything missing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferredExercise {
    /// Free-text exercise name as seen in the video
    #[serde(default)]
    pub name: String,

    /// Number of sets
    #[serde(default = "default_sets")]
    pub sets: u32,

    /// Single rep target, used when reps are uniform across sets
    #[serde(default)]
    pub reps: Option<u32>,

    /// Per-set rep targets, when the video shows varying reps
    #[serde(default)]
    pub reps_per_set: Option<Vec<u32>>,

    /// Free-text weight description ("60kg", "bodyweight", "2x20lb DBs")
    #[serde(default)]
    pub weight: Option<String>,

    /// Free-text notes (tempo, rest, cues)
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_sets() -> u32 {
    3
}

impl Default for InferredExercise {
    fn default() -> Self {
        Self {
            name: String::new(),
            sets: default_sets(),
            reps: None,
            reps_per_set: None,
            weight: None,
            notes: None,
        }
    }
}

/// Full workout as inferred by the model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferredWorkout {
    #[serde(default)]
    pub workout_name: Option<String>,

    #[serde(default)]
    pub exercises: Vec<InferredExercise>,

    /// Model's own 0-1 estimate of how well the video supported the
    /// extraction; absent when the model omits it
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Trait for vision-capable inference providers.
///
/// One call contract: text plus optional images in, best-effort exercise
/// list out. Prompt content and model choice are implementation details
/// behind this seam.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn infer_workout(&self, text: &str, images: &[InferenceImage]) -> Result<InferredWorkout>;
    async fn is_available(&self) -> bool;
    fn provider_type(&self) -> ModelProvider;
}

/// Create a vision model instance based on configuration
pub fn create_model(config: &ModelConfig) -> Result<Box<dyn VisionModel>> {
    match config.provider {
        ModelProvider::OpenAI => Ok(Box::new(providers::OpenAIVisionProvider::new(config.clone())?)),
        ModelProvider::Gemini => Ok(Box::new(providers::GeminiVisionProvider::new(config.clone())?)),
    }
}

/// Instruction prompt shared by all providers
pub(crate) fn build_extraction_prompt(text: &str, image_count: usize) -> String {
    let mut prompt = String::from(
        "You are a fitness coach extracting a workout from a short-form video. \
         Return ONLY a JSON object of the form \
         {\"workout_name\": string|null, \"confidence\": number, \
         \"exercises\": [{\"name\": string, \
         \"sets\": number, \"reps\": number|null, \"reps_per_set\": [number]|null, \
         \"weight\": string|null, \"notes\": string|null}]}. \
         Set confidence between 0 and 1 for how clearly the video showed \
         the workout. \
         Use on-screen text as ground truth when it conflicts with anything else. \
         If no workout is shown, return an empty exercises array.\n\n",
    );

    if !text.trim().is_empty() {
        prompt.push_str("Video text (caption and on-screen overlays):\n");
        prompt.push_str(text.trim());
        prompt.push('\n');
    }

    if image_count > 0 {
        prompt.push_str(&format!(
            "\n{} still frames from the video are attached; read any visible \
             exercise names, set counts, and rep counts from them.\n",
            image_count
        ));
    }

    prompt
}

/// Parse a model response into an InferredWorkout.
///
/// Responses arrive as free text: code fences, leading prose, and missing
/// fields are all tolerated. An empty exercise list is an inference error.
pub fn parse_workout_response(content: &str) -> Result<InferredWorkout> {
    let cleaned = strip_code_fences(content);

    // Locate the outermost JSON object in the response
    let json_slice = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => return Err(anyhow!("model response contained no JSON object")),
    };

    let mut workout: InferredWorkout = serde_json::from_str(json_slice)
        .map_err(|e| anyhow!("failed to parse model response: {}", e))?;

    // Drop entries the model emitted without a usable name
    workout.exercises.retain(|ex| !ex.name.trim().is_empty());

    if workout.exercises.is_empty() {
        return Err(anyhow!("no exercises found in model response"));
    }

    Ok(workout)
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let response = r#"{"workout_name": "Leg Day", "exercises": [
            {"name": "Back Squat", "sets": 4, "reps": 8},
            {"name": "Walking Lunge", "sets": 3, "reps_per_set": [12, 10, 8]}
        ]}"#;

        let workout = parse_workout_response(response).unwrap();
        assert_eq!(workout.workout_name.as_deref(), Some("Leg Day"));
        assert_eq!(workout.exercises.len(), 2);
        assert_eq!(workout.exercises[0].reps, Some(8));
        assert_eq!(workout.exercises[1].reps_per_set, Some(vec![12, 10, 8]));
    }

    #[test]
    fn test_parse_fenced_json_with_prose() {
        let response = "Here is the workout:\n```json\n{\"exercises\": [{\"name\": \"Deadlift\"}]}\n```";
        let workout = parse_workout_response(response).unwrap();
        assert_eq!(workout.exercises.len(), 1);
        // Missing fields take defaults
        assert_eq!(workout.exercises[0].sets, 3);
        assert_eq!(workout.exercises[0].reps, None);
    }

    #[test]
    fn test_parse_rejects_empty_exercise_list() {
        assert!(parse_workout_response(r#"{"exercises": []}"#).is_err());
        assert!(parse_workout_response("no json here").is_err());
        // Entries without names are dropped and may empty the list
        assert!(parse_workout_response(r#"{"exercises": [{"name": "  "}]}"#).is_err());
    }

    #[test]
    fn test_prompt_mentions_frames_only_when_present() {
        let without = build_extraction_prompt("3x12 squats", 0);
        assert!(!without.contains("still frames"));

        let with = build_extraction_prompt("3x12 squats", 6);
        assert!(with.contains("6 still frames"));
    }
}
