use super::{
    build_extraction_prompt, parse_workout_response, InferenceImage, InferredWorkout, ModelConfig,
    ModelProvider, VisionModel,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// OpenAI chat-completions provider with vision support
pub struct OpenAIVisionProvider {
    config: ModelConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: u32,
}

impl OpenAIVisionProvider {
    pub fn new(config: ModelConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(anyhow!("OpenAI API key required"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        self.config
            .endpoint
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string())
    }

    /// Models listing URL on the same host as the configured endpoint, so
    /// availability checks work against OpenAI-compatible local servers
    fn models_endpoint(&self) -> String {
        let endpoint = self.endpoint();
        match endpoint.strip_suffix("/chat/completions") {
            Some(base) => format!("{}/models", base),
            None => "https://api.openai.com/v1/models".to_string(),
        }
    }
}

#[async_trait]
impl VisionModel for OpenAIVisionProvider {
    async fn infer_workout(&self, text: &str, images: &[InferenceImage]) -> Result<InferredWorkout> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("OpenAI API key not configured"))?;

        let prompt = build_extraction_prompt(text, images.len());

        // Vision requests use content parts: one text part plus a data-URI
        // image part per frame
        let mut parts = vec![json!({ "type": "text", "text": prompt })];
        for image in images {
            let data_uri = format!(
                "data:{};base64,{}",
                image.media_type,
                BASE64.encode(&image.data)
            );
            parts.push(json!({
                "type": "image_url",
                "image_url": { "url": data_uri }
            }));
        }

        let request = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": parts }],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        debug!(
            "Sending inference request to OpenAI ({} images)",
            images.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error {}: {}", status, text));
        }

        let openai_response: OpenAIResponse = response.json().await?;

        if let Some(usage) = &openai_response.usage {
            debug!("OpenAI inference used {} tokens", usage.total_tokens);
        }

        let content = openai_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow!("No response from OpenAI"))?;

        parse_workout_response(&content)
    }

    async fn is_available(&self) -> bool {
        if let Some(api_key) = &self.config.api_key {
            match self
                .client
                .get(self.models_endpoint())
                .header("Authorization", format!("Bearer {}", api_key))
                .send()
                .await
            {
                Ok(response) => response.status().is_success(),
                Err(_) => false,
            }
        } else {
            false
        }
    }

    fn provider_type(&self) -> ModelProvider {
        ModelProvider::OpenAI
    }
}

/// Gemini generateContent provider with inline image data
pub struct GeminiVisionProvider {
    config: ModelConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiVisionProvider {
    pub fn new(config: ModelConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(anyhow!("Gemini API key required"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl VisionModel for GeminiVisionProvider {
    async fn infer_workout(&self, text: &str, images: &[InferenceImage]) -> Result<InferredWorkout> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("Gemini API key not configured"))?;

        let prompt = build_extraction_prompt(text, images.len());

        let mut parts = vec![json!({ "text": prompt })];
        for image in images {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.media_type,
                    "data": BASE64.encode(&image.data),
                }
            }));
        }

        let request = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "maxOutputTokens": self.config.max_tokens,
                "temperature": self.config.temperature,
            }
        });

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.config.model, api_key
        );

        debug!(
            "Sending inference request to Gemini ({} images)",
            images.len()
        );

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error {}: {}", status, text));
        }

        let gemini_response: GeminiResponse = response.json().await?;

        let content = gemini_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.iter().find_map(|p| p.text.clone()))
            .ok_or_else(|| anyhow!("No response from Gemini"))?;

        parse_workout_response(&content)
    }

    async fn is_available(&self) -> bool {
        if let Some(api_key) = &self.config.api_key {
            let url = format!(
                "https://generativelanguage.googleapis.com/v1beta/models?key={}",
                api_key
            );

            match self.client.get(&url).send().await {
                Ok(response) => response.status().is_success(),
                Err(_) => false,
            }
        } else {
            false
        }
    }

    fn provider_type(&self) -> ModelProvider {
        ModelProvider::Gemini
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider_with_endpoint(endpoint: Option<&str>) -> OpenAIVisionProvider {
        OpenAIVisionProvider::new(ModelConfig {
            api_key: Some("test-key".to_string()),
            endpoint: endpoint.map(String::from),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_models_endpoint_follows_configured_host() {
        let provider = provider_with_endpoint(Some("http://localhost:1234/v1/chat/completions"));
        assert_eq!(
            provider.models_endpoint(),
            "http://localhost:1234/v1/models"
        );
    }

    #[test]
    fn test_models_endpoint_default() {
        let provider = provider_with_endpoint(None);
        assert_eq!(provider.models_endpoint(), "https://api.openai.com/v1/models");

        // An endpoint with an unrecognized path shape falls back too
        let provider = provider_with_endpoint(Some("http://localhost:1234/api/generate"));
        assert_eq!(provider.models_endpoint(), "https://api.openai.com/v1/models");
    }
}
