//! Gemini LLM Provider
//!
//! Implementation of `LlmProvider` for the Google Generative Language API
//! (`models/{model}:generateContent`).

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{Completion, FinishReason, GenerationOptions, LlmProvider, ModelPricing, TokenUsage},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::http::{RuntimeSettings, build_client, status_error, transport_error};
use crate::retry::with_retry;

const PROVIDER: &str = "gemini";

/// Gemini chat provider
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    options: GenerationOptions,
    pricing: ModelPricing,
}

impl GeminiProvider {
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        settings: &RuntimeSettings,
    ) -> Result<Self> {
        Ok(Self {
            http: build_client(settings)?,
            api_key: api_key.into(),
            base_url: settings.gemini_base_url.trim_end_matches('/').to_string(),
            max_retries: settings.max_retries,
            options: Self::default_options(model),
            pricing: ModelPricing::FREE,
        })
    }

    #[must_use]
    pub const fn with_pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// temperature 0, 3000 output tokens, no streaming
    pub fn default_options(model: impl Into<String>) -> GenerationOptions {
        GenerationOptions {
            model: model.into(),
            temperature: 0.0,
            max_tokens: 3000,
            streaming: false,
        }
    }

    /// System messages become `systemInstruction`; everything else is folded
    /// into alternating user/model turns.
    fn build_request(messages: &[Message], options: &GenerationOptions) -> GenerateRequest {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut contents: Vec<Content> = Vec::new();
        for message in messages.iter().filter(|m| m.role != Role::System) {
            let role = match message.role {
                Role::Assistant => "model",
                _ => "user",
            };
            match contents.last_mut() {
                Some(last) if last.role.as_deref() == Some(role) => {
                    last.parts.push(Part { text: message.content.clone() });
                }
                _ => contents.push(Content {
                    role: Some(role.to_string()),
                    parts: vec![Part { text: message.content.clone() }],
                }),
            }
        }

        GenerateRequest {
            system_instruction: (!system.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part { text: system.join("\n\n") }],
            }),
            contents,
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
            },
        }
    }

    async fn send(&self, model: &str, request: &GenerateRequest) -> Result<Completion> {
        let response = self
            .http
            .post(format!("{}/models/{model}:generateContent", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(PROVIDER, status, &body));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("{PROVIDER} response: {e}")))?;
        parsed.into_completion(model)
    }
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn options(&self) -> &GenerationOptions {
        &self.options
    }

    fn pricing(&self) -> ModelPricing {
        self.pricing
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let request = Self::build_request(messages, options);
        let request = &request;
        let model = options.model.as_str();
        with_retry(self.max_retries, move || self.send(model, request)).await
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

impl GenerateResponse {
    fn into_completion(self, model: &str) -> Result<Completion> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider(format!("{PROVIDER} returned no candidates")))?;

        let content = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default();

        Ok(Completion {
            content,
            model: model.to_string(),
            usage: self
                .usage_metadata
                .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count)),
            finish_reason: candidate
                .finish_reason
                .map(|r| FinishReason::from_vendor(&r)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = GeminiProvider::default_options("gemini-pro");
        assert_eq!(opts.model, "gemini-pro");
        assert!(opts.temperature.abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens, 3000);
        assert!(!opts.streaming);
    }

    #[test]
    fn test_request_merges_turns_and_lifts_system() {
        let messages = vec![
            Message::system("Answer retail questions."),
            Message::user("What is the top brand?"),
            Message::assistant("```tool\n{\"tool\": \"sql_db_list_tables\"}\n```"),
            Message::tool("sql_db_list_tables", "retail_data"),
            Message::user("Thanks"),
        ];
        let options = GeminiProvider::default_options("gemini-pro");
        let body = serde_json::to_value(GeminiProvider::build_request(&messages, &options)).unwrap();

        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "Answer retail questions."
        );
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"].as_array().unwrap().len(), 2);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 3000);
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Total "}, {"text": "is 42"}]},
                            "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 20, "candidatesTokenCount": 4, "totalTokenCount": 24}
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let completion = parsed.into_completion("gemini-pro").unwrap();
        assert_eq!(completion.content, "Total is 42");
        assert_eq!(completion.usage, Some(TokenUsage::new(20, 4)));
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn test_empty_candidates_is_error() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(matches!(
            parsed.into_completion("gemini-pro"),
            Err(AgentError::Provider(_))
        ));
    }
}
