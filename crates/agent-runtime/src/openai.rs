//! OpenAI LLM Provider
//!
//! Implementation of `LlmProvider` for the OpenAI chat completions API.
//! Responses are streamed from the wire and assembled before returning.

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{Completion, FinishReason, GenerationOptions, LlmProvider, ModelPricing, TokenUsage},
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::http::{RuntimeSettings, build_client, status_error, transport_error};
use crate::retry::with_retry;

const PROVIDER: &str = "openai";

/// OpenAI chat provider
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    options: GenerationOptions,
    pricing: ModelPricing,
}

impl OpenAiProvider {
    /// Create a client for `model` with the fixed OpenAI generation options
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        settings: &RuntimeSettings,
    ) -> Result<Self> {
        Ok(Self {
            http: build_client(settings)?,
            api_key: api_key.into(),
            base_url: settings.openai_base_url.trim_end_matches('/').to_string(),
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

    /// temperature 0.2, 3000 output tokens, streaming
    pub fn default_options(model: impl Into<String>) -> GenerationOptions {
        GenerationOptions {
            model: model.into(),
            temperature: 0.2,
            max_tokens: 3000,
            streaming: true,
        }
    }

    /// Convert agent messages to the wire format
    fn build_request<'a>(messages: &'a [Message], options: &'a GenerationOptions) -> ChatRequest<'a> {
        ChatRequest {
            model: &options.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: match m.role {
                        Role::System => "system",
                        Role::Assistant => "assistant",
                        // tool observations travel as user context in the text protocol
                        Role::User | Role::Tool => "user",
                    },
                    content: &m.content,
                })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: options.streaming,
            stream_options: options.streaming.then_some(StreamOptions { include_usage: true }),
        }
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<Completion> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(PROVIDER, status, &body));
        }

        if request.stream {
            let mut accumulator = StreamAccumulator::default();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| transport_error(PROVIDER, &e))?;
                accumulator.feed(&chunk)?;
            }
            accumulator.finish(request.model)
        } else {
            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| AgentError::Parse(format!("{PROVIDER} response: {e}")))?;
            Ok(parsed.into_completion(request.model))
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
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
        with_retry(self.max_retries, move || self.send(request)).await
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceContent>,
    #[serde(default)]
    delta: Option<ChoiceContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceContent {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        Self::new(usage.prompt_tokens, usage.completion_tokens)
    }
}

impl ChatResponse {
    fn into_completion(self, model: &str) -> Completion {
        let choice = self.choices.into_iter().next();
        Completion {
            content: choice
                .as_ref()
                .and_then(|c| c.message.as_ref())
                .and_then(|m| m.content.clone())
                .unwrap_or_default(),
            model: model.to_string(),
            usage: self.usage.map(Into::into),
            finish_reason: choice
                .and_then(|c| c.finish_reason)
                .map(|r| FinishReason::from_vendor(&r)),
        }
    }
}

/// Assembles server-sent event chunks into one completion
#[derive(Debug, Default)]
struct StreamAccumulator {
    pending: Vec<u8>,
    content: String,
    usage: Option<TokenUsage>,
    finish_reason: Option<String>,
    done: bool,
}

impl StreamAccumulator {
    fn feed(&mut self, bytes: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.handle_line(String::from_utf8_lossy(&line).trim())?;
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Result<()> {
        let Some(data) = line.strip_prefix("data:") else {
            // blank separators, comments and other SSE fields
            return Ok(());
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return Ok(());
        }

        let chunk: ChatResponse = serde_json::from_str(data)
            .map_err(|e| AgentError::Parse(format!("{PROVIDER} stream chunk: {e}")))?;
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage.into());
        }
        for choice in chunk.choices {
            if let Some(text) = choice.delta.and_then(|d| d.content) {
                self.content.push_str(&text);
            }
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
        }
        Ok(())
    }

    fn finish(mut self, model: &str) -> Result<Completion> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.handle_line(String::from_utf8_lossy(&rest).trim())?;
        }
        if !self.done && self.finish_reason.is_none() {
            return Err(AgentError::ProviderUnavailable(format!(
                "{PROVIDER} stream ended early"
            )));
        }
        Ok(Completion {
            content: self.content,
            model: model.to_string(),
            usage: self.usage,
            finish_reason: self.finish_reason.map(|r| FinishReason::from_vendor(&r)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = OpenAiProvider::default_options("gpt-4o");
        assert_eq!(opts.model, "gpt-4o");
        assert!((opts.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens, 3000);
        assert!(opts.streaming);
    }

    #[test]
    fn test_request_body() {
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("Hello"),
            Message::tool("sql_db_query", "[Tool 'sql_db_query' returned]\n[(1,)]"),
        ];
        let options = OpenAiProvider::default_options("gpt-4o");
        let body = serde_json::to_value(OpenAiProvider::build_request(&messages, &options)).unwrap();

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["role"], "user");
    }

    #[test]
    fn test_stream_accumulation_across_split_chunks() {
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Abid\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"jan é\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":3,\"total_tokens\":15}}\n\n",
            "data: [DONE]\n\n",
        )
        .as_bytes();

        let mut acc = StreamAccumulator::default();
        // split inside a multi-byte character
        let split = sse.iter().position(|b| *b == 0xC3).unwrap() + 1;
        acc.feed(&sse[..split]).unwrap();
        acc.feed(&sse[split..]).unwrap();

        let completion = acc.finish("gpt-4o").unwrap();
        assert_eq!(completion.content, "Abidjan é");
        assert_eq!(completion.usage, Some(TokenUsage::new(12, 3)));
        assert_eq!(completion.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn test_truncated_stream_is_retryable() {
        let mut acc = StreamAccumulator::default();
        acc.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n").unwrap();
        let err = acc.finish("gpt-4o").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_non_streaming_response() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"Hi"},"finish_reason":"length"}],
                      "usage":{"prompt_tokens":5,"completion_tokens":1,"total_tokens":6}}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let completion = parsed.into_completion("gpt-4o");
        assert_eq!(completion.content, "Hi");
        assert_eq!(completion.usage.map(|u| u.total_tokens), Some(6));
        assert_eq!(completion.finish_reason, Some(FinishReason::Length));
    }
}
