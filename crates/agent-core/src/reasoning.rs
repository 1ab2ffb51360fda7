//! Reasoning Loop
//!
//! Implements the ReAct (Reason + Act) pattern for agent behavior.
//! The agent observes, thinks, acts (via tools), and responds. Every model
//! reply is classified as a final answer, a tool invocation, or a malformed
//! tool call; malformed calls are reported back to the model instead of
//! failing the request.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};
use crate::provider::{Completion, LlmProvider, TokenUsage};
use crate::tool::{ToolCall, ToolResult, Toolbox};
use crate::usage::{UsageRecord, UsageTracker};

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt template
    pub system_prompt: String,

    /// Maximum model calls before giving up
    pub max_iterations: usize,

    /// Whether to append tool descriptions to system prompt
    pub inject_tool_descriptions: bool,

    /// Wall-clock budget for one `run`
    pub deadline: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: 15,
            inject_tool_descriptions: true,
            deadline: None,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant.

When you need to use a tool, respond with a JSON block in this exact format:
```tool
{"tool": "tool_name", "arguments": {"arg1": "value1"}}
```

After receiving tool results, synthesize them into a helpful response.
If you can answer directly without tools, do so.
Be concise and accurate."#;

const TOOL_BLOCK_OPEN: &str = "```tool";
const FENCE: &str = "```";

/// What the model asked for in one reply
#[derive(Clone, Debug)]
pub enum Decision {
    /// The reply is the final answer
    Final(String),
    /// The reply requests a tool call
    Invoke(ToolCall),
    /// The reply tried to call a tool but the block could not be parsed
    Malformed(String),
}

impl Decision {
    /// Classify a raw model reply
    pub fn parse(content: &str) -> Self {
        if let Some(start_idx) = content.find(TOOL_BLOCK_OPEN) {
            let after_marker = &content[start_idx + TOOL_BLOCK_OPEN.len()..];
            let Some(end_idx) = after_marker.find(FENCE) else {
                return Self::Malformed("the ```tool block is not closed".into());
            };
            let json_str = after_marker[..end_idx].trim();

            return match serde_json::from_str::<ToolCall>(json_str) {
                Ok(call) => Self::Invoke(with_call_id(call)),
                Err(e) => Self::Malformed(format!("invalid tool call JSON: {e}")),
            };
        }

        // Fallback: the whole reply is a bare JSON tool call
        let trimmed = content.trim();
        if trimmed.starts_with('{') && trimmed.contains(r#""tool""#) {
            if let Ok(call) = serde_json::from_str::<ToolCall>(trimmed) {
                return Self::Invoke(with_call_id(call));
            }
        }

        Self::Final(content.to_string())
    }
}

fn with_call_id(mut call: ToolCall) -> ToolCall {
    if call.id.is_none() {
        call.id = Some(uuid::Uuid::new_v4().to_string());
    }
    call
}

/// Outcome of a successful run
#[derive(Clone, Debug)]
pub struct AgentReply {
    /// Final answer text as produced by the model
    pub answer: String,

    /// Tokens and cost accumulated during the run
    pub usage: UsageRecord,

    /// Model calls it took
    pub iterations: usize,
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    toolbox: Arc<dyn Toolbox>,
    config: AgentConfig,
    memory: Conversation,
    usage: Arc<UsageTracker>,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        toolbox: Arc<dyn Toolbox>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            toolbox,
            config,
            memory: Conversation::new(),
            usage: Arc::new(UsageTracker::new()),
        }
    }

    /// Build the full system prompt including tool descriptions
    fn build_system_prompt(&self) -> String {
        let mut prompt = self.config.system_prompt.clone();

        if self.config.inject_tool_descriptions && !self.toolbox.schemas().is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.toolbox.prompt_section());
        }

        prompt
    }

    /// Answer one question, calling tools as the model requests.
    ///
    /// On success the question and answer are appended to this agent's memory.
    #[tracing::instrument(skip_all, fields(provider = self.provider.name(), model = %self.provider.options().model))]
    pub async fn run(&mut self, question: &str) -> Result<AgentReply> {
        let deadline = self.config.deadline.map(|budget| Instant::now() + budget);

        let mut scratch = Vec::with_capacity(self.memory.len() + 2);
        scratch.push(Message::system(self.build_system_prompt()));
        scratch.extend(self.memory.messages().iter().cloned());
        scratch.push(Message::user(question));

        for iteration in 1..=self.config.max_iterations {
            let completion = self.within_deadline(deadline, self.complete(&scratch)).await??;
            let content = completion.content;

            match Decision::parse(&content) {
                Decision::Final(answer) => {
                    tracing::debug!(iteration, "agent produced final answer");
                    self.memory.record_exchange(question, answer.clone());
                    return Ok(AgentReply {
                        answer,
                        usage: self.usage.snapshot(),
                        iterations: iteration,
                    });
                }
                Decision::Invoke(call) => {
                    tracing::debug!(iteration, tool = %call.name, "executing tool");
                    scratch.push(Message::assistant(&content));

                    let result = self.within_deadline(deadline, self.execute_tool(&call)).await?;
                    scratch.push(Message::tool(&call.name, Self::format_tool_result(&result)));
                }
                Decision::Malformed(reason) => {
                    tracing::warn!(iteration, %reason, "malformed tool call from model");
                    scratch.push(Message::assistant(&content));
                    scratch.push(Message::tool(
                        "parser",
                        format!(
                            "[Tool call could not be parsed]\n{reason}\n\
                             Reply with a single valid ```tool block, or with your final answer."
                        ),
                    ));
                }
            }
        }

        tracing::warn!(max = self.config.max_iterations, "iteration budget exhausted");
        Err(AgentError::MaxIterations(self.config.max_iterations))
    }

    async fn within_deadline<F: std::future::Future>(
        &self,
        deadline: Option<Instant>,
        fut: F,
    ) -> Result<F::Output> {
        match deadline {
            Some(at) => tokio::time::timeout_at(at, fut).await.map_err(|_| {
                AgentError::Timeout(self.config.deadline.unwrap_or_default())
            }),
            None => Ok(fut.await),
        }
    }

    /// One model call, with usage recorded
    async fn complete(&self, messages: &[Message]) -> Result<Completion> {
        let completion = self
            .provider
            .complete(messages, self.provider.options())
            .await?;

        let usage = completion.usage.unwrap_or_else(|| {
            let prompt: String = messages.iter().map(|m| m.content.as_str()).collect();
            TokenUsage::new(
                self.provider.estimate_tokens(&prompt),
                self.provider.estimate_tokens(&completion.content),
            )
        });
        self.usage.record(&usage, &self.provider.pricing());

        Ok(completion)
    }

    /// Execute a tool call; failures become observations for the model
    async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        let outcome = match self.toolbox.validate(call) {
            Ok(()) => self.toolbox.execute(call).await,
            Err(e) => Err(e),
        };

        let mut result = match outcome {
            Ok(result) => result,
            Err(AgentError::ToolNotFound(name)) => ToolResult::failure(
                &name,
                format!(
                    "Error: there is no tool named '{name}'. Available tools: {}",
                    self.toolbox.names().join(", ")
                ),
            ),
            Err(e) => ToolResult::failure(&call.name, format!("Error: {e}")),
        };
        result.id.clone_from(&call.id);
        result
    }

    /// Format tool result for conversation
    fn format_tool_result(result: &ToolResult) -> String {
        if result.success {
            format!("[Tool '{}' returned]\n{}", result.name, result.output)
        } else {
            format!("[Tool '{}' failed]\n{}", result.name, result.output)
        }
    }

    /// Conversation memory accumulated by this agent
    pub const fn memory(&self) -> &Conversation {
        &self.memory
    }

    /// Shared usage accumulator
    pub fn usage(&self) -> Arc<UsageTracker> {
        Arc::clone(&self.usage)
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    toolbox: Option<Arc<dyn Toolbox>>,
    config: AgentConfig,
    memory: Conversation,
    usage: Option<Arc<UsageTracker>>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            toolbox: None,
            config: AgentConfig::default(),
            memory: Conversation::new(),
            usage: None,
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn toolbox(mut self, toolbox: Arc<dyn Toolbox>) -> Self {
        self.toolbox = Some(toolbox);
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub const fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    #[must_use]
    pub const fn deadline(mut self, budget: Duration) -> Self {
        self.config.deadline = Some(budget);
        self
    }

    #[must_use]
    pub fn memory(mut self, memory: Conversation) -> Self {
        self.memory = memory;
        self
    }

    /// Share a usage tracker with tools that make their own model calls
    #[must_use]
    pub fn usage(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;
        let toolbox = self
            .toolbox
            .ok_or_else(|| AgentError::Config("Toolbox is required".into()))?;
        if self.config.max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be at least 1".into()));
        }

        let mut agent = Agent::new(provider, toolbox, self.config);
        agent.memory = self.memory;
        if let Some(usage) = self.usage {
            agent.usage = usage;
        }
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::provider::{GenerationOptions, ModelPricing};
    use crate::tool::{ParameterSchema, ToolSchema};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays canned replies; repeats the last one forever
    struct ScriptedProvider {
        replies: Vec<String>,
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<Message>>>,
        options: GenerationOptions,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: replies.iter().map(|r| (*r).to_string()).collect(),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                options: GenerationOptions {
                    model: "scripted".into(),
                    temperature: 0.0,
                    max_tokens: 256,
                    streaming: false,
                },
                delay: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn options(&self) -> &GenerationOptions {
            &self.options
        }

        fn pricing(&self) -> ModelPricing {
            ModelPricing::new(1.0, 1.0)
        }

        async fn complete(
            &self,
            messages: &[Message],
            _options: &GenerationOptions,
        ) -> Result<Completion> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(messages.to_vec());
            let reply = self.replies[idx.min(self.replies.len() - 1)].clone();
            Ok(Completion::text("scripted", reply).with_usage(TokenUsage::new(10, 5)))
        }
    }

    struct UpperBox;

    #[async_trait]
    impl Toolbox for UpperBox {
        fn schemas(&self) -> Vec<ToolSchema> {
            vec![ToolSchema {
                name: "upper".into(),
                description: "Uppercase text".into(),
                parameters: vec![ParameterSchema::new("text", "string", "Input", true)],
            }]
        }

        async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
            let text = call.str_arg("text").unwrap_or_default().to_uppercase();
            Ok(ToolResult::success("upper", text))
        }
    }

    fn agent_with(provider: Arc<ScriptedProvider>, max_iterations: usize) -> Agent {
        AgentBuilder::new()
            .provider(provider)
            .toolbox(Arc::new(UpperBox))
            .max_iterations(max_iterations)
            .build()
            .unwrap()
    }

    const UPPER_CALL: &str = "Let me check.\n```tool\n{\"tool\": \"upper\", \"arguments\": {\"text\": \"abidjan\"}}\n```";

    #[test]
    fn test_parse_tool_call() {
        match Decision::parse(UPPER_CALL) {
            Decision::Invoke(call) => {
                assert_eq!(call.name, "upper");
                assert_eq!(call.str_arg("text"), Some("abidjan"));
                assert!(call.id.is_some());
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_final_and_malformed() {
        assert!(matches!(Decision::parse("Sales rose 4%."), Decision::Final(_)));
        assert!(matches!(
            Decision::parse("```tool\n{\"tool\": \"upper\", \"arguments\": \n```"),
            Decision::Malformed(_)
        ));
        assert!(matches!(Decision::parse("```tool\n{\"tool\": \"upper\"}"), Decision::Malformed(_)));
        assert!(matches!(
            Decision::parse(r#"{"tool": "upper", "arguments": {"text": "x"}}"#),
            Decision::Invoke(_)
        ));
    }

    #[tokio::test]
    async fn test_direct_answer_records_memory() {
        let provider = Arc::new(ScriptedProvider::new(&["The brands are ALYSSA and MAMAN."]));
        let mut agent = agent_with(provider.clone(), 5);

        let reply = agent.run("List all the brands available in Abidjan.").await.unwrap();
        assert_eq!(reply.answer, "The brands are ALYSSA and MAMAN.");
        assert_eq!(reply.iterations, 1);
        assert_eq!(reply.usage.tokens_used, 15);
        assert_eq!(provider.calls(), 1);

        assert_eq!(agent.memory().len(), 2);
        assert_eq!(agent.memory().messages()[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let provider = Arc::new(ScriptedProvider::new(&[UPPER_CALL, "Done: ABIDJAN"]));
        let mut agent = agent_with(provider.clone(), 5);

        let reply = agent.run("shout abidjan").await.unwrap();
        assert_eq!(reply.answer, "Done: ABIDJAN");
        assert_eq!(reply.usage.tokens_used, 30);

        let seen = provider.seen.lock().unwrap();
        let observation = seen[1].last().unwrap();
        assert_eq!(observation.role, Role::Tool);
        assert!(observation.content.contains("[Tool 'upper' returned]\nABIDJAN"));
        // scratch trace is not kept in memory
        assert_eq!(agent.memory().len(), 2);
    }

    #[tokio::test]
    async fn test_parse_errors_are_fed_back() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "```tool\n{not json}\n```",
            "```tool\n{\"tool\": \"upper\", \"arguments\": {\"text\": 7}}\n```",
            "```tool\n{\"tool\": \"lower\", \"arguments\": {}}\n```",
            "recovered",
        ]));
        let mut agent = agent_with(provider.clone(), 10);

        let reply = agent.run("q").await.unwrap();
        assert_eq!(reply.answer, "recovered");
        assert_eq!(reply.iterations, 4);

        let seen = provider.seen.lock().unwrap();
        assert!(seen[1].last().unwrap().content.contains("could not be parsed"));
        assert!(seen[2].last().unwrap().content.contains("must be of type string"));
        assert!(seen[3].last().unwrap().content.contains("Available tools: upper"));
    }

    #[tokio::test]
    async fn test_iteration_budget_is_hard_bound() {
        let provider = Arc::new(ScriptedProvider::new(&[UPPER_CALL]));
        let mut agent = agent_with(provider.clone(), 3);

        let err = agent.run("loop forever").await.unwrap_err();
        assert!(matches!(err, AgentError::MaxIterations(3)));
        assert_eq!(provider.calls(), 3);
        assert!(agent.memory().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_aborts_slow_provider() {
        let mut slow = ScriptedProvider::new(&["too late"]);
        slow.delay = Some(Duration::from_secs(30));

        let mut agent = AgentBuilder::new()
            .provider(Arc::new(slow))
            .toolbox(Arc::new(UpperBox))
            .deadline(Duration::from_secs(5))
            .build()
            .unwrap();

        let err = agent.run("anything").await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_memory_carries_into_follow_up() {
        let provider = Arc::new(ScriptedProvider::new(&["first", "second"]));
        let mut agent = AgentBuilder::new()
            .provider(provider.clone())
            .toolbox(Arc::new(UpperBox))
            .memory(Conversation::from_history(&["user: earlier question"]))
            .build()
            .unwrap();

        agent.run("q1").await.unwrap();
        agent.run("q2").await.unwrap();

        let seen = provider.seen.lock().unwrap();
        // system + history + q1/first + q2
        assert_eq!(seen[1].len(), 5);
        assert_eq!(seen[1][1].content, "earlier question");
        assert_eq!(seen[1][3].content, "first");
    }

    #[test]
    fn test_builder_requires_parts() {
        assert!(matches!(AgentBuilder::new().build(), Err(AgentError::Config(_))));
    }
}
