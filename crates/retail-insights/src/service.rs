//! Insights Service
//!
//! Answers one analytics question end to end: trims the client history,
//! resolves the tool and agent models, runs a fresh agent over the retail
//! toolbox and post-processes any chart payloads in the answer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use agent_core::{AgentBuilder, Conversation, Embedder, UsageTracker, truncate_history};
use agent_runtime::{ModelRegistry, ModelRole};

use crate::RETAIL_INSIGHTS_PROMPT;
use crate::error::{InsightsError, Result};
use crate::model::{InsightsAnswer, QueryRequest};
use crate::postprocess::ChartPostProcessor;
use crate::store::QueryableStore;
use crate::toolkit::{FewShotIndex, RetailToolbox};

/// Per-request limits
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Model calls allowed per question
    pub max_iterations: usize,

    /// Word budget for the client-supplied history
    pub history_word_budget: usize,

    /// Wall-clock budget for the whole agent run
    pub deadline: Option<Duration>,

    /// Register the few-shot retrieval tool (needs an embedder)
    pub few_shot_enabled: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            history_word_budget: 1000,
            deadline: None,
            few_shot_enabled: false,
        }
    }
}

pub struct InsightsService {
    registry: Arc<ModelRegistry>,
    store: Arc<dyn QueryableStore>,
    postprocessor: ChartPostProcessor,
    config: ServiceConfig,
    embedder: Option<Arc<dyn Embedder>>,
    few_shot: OnceCell<Arc<FewShotIndex>>,
}

impl InsightsService {
    pub fn new(
        registry: Arc<ModelRegistry>,
        store: Arc<dyn QueryableStore>,
        config: ServiceConfig,
    ) -> Result<Self> {
        Ok(Self {
            registry,
            store,
            postprocessor: ChartPostProcessor::new()?,
            config,
            embedder: None,
            few_shot: OnceCell::new(),
        })
    }

    /// Embedder backing the few-shot index, built on first use
    #[must_use]
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Answer one question. Each call gets its own agent and usage tracker.
    #[tracing::instrument(
        skip_all,
        fields(agent_model = %request.agent_model, tool_model = %request.tool_model)
    )]
    pub async fn answer(&self, request: QueryRequest) -> Result<InsightsAnswer> {
        let history = truncate_history(&request.chat_history, self.config.history_word_budget);
        if history.len() < request.chat_history.len() {
            tracing::debug!(
                kept = history.len(),
                dropped = request.chat_history.len() - history.len(),
                "chat history truncated"
            );
        }

        let tool_llm = self.registry.resolve(&request.tool_model, ModelRole::Tool)?;
        let agent_llm = self.registry.resolve(&request.agent_model, ModelRole::Agent)?;

        let usage = Arc::new(UsageTracker::new());
        let mut toolbox = RetailToolbox::new(Arc::clone(&self.store), tool_llm, Arc::clone(&usage));
        if let Some(index) = self.few_shot_index().await? {
            toolbox = toolbox.with_few_shot(index);
        }

        let mut builder = AgentBuilder::new()
            .provider(agent_llm)
            .toolbox(Arc::new(toolbox))
            .system_prompt(RETAIL_INSIGHTS_PROMPT)
            .max_iterations(self.config.max_iterations)
            .memory(Conversation::from_history(history.as_slice()))
            .usage(Arc::clone(&usage));
        if let Some(deadline) = self.config.deadline {
            builder = builder.deadline(deadline);
        }
        let mut agent = builder.build()?;

        tracing::info!(question = %request.question, "processing query");
        let reply = agent.run(&request.question).await?;
        let output = self.postprocessor.process(&reply.answer);

        let totals = usage.snapshot();
        tracing::info!(
            iterations = reply.iterations,
            tokens_used = totals.tokens_used,
            cost = totals.cost,
            "query answered"
        );

        Ok(InsightsAnswer {
            output,
            tokens_used: totals.tokens_used,
            cost: totals.cost,
        })
    }

    async fn few_shot_index(&self) -> Result<Option<Arc<FewShotIndex>>> {
        if !self.config.few_shot_enabled {
            return Ok(None);
        }
        let Some(embedder) = &self.embedder else {
            tracing::warn!("few-shot retrieval enabled without an embedder, tool not registered");
            return Ok(None);
        };

        let index = self
            .few_shot
            .get_or_try_init(|| async {
                let index = FewShotIndex::build(Arc::clone(embedder)).await?;
                Ok::<_, InsightsError>(Arc::new(index))
            })
            .await?;
        Ok(Some(Arc::clone(index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{QueryOutput, SqliteStore};
    use crate::toolkit::LetterEmbedder;
    use agent_core::{
        AgentError, Completion, GenerationOptions, LlmProvider, Message, ModelPricing, Role,
        TokenUsage,
    };
    use agent_runtime::{ModelId, ProviderFactory};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays canned replies; repeats the last one forever
    struct ScriptedProvider {
        replies: Vec<String>,
        seen: Mutex<Vec<Vec<Message>>>,
        options: GenerationOptions,
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
            ModelPricing::new(0.005, 0.015)
        }

        async fn complete(
            &self,
            messages: &[Message],
            options: &GenerationOptions,
        ) -> agent_core::Result<Completion> {
            let idx = {
                let mut seen = self.seen.lock().unwrap();
                seen.push(messages.to_vec());
                seen.len() - 1
            };
            let reply = self.replies[idx.min(self.replies.len() - 1)].clone();
            Ok(Completion::text(&options.model, reply).with_usage(TokenUsage::new(100, 20)))
        }
    }

    /// Requests use gemini-pro as the tool model and gpt-4o as the agent model
    struct ScriptedFactory {
        agent: Arc<ScriptedProvider>,
        tool: Arc<ScriptedProvider>,
    }

    impl ScriptedFactory {
        fn new(agent_replies: &[&str]) -> Self {
            Self {
                agent: Arc::new(Self::provider(agent_replies)),
                tool: Arc::new(Self::provider(&["SELECT DISTINCT Brand FROM retail_data"])),
            }
        }

        fn provider(replies: &[&str]) -> ScriptedProvider {
            ScriptedProvider {
                replies: replies.iter().map(|r| (*r).to_string()).collect(),
                seen: Mutex::new(Vec::new()),
                options: GenerationOptions {
                    model: "scripted".into(),
                    temperature: 0.0,
                    max_tokens: 3000,
                    streaming: false,
                },
            }
        }
    }

    impl ProviderFactory for ScriptedFactory {
        fn create(&self, model: ModelId) -> agent_core::Result<Arc<dyn LlmProvider>> {
            let provider: Arc<dyn LlmProvider> = match model {
                ModelId::GeminiPro => self.tool.clone(),
                ModelId::Gpt4o => self.agent.clone(),
            };
            Ok(provider)
        }
    }

    struct BrandStore;

    #[async_trait]
    impl QueryableStore for BrandStore {
        async fn list_tables(&self) -> Result<Vec<String>> {
            Ok(vec!["retail_data".into()])
        }

        async fn table_info(&self, _tables: &[String]) -> Result<String> {
            Ok("CREATE TABLE retail_data (Brand TEXT)".into())
        }

        async fn run(&self, _sql: &str) -> Result<QueryOutput> {
            Ok(QueryOutput {
                columns: vec!["Brand".into()],
                rows: vec![vec![json!("ALYSSA")], vec![json!("MAMAN")]],
            })
        }
    }

    fn service(factory: Arc<ScriptedFactory>, config: ServiceConfig) -> InsightsService {
        InsightsService::new(
            Arc::new(ModelRegistry::new(factory)),
            Arc::new(BrandStore),
            config,
        )
        .unwrap()
    }

    fn request(question: &str, history: &[&str]) -> QueryRequest {
        QueryRequest {
            question: question.into(),
            tool_model: "gemini-pro".into(),
            agent_model: "gpt-4o".into(),
            chat_history: history.iter().map(|h| (*h).to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let factory = Arc::new(ScriptedFactory::new(&["The brands in Abidjan are ALYSSA and MAMAN."]));
        let service = service(factory.clone(), ServiceConfig::default());

        let answer = service
            .answer(request("List all the brands available in Abidjan.", &[]))
            .await
            .unwrap();
        assert_eq!(answer.output, "The brands in Abidjan are ALYSSA and MAMAN.");
        assert_eq!(answer.tokens_used, 120);
        assert!(answer.cost > 0.0);

        let seen = factory.agent.seen.lock().unwrap();
        assert!(seen[0][0].content.starts_with(RETAIL_INSIGHTS_PROMPT));
        assert!(seen[0][0].content.contains("sql_db_query"));
    }

    #[tokio::test]
    async fn test_tool_round_trip_accumulates_usage() {
        let factory = Arc::new(ScriptedFactory::new(&[
            "```tool\n{\"tool\": \"sql_db_query_checker\", \"arguments\": {\"query\": \"SELECT DISTINCT Brand FROM retail_data\"}}\n```",
            "```tool\n{\"tool\": \"sql_db_query\", \"arguments\": {\"query\": \"SELECT DISTINCT Brand FROM retail_data\"}}\n```",
            "<table><tr><td>ALYSSA</td></tr><tr><td>MAMAN</td></tr></table>",
        ]));
        let service = service(factory.clone(), ServiceConfig::default());

        let answer = service.answer(request("Which brands?", &[])).await.unwrap();
        assert!(answer.output.contains("<td>MAMAN</td>"));
        // three agent calls plus one checker call on the tool model
        assert_eq!(answer.tokens_used, 480);
        assert_eq!(factory.tool.seen.lock().unwrap().len(), 1);

        let seen = factory.agent.seen.lock().unwrap();
        let observation = seen[2].last().unwrap();
        assert_eq!(observation.role, Role::Tool);
        assert!(observation.content.contains("\"MAMAN\""));
    }

    #[tokio::test]
    async fn test_chart_in_answer_is_rendered() {
        let factory = Arc::new(ScriptedFactory::new(&[
            "Sales trend:\nChart data: ```json {\"columns\": [\"Period\", \"Sales_Value\"], \"data\": [[\"Jan-21\", 21286480.6], [\"Feb-21\", 26580841.7]], \"chart_type\": \"line\"}```",
        ]));
        let service = service(factory, ServiceConfig::default());

        let answer = service.answer(request("Show the sales trend", &[])).await.unwrap();
        assert!(answer.output.starts_with("Sales trend:\nHere's the generated chart:\n\n<img "));
        assert!(!answer.output.contains("Chart data:"));
    }

    #[tokio::test]
    async fn test_unsupported_model_rejected() {
        let factory = Arc::new(ScriptedFactory::new(&["unused"]));
        let service = service(factory.clone(), ServiceConfig::default());

        let mut req = request("q", &[]);
        req.agent_model = "claude-3".into();
        let err = service.answer(req).await.unwrap_err();
        assert!(matches!(err, InsightsError::Agent(AgentError::UnsupportedModel(ref m)) if m == "claude-3"));
        assert!(factory.agent.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_is_truncated_into_memory() {
        let factory = Arc::new(ScriptedFactory::new(&["ok"]));
        let config = ServiceConfig {
            history_word_budget: 5,
            ..ServiceConfig::default()
        };
        let service = service(factory.clone(), config);

        let history = ["user: the oldest question here", "bot: short answer", "user: again"];
        service.answer(request("now?", &history)).await.unwrap();

        let seen = factory.agent.seen.lock().unwrap();
        let sent = &seen[0];
        // system + two kept history lines + question
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[1].role, Role::Assistant);
        assert_eq!(sent[1].content, "short answer");
        assert_eq!(sent[2].content, "again");
        assert_eq!(sent[3].content, "now?");
    }

    #[tokio::test]
    async fn test_each_request_gets_fresh_usage() {
        let factory = Arc::new(ScriptedFactory::new(&["answer"]));
        let service = service(factory, ServiceConfig::default());

        let first = service.answer(request("a", &[])).await.unwrap();
        let second = service.answer(request("b", &[])).await.unwrap();
        assert_eq!(first.tokens_used, second.tokens_used);
        assert!(service.registry().cached(ModelRole::Agent).contains(&ModelId::Gpt4o));
    }

    #[tokio::test]
    async fn test_few_shot_tool_registered_when_enabled() {
        let factory = Arc::new(ScriptedFactory::new(&["done"]));
        let config = ServiceConfig {
            few_shot_enabled: true,
            ..ServiceConfig::default()
        };
        let service = service(factory.clone(), config).with_embedder(Arc::new(LetterEmbedder));

        service.answer(request("q", &[])).await.unwrap();
        let seen = factory.agent.seen.lock().unwrap();
        assert!(seen[0][0].content.contains("sql_get_few_shot"));
    }

    #[tokio::test]
    async fn test_against_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retail.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE retail_data (City TEXT, Brand TEXT);
                 INSERT INTO retail_data VALUES ('Abidjan', 'MAMAN'), ('Abidjan', 'ALYSSA'), ('Bouake', 'INDOMIE');",
            )
            .unwrap();

        let factory = Arc::new(ScriptedFactory::new(&[
            "```tool\n{\"tool\": \"sql_db_query\", \"arguments\": {\"query\": \"SELECT Brand FROM retail_data WHERE City = 'Abidjan' ORDER BY Brand\"}}\n```",
            "```tool\n{\"tool\": \"sql_db_query\", \"arguments\": {\"query\": \"DELETE FROM retail_data\"}}\n```",
            "ALYSSA and MAMAN",
        ]));
        let service = InsightsService::new(
            Arc::new(ModelRegistry::new(factory.clone())),
            Arc::new(SqliteStore::open(&path).unwrap()),
            ServiceConfig::default(),
        )
        .unwrap();

        let answer = service
            .answer(request("List all the brands available in Abidjan.", &[]))
            .await
            .unwrap();
        assert_eq!(answer.output, "ALYSSA and MAMAN");

        let seen = factory.agent.seen.lock().unwrap();
        let rows = &seen[1].last().unwrap().content;
        assert!(rows.contains("[\"ALYSSA\"]\n[\"MAMAN\"]"));
        let refused = &seen[2].last().unwrap().content;
        assert!(refused.contains("failed"));

        let count: i64 = rusqlite::Connection::open(&path)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM retail_data", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }
}
