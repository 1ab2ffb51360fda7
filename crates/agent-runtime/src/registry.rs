//! Model Provider Selector
//!
//! Maps a requested model identifier to a configured, memoized client. The
//! registry is process-wide and read-mostly: clients are built lazily on first
//! use, kept in a small per-role LRU and only dropped by eviction or
//! [`ModelRegistry::reset`].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use agent_core::{
    error::{AgentError, Result},
    provider::{LlmProvider, ModelPricing},
};

use crate::gemini::GeminiProvider;
use crate::http::{Credentials, RuntimeSettings};
use crate::openai::OpenAiProvider;

/// Clients kept per role
pub const CACHE_CAPACITY: usize = 2;

/// Supported model identifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelId {
    Gpt4o,
    GeminiPro,
}

impl ModelId {
    pub const ALL: [Self; 2] = [Self::Gpt4o, Self::GeminiPro];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gpt4o => "gpt-4o",
            Self::GeminiPro => "gemini-pro",
        }
    }

    /// USD per thousand prompt/completion tokens
    pub const fn pricing(self) -> ModelPricing {
        match self {
            Self::Gpt4o => ModelPricing::new(0.005, 0.015),
            Self::GeminiPro => ModelPricing::new(0.0005, 0.0015),
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s.trim())
            .ok_or_else(|| AgentError::UnsupportedModel(s.to_string()))
    }
}

/// The part a client plays in answering a request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelRole {
    /// Drives the reasoning loop
    Agent,
    /// Backs model-assisted tools such as the query checker
    Tool,
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Agent => "agent",
            Self::Tool => "tool",
        })
    }
}

/// Builds a concrete client for a model
pub trait ProviderFactory: Send + Sync {
    fn create(&self, model: ModelId) -> Result<Arc<dyn LlmProvider>>;
}

/// Factory for the real remote providers
#[derive(Clone, Debug)]
pub struct RemoteProviderFactory {
    credentials: Credentials,
    settings: RuntimeSettings,
}

impl RemoteProviderFactory {
    pub const fn new(credentials: Credentials, settings: RuntimeSettings) -> Self {
        Self {
            credentials,
            settings,
        }
    }
}

impl ProviderFactory for RemoteProviderFactory {
    fn create(&self, model: ModelId) -> Result<Arc<dyn LlmProvider>> {
        match model {
            ModelId::Gpt4o => {
                let key = self
                    .credentials
                    .openai_api_key
                    .as_deref()
                    .ok_or_else(|| AgentError::Config("OPENAI_API_KEY is not set".into()))?;
                let provider = OpenAiProvider::new(model.as_str(), key, &self.settings)?
                    .with_pricing(model.pricing());
                Ok(Arc::new(provider))
            }
            ModelId::GeminiPro => {
                let key = self
                    .credentials
                    .google_api_key
                    .as_deref()
                    .ok_or_else(|| AgentError::Config("GOOGLE_API_KEY is not set".into()))?;
                let provider = GeminiProvider::new(model.as_str(), key, &self.settings)?
                    .with_pricing(model.pricing());
                Ok(Arc::new(provider))
            }
        }
    }
}

type RoleCache = VecDeque<(ModelId, Arc<dyn LlmProvider>)>;

/// Memoizing, thread-safe model selector
pub struct ModelRegistry {
    factory: Arc<dyn ProviderFactory>,
    capacity: usize,
    cache: Mutex<HashMap<ModelRole, RoleCache>>,
}

impl ModelRegistry {
    pub fn new(factory: Arc<dyn ProviderFactory>) -> Self {
        Self::with_capacity(factory, CACHE_CAPACITY)
    }

    pub fn with_capacity(factory: Arc<dyn ProviderFactory>, capacity: usize) -> Self {
        Self {
            factory,
            capacity: capacity.max(1),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a model name for a role, building the client on first use.
    ///
    /// The lock is held across construction so concurrent first requests
    /// build exactly one client.
    pub fn resolve(&self, model: &str, role: ModelRole) -> Result<Arc<dyn LlmProvider>> {
        let id: ModelId = model.parse()?;
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = cache.entry(role).or_default();

        if let Some(pos) = entries.iter().position(|(cached, _)| *cached == id) {
            if let Some(hit) = entries.remove(pos) {
                let provider = Arc::clone(&hit.1);
                entries.push_front(hit);
                return Ok(provider);
            }
        }

        tracing::info!(model = %id, %role, "initializing model client");
        let provider = self.factory.create(id)?;
        entries.push_front((id, Arc::clone(&provider)));
        while entries.len() > self.capacity {
            if let Some((evicted, _)) = entries.pop_back() {
                tracing::debug!(model = %evicted, %role, "evicted model client");
            }
        }
        Ok(provider)
    }

    /// Models currently cached for a role, most recently used first
    pub fn cached(&self, role: ModelRole) -> Vec<ModelId> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&role)
            .map(|entries| entries.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default()
    }

    /// Drop every cached client
    pub fn reset(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("capacity", &self.capacity)
            .field("agent", &self.cached(ModelRole::Agent))
            .field("tool", &self.cached(ModelRole::Tool))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::message::Message;
    use agent_core::provider::{Completion, GenerationOptions};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        options: GenerationOptions,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn options(&self) -> &GenerationOptions {
            &self.options
        }

        async fn complete(
            &self,
            _messages: &[Message],
            options: &GenerationOptions,
        ) -> Result<Completion> {
            Ok(Completion::text(&options.model, "ok"))
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
    }

    impl ProviderFactory for CountingFactory {
        fn create(&self, model: ModelId) -> Result<Arc<dyn LlmProvider>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            let options = match model {
                ModelId::Gpt4o => OpenAiProvider::default_options(model.as_str()),
                ModelId::GeminiPro => GeminiProvider::default_options(model.as_str()),
            };
            Ok(Arc::new(FixedProvider { options }))
        }
    }

    #[test]
    fn test_model_id_parsing() {
        assert_eq!("gpt-4o".parse::<ModelId>().unwrap(), ModelId::Gpt4o);
        assert_eq!("gemini-pro".parse::<ModelId>().unwrap(), ModelId::GeminiPro);
        for bad in ["claude-3", "", "GPT-4O"] {
            assert!(matches!(
                bad.parse::<ModelId>(),
                Err(AgentError::UnsupportedModel(_))
            ));
        }
    }

    #[test]
    fn test_resolve_memoizes_per_role() {
        let factory = Arc::new(CountingFactory::default());
        let registry = ModelRegistry::new(factory.clone());

        let first = registry.resolve("gpt-4o", ModelRole::Agent).unwrap();
        let second = registry.resolve("gpt-4o", ModelRole::Agent).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        let tool = registry.resolve("gpt-4o", ModelRole::Tool).unwrap();
        assert!(!Arc::ptr_eq(&first, &tool));
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fixed_parameters_per_model() {
        let registry = ModelRegistry::new(Arc::new(CountingFactory::default()));
        for id in ModelId::ALL {
            let provider = registry.resolve(id.as_str(), ModelRole::Agent).unwrap();
            assert_eq!(provider.options().model, id.as_str());
            assert_eq!(provider.options().max_tokens, 3000);
        }
        let gpt = registry.resolve("gpt-4o", ModelRole::Agent).unwrap();
        assert!(gpt.options().streaming);
    }

    #[test]
    fn test_unsupported_model_builds_nothing() {
        let factory = Arc::new(CountingFactory::default());
        let registry = ModelRegistry::new(factory.clone());
        let err = registry.resolve("llama3", ModelRole::Agent).err().unwrap();
        assert!(matches!(err, AgentError::UnsupportedModel(_)));
        assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lru_eviction_and_reset() {
        let factory = Arc::new(CountingFactory::default());
        let registry = ModelRegistry::with_capacity(factory.clone(), 1);

        registry.resolve("gpt-4o", ModelRole::Agent).unwrap();
        registry.resolve("gemini-pro", ModelRole::Agent).unwrap();
        assert_eq!(registry.cached(ModelRole::Agent), vec![ModelId::GeminiPro]);

        registry.resolve("gpt-4o", ModelRole::Agent).unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 3);

        registry.reset();
        assert!(registry.cached(ModelRole::Agent).is_empty());
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let factory = RemoteProviderFactory::new(Credentials::default(), RuntimeSettings::default());
        for id in ModelId::ALL {
            assert!(matches!(factory.create(id), Err(AgentError::Config(_))));
        }
    }

    #[test]
    fn test_concurrent_first_use_builds_once() {
        let factory = Arc::new(CountingFactory::default());
        let registry = Arc::new(ModelRegistry::new(factory.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.resolve("gemini-pro", ModelRole::Tool).map(|_| ()))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }
}
