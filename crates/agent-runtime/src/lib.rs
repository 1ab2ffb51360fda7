//! # agent-runtime
//!
//! Runtime providers for the retail insights agent.
//!
//! ## Providers
//!
//! - **OpenAI** (`gpt-4o`): chat completions over HTTPS, streamed
//! - **Gemini** (`gemini-pro`): Google Generative Language API
//!
//! Clients are obtained through [`ModelRegistry`], which memoizes at most two
//! clients per role so repeated requests reuse connections and credentials.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{ModelRegistry, ModelRole, RemoteProviderFactory};
//!
//! let registry = ModelRegistry::new(Arc::new(RemoteProviderFactory::new(credentials, settings)));
//! let provider = registry.resolve("gpt-4o", ModelRole::Agent)?;
//! ```

pub mod embeddings;
pub mod gemini;
pub mod http;
pub mod openai;
pub mod registry;
pub mod retry;

pub use embeddings::OpenAiEmbedder;
pub use gemini::GeminiProvider;
pub use http::{Credentials, RuntimeSettings};
pub use openai::OpenAiProvider;
pub use registry::{ModelId, ModelRegistry, ModelRole, ProviderFactory, RemoteProviderFactory};

// Re-export core types for convenience
pub use agent_core::{AgentError, LlmProvider, Message, Result, Role};
