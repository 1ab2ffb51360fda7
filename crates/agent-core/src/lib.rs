//! # agent-core
//!
//! Core agent logic with provider-agnostic LLM abstraction and a closed tool seam.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Agent                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Reasoning  │  │   Toolbox   │  │   LlmProvider       │  │
//! │  │    Loop     │──│  (closed)   │──│   (Strategy)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! │         │                                                    │
//! │  ┌─────────────┐  ┌─────────────┐                            │
//! │  │ Conversation│  │UsageTracker │                            │
//! │  │   memory    │  │ tokens/cost │                            │
//! │  └─────────────┘  └─────────────┘                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping between OpenAI, Gemini, or a
//! scripted test double without changing agent logic.

pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod tool;
pub mod usage;

pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Role, truncate_history};
pub use provider::{Completion, Embedder, GenerationOptions, LlmProvider, ModelPricing, TokenUsage};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, AgentReply};
pub use tool::{ParameterSchema, ToolCall, ToolResult, ToolSchema, Toolbox};
pub use usage::{UsageRecord, UsageTracker};
