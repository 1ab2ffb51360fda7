//! Application State

use std::sync::Arc;

use agent_runtime::ModelId;
use retail_insights::InsightsService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Answers analytics questions
    pub service: Arc<InsightsService>,

    /// Used when a request does not name its own models
    pub default_tool_model: ModelId,
    pub default_agent_model: ModelId,
}

impl AppState {
    pub fn new(service: InsightsService, tool_model: ModelId, agent_model: ModelId) -> Self {
        Self {
            service: Arc::new(service),
            default_tool_model: tool_model,
            default_agent_model: agent_model,
        }
    }
}
