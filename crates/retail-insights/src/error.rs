//! Error Types for Retail Insights

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InsightsError>;

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Only read-only queries are allowed: {0}")]
    ReadOnly(String),

    #[error("Table(s) not found in database: {0}")]
    UnknownTable(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid CSV value in column '{column}' at row {row}: {value}")]
    CsvValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Invalid chart field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Error creating chart: {0}")]
    Render(String),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl InsightsError {
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Human-readable message for API callers
    pub fn detail(&self) -> String {
        match self {
            Self::Agent(err) => err.user_message(),
            Self::Database(_) | Self::Io(_) | Self::Task(_) => {
                "The retail database is currently unavailable.".into()
            }
            other => other.to_string(),
        }
    }
}

/// Tool failures surface to the reasoning loop as execution errors
impl From<InsightsError> for AgentError {
    fn from(err: InsightsError) -> Self {
        match err {
            InsightsError::Agent(inner) => inner,
            InsightsError::MissingFields(_) | InsightsError::InvalidField { .. } => {
                Self::ToolValidation(err.to_string())
            }
            other => Self::ToolExecution(other.to_string()),
        }
    }
}
