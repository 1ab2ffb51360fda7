//! Retail Toolkit - Agent Tools
//!
//! The fixed tool set the retail agent may call, dispatched through the
//! closed [`ToolKind`] enum.

mod chart;
mod columns;
mod few_shot;
mod sql;

pub use chart::{INPUT_DATA, prepare_chart};
pub use columns::{COLUMN_DESCRIPTIONS, columns_descriptions};
pub use few_shot::{FEW_SHOT_EXAMPLES, FewShotExample, FewShotIndex, NO_MATCH};
#[cfg(test)]
pub(crate) use few_shot::tests::LetterEmbedder;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use agent_core::{
    AgentError, LlmProvider, ParameterSchema, Result as CoreResult, ToolCall, ToolResult,
    ToolSchema, Toolbox, UsageTracker,
};

use crate::store::QueryableStore;

/// Every tool the retail agent knows
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ListTables,
    Schema,
    Query,
    QueryChecker,
    ColumnDescriptions,
    GenerateChart,
    FewShot,
}

impl ToolKind {
    pub const ALL: [Self; 7] = [
        Self::ListTables,
        Self::Schema,
        Self::Query,
        Self::QueryChecker,
        Self::ColumnDescriptions,
        Self::GenerateChart,
        Self::FewShot,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::ListTables => "sql_db_list_tables",
            Self::Schema => "sql_db_schema",
            Self::Query => "sql_db_query",
            Self::QueryChecker => "sql_db_query_checker",
            Self::ColumnDescriptions => "get_columns_descriptions",
            Self::GenerateChart => "generate_chart",
            Self::FewShot => "sql_get_few_shot",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn schema(self) -> ToolSchema {
        let (description, parameters) = match self {
            Self::ListTables => (
                "Input is an empty string, output is a comma-separated list of tables in the database.",
                vec![],
            ),
            Self::Schema => (
                "Input to this tool is a comma-separated list of tables, output is the schema and sample rows for those tables. \
                 Be sure that the tables actually exist by calling sql_db_list_tables first! \
                 Example Input: table1, table2, table3",
                vec![ParameterSchema::new(
                    "table_names",
                    "string",
                    "Comma-separated list of tables",
                    true,
                )],
            ),
            Self::Query => (
                "Input to this tool is a detailed and correct SQL query, output is a result from the database. \
                 If the query is not correct, an error message will be returned. \
                 If an error is returned, rewrite the query, check the query, and try again. \
                 If you encounter an issue with Unknown column 'xxxx' in 'field list', use sql_db_schema to query the correct table fields.",
                vec![ParameterSchema::new(
                    "query",
                    "string",
                    "A read-only SQLite query",
                    true,
                )],
            ),
            Self::QueryChecker => (
                "Use this tool to double check if your query is correct before executing it. \
                 Always use this tool before executing a query with sql_db_query!",
                vec![ParameterSchema::new(
                    "query",
                    "string",
                    "The SQL query to check",
                    true,
                )],
            ),
            Self::ColumnDescriptions => (
                "Useful for getting the descriptions of columns in the table.",
                vec![],
            ),
            Self::GenerateChart => (
                "Prepares data for chart generation. Input: JSON, dict, or args for columns, data, and chart_type. \
                 Returns: Dict with processed data for later chart creation.",
                vec![
                    ParameterSchema::new("columns", "array", "Column names, in order", false),
                    ParameterSchema::new(
                        "data",
                        "array",
                        "Rows, each with one value per column",
                        false,
                    ),
                    ParameterSchema::new(
                        "chart_type",
                        "string",
                        "One of: bar, line, pie, scatter",
                        false,
                    ),
                    ParameterSchema::new(
                        INPUT_DATA,
                        "any",
                        "Alternatively the whole payload as a JSON string or object",
                        false,
                    ),
                ],
            ),
            Self::FewShot => (
                "The 'sql_get_few_shot' tool is designed for efficient and accurate retrieval of \
                 SQL query examples closely related to a given user query. It identifies the most \
                 relevant pre-defined SQL query from a curated set.",
                vec![ParameterSchema::new(
                    "query",
                    "string",
                    "The user question",
                    true,
                )],
            ),
        };

        ToolSchema {
            name: self.name().into(),
            description: description.into(),
            parameters,
        }
    }
}

/// The retail agent's toolbox for one request
pub struct RetailToolbox {
    store: Arc<dyn QueryableStore>,
    checker: Arc<dyn LlmProvider>,
    usage: Arc<UsageTracker>,
    few_shot: Option<Arc<FewShotIndex>>,
}

impl RetailToolbox {
    /// `checker` is the tool model; its calls are charged to `usage`
    pub fn new(
        store: Arc<dyn QueryableStore>,
        checker: Arc<dyn LlmProvider>,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self {
            store,
            checker,
            usage,
            few_shot: None,
        }
    }

    /// Register few-shot retrieval
    #[must_use]
    pub fn with_few_shot(mut self, index: Arc<FewShotIndex>) -> Self {
        self.few_shot = Some(index);
        self
    }

    /// Tools registered in this box, in prompt order
    pub fn kinds(&self) -> Vec<ToolKind> {
        ToolKind::ALL
            .into_iter()
            .filter(|kind| *kind != ToolKind::FewShot || self.few_shot.is_some())
            .collect()
    }

    fn resolve(&self, name: &str) -> Option<ToolKind> {
        ToolKind::from_name(name).filter(|kind| self.kinds().contains(kind))
    }

    fn required_str<'a>(call: &'a ToolCall, key: &str) -> CoreResult<&'a str> {
        call.str_arg(key)
            .ok_or_else(|| AgentError::ToolValidation(format!("'{key}' must be a string")))
    }
}

#[async_trait]
impl Toolbox for RetailToolbox {
    fn schemas(&self) -> Vec<ToolSchema> {
        self.kinds().into_iter().map(ToolKind::schema).collect()
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let kind = self
            .resolve(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
        let name = kind.name();

        let result = match kind {
            ToolKind::ListTables => {
                ToolResult::success(name, sql::list_tables(self.store.as_ref()).await?)
            }
            ToolKind::Schema => {
                let tables = Self::required_str(call, "table_names")?;
                ToolResult::success(name, sql::table_schema(self.store.as_ref(), tables).await?)
            }
            ToolKind::Query => {
                let query = Self::required_str(call, "query")?;
                ToolResult::success(name, sql::run_query(self.store.as_ref(), query).await?)
            }
            ToolKind::QueryChecker => {
                let query = Self::required_str(call, "query")?;
                let checked =
                    sql::check_query(self.checker.as_ref(), &self.usage, query).await?;
                ToolResult::success(name, checked)
            }
            ToolKind::ColumnDescriptions => ToolResult::success(name, columns_descriptions()),
            ToolKind::GenerateChart => {
                let payload = prepare_chart(call)?;
                let value = serde_json::to_value(&payload)?;
                ToolResult::success(name, value.to_string()).with_data(value)
            }
            ToolKind::FewShot => {
                let query = Self::required_str(call, "query")?;
                let output = match &self.few_shot {
                    Some(index) => index.lookup(query).await?,
                    None => NO_MATCH.to_string(),
                };
                ToolResult::success(name, output)
            }
        };

        tracing::debug!(tool = name, success = result.success, "tool executed");
        Ok(result)
    }
}
