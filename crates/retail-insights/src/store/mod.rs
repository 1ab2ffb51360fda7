//! Relational Store
//!
//! The SQL capability the toolkit runs against. The agent only ever sees the
//! [`QueryableStore`] seam; [`SqliteStore`] is the production backend.

mod guard;
mod loader;
mod sqlite;

pub use guard::ensure_read_only;
pub use loader::{RETAIL_TABLE, load_csv};
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Rows shown to the model before the result is cut short
pub const MAX_RESULT_ROWS: usize = 200;

/// Result of one read-only query
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryOutput {
    /// Compact text form handed back to the model as the tool observation
    pub fn render(&self) -> String {
        if self.rows.is_empty() {
            return format!("Columns: {}\n(no rows)", self.columns.join(", "));
        }

        let shown = self.rows.len().min(MAX_RESULT_ROWS);
        let mut out = format!("Columns: {}\n", self.columns.join(", "));
        for row in &self.rows[..shown] {
            out.push_str(&Value::Array(row.clone()).to_string());
            out.push('\n');
        }
        if self.rows.len() > shown {
            out.push_str(&format!(
                "... {} more rows not shown\n",
                self.rows.len() - shown
            ));
        }
        out.trim_end().to_string()
    }
}

/// Read-only SQL capability
#[async_trait]
pub trait QueryableStore: Send + Sync {
    /// User tables, sorted by name
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// CREATE statements plus a few sample rows for each named table
    async fn table_info(&self, tables: &[String]) -> Result<String>;

    /// Run a single read-only statement
    async fn run(&self, sql: &str) -> Result<QueryOutput>;
}
