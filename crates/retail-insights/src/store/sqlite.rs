//! SQLite-backed store
//!
//! Every call opens its own read-only connection on a blocking thread; the
//! connection is dropped when the call returns, on every exit path.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::Value;

use super::{QueryOutput, QueryableStore, ensure_read_only};
use crate::error::{InsightsError, Result};

/// Sample rows shown per table by `table_info`
const SAMPLE_ROWS: usize = 3;

#[derive(Clone, Debug)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Store over an existing database file; fails if it cannot be opened
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        store.connect()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }

    /// Run `op` with a fresh connection off the async runtime
    async fn with_connection<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let conn = store.connect()?;
            op(&conn)
        })
        .await?
    }
}

#[async_trait]
impl QueryableStore for SqliteStore {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.with_connection(user_tables).await
    }

    async fn table_info(&self, tables: &[String]) -> Result<String> {
        let tables = tables.to_vec();
        self.with_connection(move |conn| {
            let known = user_tables(conn)?;
            let unknown: Vec<&str> = tables
                .iter()
                .filter(|t| !known.contains(t))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(InsightsError::UnknownTable(unknown.join(", ")));
            }

            let mut info = String::new();
            for table in &tables {
                let ddl: Option<String> = conn
                    .query_row(
                        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                        [table],
                        |row| row.get(0),
                    )
                    .optional()?;
                let sample = run_query(
                    conn,
                    &format!("SELECT * FROM {} LIMIT {SAMPLE_ROWS}", quote_ident(table)),
                )?;

                let _ = writeln!(info, "{}\n", ddl.unwrap_or_default().trim());
                let _ = writeln!(info, "/*\n{SAMPLE_ROWS} rows from {table} table:");
                let _ = writeln!(info, "{}", sample.columns.join("\t"));
                for row in &sample.rows {
                    let cells: Vec<String> = row.iter().map(cell_text).collect();
                    let _ = writeln!(info, "{}", cells.join("\t"));
                }
                info.push_str("*/\n\n");
            }
            Ok(info.trim_end().to_string())
        })
        .await
    }

    async fn run(&self, sql: &str) -> Result<QueryOutput> {
        ensure_read_only(sql)?;
        let sql = sql.to_string();
        tracing::debug!(%sql, "running query");
        self.with_connection(move |conn| run_query(conn, &sql)).await
    }
}

fn user_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

fn run_query(conn: &Connection, sql: &str) -> Result<QueryOutput> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut cells = Vec::with_capacity(width);
        for idx in 0..width {
            cells.push(to_json(row.get_ref(idx)?));
        }
        rows.push(cells);
    }

    Ok(QueryOutput { columns, rows })
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".into(),
        other => other.to_string(),
    }
}

/// Double-quote an identifier for SQLite
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retail.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE retail_data (City TEXT, Brand TEXT, \"Item Name\" TEXT, Sales_Value REAL);
             INSERT INTO retail_data VALUES ('Abidjan', 'MAMAN', 'MAMAN SPAGHETTI 200G', 1500.5);
             INSERT INTO retail_data VALUES ('Abidjan', 'ALYSSA', 'ALYSSA SPAGHETTI 200G SACHET', 900.0);
             INSERT INTO retail_data VALUES ('Bouake', 'MAMAN', 'MAMAN MACARONI 500G', 300.25);
             INSERT INTO retail_data VALUES ('Bouake', 'PANZANI', 'PANZANI PENNE 500G', NULL);",
        )
        .unwrap();
        drop(conn);
        let store = SqliteStore::open(&path).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_list_tables() {
        let (_dir, store) = fixture();
        assert_eq!(store.list_tables().await.unwrap(), vec!["retail_data"]);
    }

    #[tokio::test]
    async fn test_run_query() {
        let (_dir, store) = fixture();
        let output = store
            .run("SELECT DISTINCT Brand FROM retail_data WHERE City = 'Abidjan' ORDER BY Brand;")
            .await
            .unwrap();
        assert_eq!(output.columns, vec!["Brand"]);
        assert_eq!(output.rows, vec![vec![json!("ALYSSA")], vec![json!("MAMAN")]]);

        let total = store
            .run("SELECT SUM(Sales_Value) AS total FROM retail_data WHERE City = 'Bouake'")
            .await
            .unwrap();
        assert_eq!(total.rows[0][0], json!(300.25));
    }

    #[tokio::test]
    async fn test_mutations_rejected() {
        let (_dir, store) = fixture();
        let err = store.run("DELETE FROM retail_data").await.unwrap_err();
        assert!(matches!(err, InsightsError::ReadOnly(_)));
        let count = store.run("SELECT COUNT(*) FROM retail_data").await.unwrap();
        assert_eq!(count.rows[0][0], json!(4));
    }

    #[tokio::test]
    async fn test_table_info_has_ddl_and_samples() {
        let (_dir, store) = fixture();
        let info = store.table_info(&["retail_data".to_string()]).await.unwrap();
        assert!(info.starts_with("CREATE TABLE retail_data"));
        assert!(info.contains("3 rows from retail_data table:"));
        assert!(info.contains("City\tBrand\tItem Name\tSales_Value"));
        assert!(!info.contains("PANZANI"));

        let err = store
            .table_info(&["retail_data".to_string(), "sales".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, InsightsError::UnknownTable(t) if t == "sales"));
    }

    #[tokio::test]
    async fn test_sql_errors_surface() {
        let (_dir, store) = fixture();
        let err = store.run("SELECT Missing FROM retail_data").await.unwrap_err();
        assert!(matches!(err, InsightsError::Database(_)));
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SqliteStore::open(dir.path().join("absent.db")).is_err());
    }
}
