//! CSV bootstrap for the retail table

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{Connection, params_from_iter, types::Value as SqlValue};

use super::sqlite::quote_ident;
use crate::error::{InsightsError, Result};

/// Table the agent queries
pub const RETAIL_TABLE: &str = "retail_data";

/// Columns stored as REAL after stripping thousands separators
const NUMERIC_COLUMNS: &[&str] = &["Unit_Price", "Sales_Volume(KG_LTRS)", "Sales_Value"];

/// Month-year column, e.g. `Jan-21`
const PERIOD_COLUMN: &str = "Period";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ColumnKind {
    Period,
    Numeric,
    Text,
}

impl ColumnKind {
    fn of(name: &str) -> Self {
        if name == PERIOD_COLUMN {
            Self::Period
        } else if NUMERIC_COLUMNS.contains(&name) {
            Self::Numeric
        } else {
            Self::Text
        }
    }

    const fn sql_type(self) -> &'static str {
        match self {
            Self::Period => "TIMESTAMP",
            Self::Numeric => "REAL",
            Self::Text => "TEXT",
        }
    }
}

/// Replace the retail table in `db_path` with the contents of `csv_path`.
///
/// Returns the number of rows loaded.
pub fn load_csv(csv_path: &Path, db_path: &Path) -> Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let kinds: Vec<ColumnKind> = headers.iter().map(|h| ColumnKind::of(h)).collect();

    let mut conn = Connection::open(db_path)?;
    let tx = conn.transaction()?;

    let table = quote_ident(RETAIL_TABLE);
    let column_defs: Vec<String> = headers
        .iter()
        .zip(&kinds)
        .map(|(name, kind)| format!("{} {}", quote_ident(name), kind.sql_type()))
        .collect();
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table};\nCREATE TABLE {table} ({});",
        column_defs.join(", ")
    ))?;

    let placeholders = vec!["?"; headers.len()].join(", ");
    let mut loaded = 0;
    {
        let mut insert = tx.prepare(&format!("INSERT INTO {table} VALUES ({placeholders})"))?;
        for (idx, record) in reader.records().enumerate() {
            let record = record?;
            let row = idx + 1;
            let values = headers
                .iter()
                .zip(&kinds)
                .zip(record.iter())
                .map(|((name, kind), raw)| convert(*kind, name, raw, row))
                .collect::<Result<Vec<_>>>()?;
            insert.execute(params_from_iter(values))?;
            loaded += 1;
        }
    }
    tx.commit()?;

    tracing::info!(rows = loaded, table = RETAIL_TABLE, db = %db_path.display(), "retail data loaded");
    Ok(loaded)
}

fn convert(kind: ColumnKind, column: &str, raw: &str, row: usize) -> Result<SqlValue> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(SqlValue::Null);
    }
    let invalid = || InsightsError::CsvValue {
        column: column.to_string(),
        row,
        value: raw.to_string(),
    };

    match kind {
        ColumnKind::Text => Ok(SqlValue::Text(raw.to_string())),
        ColumnKind::Numeric => raw
            .replace(',', "")
            .parse::<f64>()
            .map(SqlValue::Real)
            .map_err(|_| invalid()),
        ColumnKind::Period => NaiveDate::parse_from_str(&format!("01-{raw}"), "%d-%b-%y")
            .map(|date| SqlValue::Text(format!("{} 00:00:00.000000", date.format("%Y-%m-%d"))))
            .map_err(|_| invalid()),
    }
}
