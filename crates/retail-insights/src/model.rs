//! Domain Models
//!
//! Request/answer types and the normalized chart payload shared by the chart
//! tool, the renderer and the answer post-processor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{InsightsError, Result};

/// One analytics question as received from a caller
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    pub tool_model: String,
    pub agent_model: String,

    /// Oldest first
    #[serde(default)]
    pub chat_history: Vec<String>,
}

/// Post-processed answer with usage accounting
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsightsAnswer {
    pub output: String,
    pub tokens_used: u64,
    pub cost: f64,
}

/// Supported chart kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
}

impl ChartType {
    pub const ALL: [Self; 4] = [Self::Bar, Self::Line, Self::Pie, Self::Scatter];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Pie => "pie",
            Self::Scatter => "scatter",
        }
    }

    /// "Line Chart", "Pie Chart", ...
    pub fn title(self) -> String {
        let name = self.as_str();
        let mut chars = name.chars();
        let first = chars.next().map(|c| c.to_ascii_uppercase()).unwrap_or_default();
        format!("{first}{} Chart", chars.as_str())
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartType {
    type Err = InsightsError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                InsightsError::invalid_field(
                    "chart_type",
                    format!("'{s}' is not one of bar, line, pie, scatter"),
                )
            })
    }
}

/// Normalized chart description: `{columns, data, chart_type}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartPayload {
    pub columns: Vec<String>,
    pub data: Vec<Vec<Value>>,
    pub chart_type: ChartType,
}

impl ChartPayload {
    pub const REQUIRED_FIELDS: [&'static str; 3] = ["columns", "data", "chart_type"];

    /// Shape a loosely typed object into a payload.
    ///
    /// Every absent field is reported at once; unknown extra keys are ignored.
    pub fn from_object(object: &Map<String, Value>) -> Result<Self> {
        let missing: Vec<String> = Self::REQUIRED_FIELDS
            .iter()
            .filter(|field| !object.contains_key(**field))
            .map(|field| (*field).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(InsightsError::MissingFields(missing));
        }

        let columns = match &object["columns"] {
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(InsightsError::invalid_field(
                        "columns",
                        format!("expected column names, found {other}"),
                    )),
                })
                .collect::<Result<Vec<_>>>()?,
            _ => {
                return Err(InsightsError::invalid_field(
                    "columns",
                    "expected a list of column names",
                ));
            }
        };

        let data = match &object["data"] {
            Value::Array(rows) => rows
                .iter()
                .map(|row| match row {
                    Value::Array(cells) => Ok(cells.clone()),
                    _ => Err(InsightsError::invalid_field("data", "every row must be a list")),
                })
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(InsightsError::invalid_field("data", "expected a list of rows")),
        };

        let chart_type = match &object["chart_type"] {
            Value::String(s) => s.parse()?,
            _ => {
                return Err(InsightsError::invalid_field(
                    "chart_type",
                    "expected a string",
                ));
            }
        };

        Ok(Self {
            columns,
            data,
            chart_type,
        })
    }

    /// Parse a payload from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(object) => Self::from_object(&object),
            _ => Err(InsightsError::invalid_field(
                "input_data",
                "expected a JSON object",
            )),
        }
    }

    /// Every row must have exactly one cell per column
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(InsightsError::invalid_field("columns", "no columns given"));
        }
        if let Some((idx, row)) = self
            .data
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.columns.len())
        {
            return Err(InsightsError::invalid_field(
                "data",
                format!(
                    "row {idx} has {} values but there are {} columns",
                    row.len(),
                    self.columns.len()
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_chart_type_parsing() {
        assert_eq!("Line".parse::<ChartType>().unwrap(), ChartType::Line);
        assert_eq!(ChartType::Pie.title(), "Pie Chart");
        assert!("heatmap".parse::<ChartType>().is_err());
    }

    #[test]
    fn test_from_object_reports_all_missing() {
        let err = ChartPayload::from_object(&object(json!({"columns": ["a"]}))).unwrap_err();
        match err {
            InsightsError::MissingFields(fields) => assert_eq!(fields, vec!["data", "chart_type"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_serializes_to_marker_shape() {
        let payload = ChartPayload::from_json(
            r#"{"columns": ["Period", "Sales_Value"], "data": [["Jan-21", 100]], "chart_type": "line"}"#,
        )
        .unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["chart_type"], "line");
        assert_eq!(value["data"][0][1], 100);
    }

    #[test]
    fn test_validate_row_lengths() {
        let mut payload = ChartPayload {
            columns: vec!["City".into(), "Sales_Value".into()],
            data: vec![vec![json!("Abidjan"), json!(10.5)]],
            chart_type: ChartType::Bar,
        };
        assert!(payload.validate().is_ok());

        payload.data.push(vec![json!("Bouake")]);
        let err = payload.validate().unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }
}
