//! Chart data preparation
//!
//! Shapes model-supplied chart data into a [`ChartPayload`]. The model may send
//! the payload as a JSON string or an object under `input_data`, or as flat
//! `columns`/`data`/`chart_type` arguments; all three normalize identically.
//! Nothing is rendered here.

use agent_core::ToolCall;
use serde_json::{Map, Value};

use crate::error::{InsightsError, Result};
use crate::model::ChartPayload;

pub const INPUT_DATA: &str = "input_data";

/// Normalize the arguments of a `generate_chart` call
pub fn prepare_chart(call: &ToolCall) -> Result<ChartPayload> {
    let payload = match call.arguments.get(INPUT_DATA) {
        Some(Value::String(text)) => ChartPayload::from_json(text),
        Some(Value::Object(object)) => ChartPayload::from_object(object),
        Some(_) => Err(InsightsError::invalid_field(
            INPUT_DATA,
            "expected a JSON string or an object",
        )),
        None => {
            let flat: Map<String, Value> = call
                .arguments
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            ChartPayload::from_object(&flat)
        }
    };

    if let Err(err) = &payload {
        tracing::error!(error = %err, "error preparing chart data");
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChartType;
    use serde_json::json;

    fn logical_payload() -> Value {
        json!({
            "columns": ["Period", "City", "Sales_Value"],
            "data": [["Jan-21", "Abidjan", 21_286_480.6], ["Feb-21", "Abidjan", 26_580_841.7]],
            "chart_type": "line"
        })
    }

    #[test]
    fn test_three_forms_are_equivalent() {
        let from_string = prepare_chart(
            &ToolCall::new("generate_chart").arg(INPUT_DATA, json!(logical_payload().to_string())),
        )
        .unwrap();
        let from_object =
            prepare_chart(&ToolCall::new("generate_chart").arg(INPUT_DATA, logical_payload()))
                .unwrap();

        let mut flat = ToolCall::new("generate_chart");
        if let Value::Object(fields) = logical_payload() {
            for (key, value) in fields {
                flat = flat.arg(key, value);
            }
        }
        let from_args = prepare_chart(&flat).unwrap();

        assert_eq!(from_string, from_object);
        assert_eq!(from_object, from_args);
        assert_eq!(from_args.chart_type, ChartType::Line);
        assert_eq!(from_args.data.len(), 2);
    }

    #[test]
    fn test_idempotent() {
        let call = ToolCall::new("generate_chart").arg(INPUT_DATA, logical_payload());
        let first = prepare_chart(&call).unwrap();
        let again = prepare_chart(
            &ToolCall::new("generate_chart").arg(INPUT_DATA, serde_json::to_value(&first).unwrap()),
        )
        .unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_missing_fields_listed() {
        let err = prepare_chart(&ToolCall::new("generate_chart").arg("columns", json!(["a", "b"])))
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: data, chart_type");

        let err = prepare_chart(&ToolCall::new("generate_chart").arg(INPUT_DATA, json!("{}")))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required fields: columns, data, chart_type"
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        let bad_json = ToolCall::new("generate_chart").arg(INPUT_DATA, json!("{\"columns\": ["));
        assert!(matches!(
            prepare_chart(&bad_json),
            Err(InsightsError::Serialization(_))
        ));

        let bad_type = ToolCall::new("generate_chart").arg(INPUT_DATA, json!(42));
        assert!(matches!(
            prepare_chart(&bad_type),
            Err(InsightsError::InvalidField { .. })
        ));

        let mut unknown_kind = logical_payload();
        unknown_kind["chart_type"] = json!("heatmap");
        let call = ToolCall::new("generate_chart").arg(INPUT_DATA, unknown_kind);
        assert!(prepare_chart(&call).unwrap_err().to_string().contains("heatmap"));
    }
}
