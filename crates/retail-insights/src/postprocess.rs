//! Answer post-processing
//!
//! Finds chart payloads the model embedded in its answer as
//!
//! ````text
//! Chart data: ```json {"columns": [...], "data": [[...]], "chart_type": "line"}```
//! ````
//!
//! and swaps each one for a rendered chart, or for a notice that shows the raw
//! data when it cannot be drawn. Model output is untrusted; nothing here fails
//! the request.

use regex::{Captures, Regex};

use crate::error::Result;
use crate::model::ChartPayload;
use crate::render::render_chart;

/// Literal tag that introduces a chart payload
pub const CHART_TAG: &str = "Chart data:";

/// Tag, optional whitespace, then a ```json fenced block (dot matches newline)
const CHART_MARKER: &str = r"(?s)Chart data:\s*```json\s*(.*?)\s*```";

pub const CHART_PREFIX: &str = "Here's the generated chart:\n\n";
pub const FALLBACK_PREFIX: &str =
    "Sorry, there was an error generating the chart. Here's the data instead:\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MarkerCounts {
    tags: usize,
    replaced: usize,
}

impl MarkerCounts {
    const fn unmatched(self) -> usize {
        self.tags.saturating_sub(self.replaced)
    }
}

#[derive(Debug)]
pub struct ChartPostProcessor {
    marker: Regex,
}

impl ChartPostProcessor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            marker: Regex::new(CHART_MARKER)?,
        })
    }

    /// Replace every chart marker block in `raw`, in order of appearance
    pub fn process(&self, raw: &str) -> String {
        if !raw.contains(CHART_TAG) {
            tracing::debug!("no chart data in response");
            return raw.to_string();
        }

        let (output, counts) = self.rewrite(raw);
        if counts.unmatched() > 0 {
            tracing::warn!(
                event = "chart_marker_unmatched",
                tags = counts.tags,
                charts = counts.replaced,
                "chart tag present but no fenced JSON block follows it"
            );
        }
        if counts.replaced > 0 {
            tracing::info!(charts = counts.replaced, "chart processing completed");
        }
        output
    }

    fn rewrite(&self, raw: &str) -> (String, MarkerCounts) {
        let mut replaced = 0_usize;
        let output = self.marker.replace_all(raw, |caps: &Captures<'_>| {
            replaced += 1;
            Self::replacement(&caps[1])
        });
        let counts = MarkerCounts {
            tags: raw.matches(CHART_TAG).count(),
            replaced,
        };
        (output.into_owned(), counts)
    }

    fn replacement(raw_json: &str) -> String {
        match ChartPayload::from_json(raw_json).and_then(|payload| render_chart(&payload)) {
            Ok(image) => format!("{CHART_PREFIX}{image}"),
            Err(err) => {
                tracing::error!(error = %err, "chart could not be generated, showing raw data");
                format!("{FALLBACK_PREFIX}{raw_json}")
            }
        }
    }
}
