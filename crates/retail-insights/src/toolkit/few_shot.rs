//! Few-shot SQL example retrieval
//!
//! Nearest-neighbour search over embedded example questions. The index is
//! built once per process; every lookup embeds only the incoming query.

use std::sync::Arc;

use agent_core::{Embedder, Result};

/// Returned when there is nothing to retrieve
pub const NO_MATCH: &str = "No relevant examples found.";

/// Curated (question, SQL) pairs for the retail table
pub const FEW_SHOT_EXAMPLES: [(&str, &str); 19] = [
    (
        "List all the brands available in Abidjan.",
        "SELECT DISTINCT Brand FROM retail_data WHERE City = 'Abidjan';",
    ),
    (
        "What is the total sales value for Boutique channels?",
        "SELECT SUM(Sales_Value) FROM retail_data WHERE Channel = 'Boutique';",
    ),
    (
        "Who is the manufacturer with the highest sales value?",
        "SELECT Manufacturer, SUM(Sales_Value) AS total_sales FROM retail_data GROUP BY Manufacturer ORDER BY total_sales DESC LIMIT 1;",
    ),
    (
        "How many unique items are sold in the pasta category?",
        "SELECT COUNT(DISTINCT `Item Name`) FROM retail_data WHERE Category = 'PASTA';",
    ),
    (
        "Sort the items by unit price in descending order.",
        "SELECT `Item Name`, Unit_Price FROM retail_data ORDER BY Unit_Price DESC;",
    ),
    (
        "Are there any sales in the segment 'DRY PASTA' in Jan-21?",
        "SELECT * FROM retail_data WHERE Segment = 'DRY PASTA' AND Period = 'Jan-21';",
    ),
    (
        "What is the average unit price of items in 'CAPRA' manufacturer?",
        "SELECT AVG(Unit_Price) FROM retail_data WHERE Manufacturer = 'CAPRA';",
    ),
    (
        "Which city has the highest total sales volume?",
        "SELECT City, SUM(`Sales_Volume(KG_LTRS)`) AS total_volume FROM retail_data GROUP BY City ORDER BY total_volume DESC LIMIT 1;",
    ),
    (
        "List all item names that have a pack size of 200G.",
        "SELECT `Item Name` FROM retail_data WHERE Pack_Size = '200G';",
    ),
    (
        "How many different packaging types are used?",
        "SELECT COUNT(DISTINCT Packaging) FROM retail_data;",
    ),
    (
        "What is the total sales value for the brand 'MAMAN'?",
        "SELECT SUM(Sales_Value) FROM retail_data WHERE Brand = 'MAMAN';",
    ),
    (
        "List all manufacturers in alphabetical order.",
        "SELECT DISTINCT Manufacturer FROM retail_data ORDER BY Manufacturer;",
    ),
    (
        "What is the unit price of the cheapest item?",
        "SELECT `Item Name`, Unit_Price FROM retail_data ORDER BY Unit_Price ASC LIMIT 1;",
    ),
    (
        "How many cities have recorded sales in Jan-21?",
        "SELECT COUNT(DISTINCT City) FROM retail_data WHERE Period = 'Jan-21';",
    ),
    (
        "What is the highest sales volume recorded for 'Boutique' channels?",
        "SELECT MAX(`Sales_Volume(KG_LTRS)`) FROM retail_data WHERE Channel = 'Boutique';",
    ),
    (
        "Which item has the highest sales value in 'DRY PASTA' segment?",
        "SELECT `Item Name`, Sales_Value FROM retail_data WHERE Segment = 'DRY PASTA' ORDER BY Sales_Value DESC LIMIT 1;",
    ),
    (
        "How many brands are produced by 'CAPRA' manufacturer?",
        "SELECT COUNT(DISTINCT Brand) FROM retail_data WHERE Manufacturer = 'CAPRA';",
    ),
    (
        "List all items with a unit price greater than 100.",
        "SELECT `Item Name`, Unit_Price FROM retail_data WHERE Unit_Price > 100;",
    ),
    (
        "What is the total sales volume for all items in 200G pack size?",
        "SELECT SUM(`Sales_Volume(KG_LTRS)`) FROM retail_data WHERE Pack_Size = '200G';",
    ),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FewShotExample {
    pub question: String,
    pub sql: String,
}

impl FewShotExample {
    pub fn render(&self) -> String {
        format!("Question: {}\nSQL: {}", self.question, self.sql)
    }
}

/// Embedded example set
pub struct FewShotIndex {
    embedder: Arc<dyn Embedder>,
    entries: Vec<(FewShotExample, Vec<f32>)>,
}

impl FewShotIndex {
    /// Index the curated examples
    pub async fn build(embedder: Arc<dyn Embedder>) -> Result<Self> {
        let examples = FEW_SHOT_EXAMPLES
            .iter()
            .map(|(question, sql)| FewShotExample {
                question: (*question).to_string(),
                sql: (*sql).to_string(),
            })
            .collect();
        Self::with_examples(embedder, examples).await
    }

    pub async fn with_examples(
        embedder: Arc<dyn Embedder>,
        examples: Vec<FewShotExample>,
    ) -> Result<Self> {
        let questions: Vec<String> = examples.iter().map(|e| e.question.clone()).collect();
        let vectors = embedder.embed(&questions).await?;
        tracing::info!(examples = examples.len(), "few-shot index built");
        Ok(Self {
            embedder,
            entries: examples.into_iter().zip(vectors).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most similar example to `query`, or `None` for an empty index
    pub async fn nearest(&self, query: &str) -> Result<Option<&FewShotExample>> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        Ok(self
            .entries
            .iter()
            .map(|(example, vector)| (example, cosine_similarity(&query_vec, vector)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(example, _)| example))
    }

    /// Tool output for `query`
    pub async fn lookup(&self, query: &str) -> Result<String> {
        Ok(self
            .nearest(query)
            .await?
            .map_or_else(|| NO_MATCH.to_string(), FewShotExample::render))
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
