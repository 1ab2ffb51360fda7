//! SQL database tools
//!
//! Table listing, schema lookup, query execution and the model-assisted
//! query checker.

use agent_core::{LlmProvider, Message, TokenUsage, UsageTracker};

use crate::error::Result;
use crate::store::QueryableStore;

const QUERY_CHECKER_PROMPT: &str = "\
Double check the SQLite query above for common mistakes, including:
- Using NOT IN with NULL values
- Using UNION when UNION ALL should have been used
- Using BETWEEN for exclusive ranges
- Data type mismatch in predicates
- Properly quoting identifiers
- Using the correct number of arguments for functions
- Casting to the correct data type
- Using the proper columns for joins

If there are any of the above mistakes, rewrite the query. If there are no mistakes, just reproduce the original query.

Output the final SQL query only.";

pub async fn list_tables(store: &dyn QueryableStore) -> Result<String> {
    Ok(store.list_tables().await?.join(", "))
}

/// Schema and sample rows for a comma-separated table list
pub async fn table_schema(store: &dyn QueryableStore, table_names: &str) -> Result<String> {
    let tables: Vec<String> = table_names
        .split(',')
        .map(|t| t.trim().trim_matches(|c: char| c == '"' || c == '`' || c == '\'').to_string())
        .filter(|t| !t.is_empty())
        .collect();
    store.table_info(&tables).await
}

pub async fn run_query(store: &dyn QueryableStore, query: &str) -> Result<String> {
    Ok(store.run(strip_code_fence(query)).await?.render())
}

/// Ask the tool model to review a query; returns the model's corrected query
pub async fn check_query(
    checker: &dyn LlmProvider,
    usage: &UsageTracker,
    query: &str,
) -> Result<String> {
    let messages = vec![
        Message::system("You are a SQLite expert."),
        Message::user(format!("{query}\n\n{QUERY_CHECKER_PROMPT}")),
    ];
    let completion = checker.complete(&messages, checker.options()).await?;

    let tokens = completion.usage.unwrap_or_else(|| {
        TokenUsage::new(
            checker.estimate_tokens(&messages[1].content),
            checker.estimate_tokens(&completion.content),
        )
    });
    usage.record(&tokens, &checker.pricing());

    Ok(strip_code_fence(&completion.content).to_string())
}

/// Models often wrap SQL in a ```sql fence
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    let inner = ["sqlite", "sql"]
        .iter()
        .find_map(|tag| strip_fence_tag(inner, tag))
        .unwrap_or(inner);
    inner.trim()
}

/// Drops a fence info string such as `sql` or `SQLite`, only when it stands alone
fn strip_fence_tag<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let head = text.get(..tag.len())?;
    let rest = &text[tag.len()..];
    let standalone = rest.chars().next().is_none_or(char::is_whitespace);
    (head.eq_ignore_ascii_case(tag) && standalone).then_some(rest)
}
