//! Read-only statement guard
//!
//! Rejects anything but a single query statement before it reaches the
//! database. Connections are additionally opened read-only.

use crate::error::{InsightsError, Result};

/// Keywords that only appear in statements that change data or schema
const FORBIDDEN: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "UPSERT", "CREATE", "DROP", "ALTER", "TRUNCATE", "ATTACH",
    "DETACH", "VACUUM", "REINDEX", "ANALYZE", "BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT",
    "RELEASE",
];

const READ_PRAGMAS: &[&str] = &["TABLE_INFO", "TABLE_XINFO", "INDEX_LIST", "INDEX_INFO"];

/// Accept one `SELECT`, `WITH`, `VALUES`, `EXPLAIN` or introspection `PRAGMA`
pub fn ensure_read_only(sql: &str) -> Result<()> {
    let code = blank_literals(sql)?;
    let code = code.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if code.is_empty() {
        return Err(InsightsError::ReadOnly("empty statement".into()));
    }
    if code.contains(';') {
        return Err(InsightsError::ReadOnly(
            "only one statement may be executed at a time".into(),
        ));
    }

    let words: Vec<String> = code
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_uppercase)
        .collect();

    match words.first().map(String::as_str) {
        Some("SELECT" | "WITH" | "VALUES" | "EXPLAIN") => {}
        Some("PRAGMA") => {
            let pragma = words.get(1).map(String::as_str).unwrap_or_default();
            if !READ_PRAGMAS.contains(&pragma) || code.contains('=') {
                return Err(InsightsError::ReadOnly(format!(
                    "PRAGMA {} is not permitted",
                    pragma.to_ascii_lowercase()
                )));
            }
        }
        Some(other) => {
            return Err(InsightsError::ReadOnly(format!(
                "{other} statements are not permitted"
            )));
        }
        None => return Err(InsightsError::ReadOnly("no statement found".into())),
    }

    if let Some(word) = words.iter().find(|w| FORBIDDEN.contains(&w.as_str())) {
        return Err(InsightsError::ReadOnly(format!(
            "{word} statements are not permitted"
        )));
    }
    // REPLACE is also a string function; only REPLACE INTO writes
    if words
        .windows(2)
        .any(|pair| pair[0] == "REPLACE" && pair[1] == "INTO")
    {
        return Err(InsightsError::ReadOnly(
            "REPLACE statements are not permitted".into(),
        ));
    }

    Ok(())
}

/// Replace quoted text, quoted identifiers and comments with spaces so that
/// keyword and separator checks only see SQL structure.
fn blank_literals(sql: &str) -> Result<String> {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        let closing = match c {
            '\'' | '"' | '`' => Some(c),
            '[' => Some(']'),
            '-' if chars.peek() == Some(&'-') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
                out.push('\n');
                continue;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                let mut closed = false;
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        closed = true;
                        break;
                    }
                    prev = next;
                }
                if !closed {
                    return Err(InsightsError::ReadOnly("unterminated comment".into()));
                }
                out.push(' ');
                continue;
            }
            _ => None,
        };

        match closing {
            Some(end) => {
                if !chars.by_ref().any(|next| next == end) {
                    return Err(InsightsError::ReadOnly(format!(
                        "unterminated {c}quoted{end} text"
                    )));
                }
                out.push(' ');
            }
            None => out.push(c),
        }
    }

    Ok(out)
}
