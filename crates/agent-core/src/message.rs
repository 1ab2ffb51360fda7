//! Conversation Messages
//!
//! Standard message format and conversation memory used across the agent system.

use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (injected as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Tool name (for tool observations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool observation message
    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content).with_name(tool_name)
    }

    /// Add a name to the message
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parse one line of client-side chat history.
    ///
    /// The web client sends `"<sender>: <text>"`. `bot` and `assistant`
    /// senders become assistant turns; everything else is a user turn.
    pub fn from_history_line(line: &str) -> Self {
        match line.split_once(':') {
            Some((sender, text)) => match sender.trim().to_lowercase().as_str() {
                "bot" | "assistant" => Self::assistant(text.trim()),
                "user" => Self::user(text.trim()),
                _ => Self::user(line.trim()),
            },
            None => Self::user(line.trim()),
        }
    }

    /// Approximate size in words, the unit used for history budgets
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

/// Keep the most recent history lines whose combined word count fits `max_words`.
///
/// Walks newest to oldest and stops at the first line that would overflow the
/// budget, so the result is always a contiguous, chronologically ordered tail.
pub fn truncate_history(history: &[String], max_words: usize) -> Vec<String> {
    let mut used = 0usize;
    let mut start = history.len();

    for (idx, line) in history.iter().enumerate().rev() {
        let words = line.split_whitespace().count();
        if used + words > max_words {
            break;
        }
        used += words;
        start = idx;
    }

    history[start..].to_vec()
}

/// Conversation memory owned by a single agent instance
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed memory from client-side history lines, oldest first
    pub fn from_history<S: AsRef<str>>(history: &[S]) -> Self {
        Self {
            messages: history
                .iter()
                .map(|line| Message::from_history_line(line.as_ref()))
                .collect(),
        }
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append a completed question/answer exchange
    pub fn record_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.push(Message::user(question));
        self.push(Message::assistant(answer));
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Render the memory as a transcript for prompt injection
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn test_message_wire_shape() {
        let value = serde_json::to_value(Message::user("Hello")).unwrap();
        assert_eq!(value, serde_json::json!({"role": "user", "content": "Hello"}));

        let parsed: Message =
            serde_json::from_value(serde_json::json!({"role": "tool", "content": "3 rows", "name": "sql_db_query"}))
                .unwrap();
        assert_eq!(parsed.role, Role::Tool);
        assert_eq!(parsed.name.as_deref(), Some("sql_db_query"));
    }

    #[test]
    fn test_history_line_roles() {
        assert_eq!(Message::from_history_line("user: hi there").role, Role::User);
        let bot = Message::from_history_line("bot: Hello!");
        assert_eq!(bot.role, Role::Assistant);
        assert_eq!(bot.content, "Hello!");
        let bare = Message::from_history_line("no sender here");
        assert_eq!(bare.role, Role::User);
        assert_eq!(bare.content, "no sender here");
    }

    #[test]
    fn test_truncate_keeps_recent_in_order() {
        let history = lines(&["one two three", "four five", "six seven eight nine", "ten"]);
        let kept = truncate_history(&history, 5);
        assert_eq!(kept, lines(&["six seven eight nine", "ten"]));
    }

    #[test]
    fn test_truncate_stops_at_first_overflow() {
        // "b" alone would fit after skipping the long line, but the tail must stay contiguous
        let history = lines(&["b", "a a a a a a", "c"]);
        let kept = truncate_history(&history, 3);
        assert_eq!(kept, lines(&["c"]));
    }

    #[test]
    fn test_truncate_within_budget_keeps_all() {
        let history = lines(&["user: hi", "bot: hello"]);
        assert_eq!(truncate_history(&history, 1000), history);
        assert!(truncate_history(&[], 10).is_empty());
    }

    #[test]
    fn test_conversation() {
        let mut conv = Conversation::from_history(&["user: Hi", "bot: Hello!"]);
        conv.record_exchange("How are sales?", "Up 10%.");

        assert_eq!(conv.len(), 4);
        assert_eq!(conv.last().map(|m| m.role), Some(Role::Assistant));
        assert!(conv.transcript().starts_with("user: Hi\nassistant: Hello!"));
    }
}
