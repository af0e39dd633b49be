use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Only the most recent turns are kept; older ones never reach the interpreter.
pub const MAX_CONTEXT_TURNS: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "ai", alias = "bot")]
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    #[serde(alias = "text")]
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Recent chat history passed explicitly with each request. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationContext {
    turns: Vec<Turn>,
}

impl ConversationContext {
    pub fn new(turns: impl IntoIterator<Item = Turn>) -> Self {
        let mut turns: Vec<Turn> = turns.into_iter().collect();
        if turns.len() > MAX_CONTEXT_TURNS {
            turns.drain(..turns.len() - MAX_CONTEXT_TURNS);
        }
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The booking id mentioned last, scanning newest turn first. Assistant turns
    /// only count when they confirm a booking ("booking ID is N").
    pub fn most_recent_booking_id(&self) -> Option<i64> {
        self.turns.iter().rev().find_map(|turn| {
            let pattern = match turn.role {
                Role::User => booking_ref_pattern(),
                Role::Assistant => confirmation_pattern(),
            };
            pattern
                .captures_iter(&turn.content)
                .filter_map(|c| c.get(1)?.as_str().parse().ok())
                .last()
        })
    }

    pub fn transcript(&self) -> String {
        if self.turns.is_empty() {
            return "(no previous messages)".to_string();
        }
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role.label(), t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn booking_ref_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bbooking\s*(?:id\s*)?(?:is\s*|number\s*)?[#:]?\s*(\d+)")
            .expect("booking reference pattern is valid")
    })
}

fn confirmation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bbooking\s+id\s+is\s+#?(\d+)").expect("confirmation pattern is valid")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_capped() {
        let turns = (0..8).map(|i| Turn::user(format!("message {i}")));
        let ctx = ConversationContext::new(turns);
        assert_eq!(ctx.turns().len(), MAX_CONTEXT_TURNS);
        assert_eq!(ctx.turns()[0].content, "message 3");
        assert_eq!(ctx.turns()[4].content, "message 7");
    }

    #[test]
    fn test_most_recent_booking_id_prefers_newest_turn() {
        let ctx = ConversationContext::new(vec![
            Turn::assistant("Your booking ID is 4."),
            Turn::user("thanks"),
            Turn::assistant("Great! I've scheduled a plumber for you. Your booking ID is 7."),
            Turn::user("actually cancel that one"),
        ]);
        assert_eq!(ctx.most_recent_booking_id(), Some(7));
    }

    #[test]
    fn test_most_recent_booking_id_variants() {
        let ctx = ConversationContext::new(vec![Turn::user("what about booking #12?")]);
        assert_eq!(ctx.most_recent_booking_id(), Some(12));

        let ctx = ConversationContext::new(vec![Turn::user("hello there")]);
        assert_eq!(ctx.most_recent_booking_id(), None);
    }

    #[test]
    fn test_assistant_errors_are_not_booking_references() {
        let ctx = ConversationContext::new(vec![
            Turn::assistant("Great! I've scheduled a plumber for you. Your booking ID is 4."),
            Turn::user("cancel booking 999"),
            Turn::assistant("I couldn't find an active booking 999. Could you please verify the booking ID?"),
        ]);
        assert_eq!(ctx.most_recent_booking_id(), Some(999));

        let ctx = ConversationContext::new(vec![
            Turn::assistant("Great! I've scheduled a plumber for you. Your booking ID is 4."),
            Turn::user("cancel it"),
            Turn::assistant("I couldn't find an active booking 999. It may not exist."),
        ]);
        assert_eq!(ctx.most_recent_booking_id(), Some(4));
    }

    #[test]
    fn test_turn_deserializes_aliases() {
        let turn: Turn = serde_json::from_str(r#"{"role":"ai","text":"hi"}"#).unwrap();
        assert_eq!(turn, Turn::assistant("hi"));
    }
}
