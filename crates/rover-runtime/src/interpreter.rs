//! Response interpreter – turns raw oracle text into a validated [`Command`].
//!
//! # Algorithm
//!
//! Two stages, first success wins:
//!
//! 1. **Structured** – strip a surrounding code fence (```` ``` ````, with an
//!    optional language tag such as `json`), then parse the remainder as a
//!    JSON object with `command` and `reason` fields.  The command must be in
//!    the vocabulary after lowercasing and trimming.
//! 2. **Keyword scan** – lowercase the whole text and look for the literal
//!    substrings `forward`, `back`, `left`, `right`, `stop`, in that order.
//!    The reason becomes the first 100 characters of the text.
//!
//! If neither stage yields a command the interpreter returns `None`; callers
//! record that as an error decision.
//!
//! ```rust
//! use rover_runtime::interpreter::interpret;
//! use rover_types::Command;
//!
//! let hit = interpret("```json\n{\"command\": \"left\", \"reason\": \"wall ahead\"}\n```").unwrap();
//! assert_eq!(hit.command, Command::Left);
//! assert_eq!(hit.reason, "wall ahead");
//!
//! assert!(interpret("unable to determine scene").is_none());
//! ```

use rover_types::Command;
use serde_json::Value;

/// Characters of raw text kept as the reason for a keyword match.
pub const KEYWORD_REASON_CHARS: usize = 100;

const FENCE: &str = "```";

/// Which stage produced the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseRoute {
    Structured,
    Keyword,
}

/// A validated command plus the rationale to log with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub command: Command,
    pub reason: String,
    pub route: ParseRoute,
}

/// Interpret one oracle reply.  Never panics, never errors: `None` means the
/// text carried no usable command.
pub fn interpret(raw: &str) -> Option<Interpretation> {
    parse_structured(raw).or_else(|| scan_keywords(raw))
}

/// Strip a leading/trailing code fence and an optional `json` language tag.
pub fn strip_code_fence(text: &str) -> &str {
    let mut body = text.trim();
    if body.starts_with(FENCE) {
        // The fence line may carry a language tag; drop the whole line.
        body = match body.split_once('\n') {
            Some((_, rest)) => rest,
            None => &body[FENCE.len()..],
        };
    }
    if let Some(stripped) = body.strip_suffix(FENCE) {
        body = stripped;
    }
    body = body.trim();
    if let Some(stripped) = body.strip_prefix("json") {
        body = stripped.trim();
    }
    body
}

/// First `max_chars` characters of `text` (char-boundary safe).
pub fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn parse_structured(raw: &str) -> Option<Interpretation> {
    let value: Value = serde_json::from_str(strip_code_fence(raw)).ok()?;
    let command = value.get("command")?.as_str()?.parse::<Command>().ok()?;
    let reason = match value.get("reason") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    Some(Interpretation {
        command,
        reason,
        route: ParseRoute::Structured,
    })
}

fn scan_keywords(raw: &str) -> Option<Interpretation> {
    let text = raw.trim();
    let lower = text.to_lowercase();
    let command = Command::FALLBACK_SCAN_ORDER
        .into_iter()
        .find(|c| lower.contains(c.as_str()))?;
    Some(Interpretation {
        command,
        reason: excerpt(text, KEYWORD_REASON_CHARS),
        route: ParseRoute::Keyword,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_with_mixed_case_command() {
        let hit = interpret(r#"{"command": "Forward", "reason": "clear path"}"#).unwrap();
        assert_eq!(hit.command, Command::Forward);
        assert_eq!(hit.reason, "clear path");
        assert_eq!(hit.route, ParseRoute::Structured);
    }

    #[test]
    fn fenced_json_with_language_tag() {
        let raw = "```json\n{\"command\": \"left\", \"reason\": \"wall ahead\"}\n```";
        let hit = interpret(raw).unwrap();
        assert_eq!(hit.command, Command::Left);
        assert_eq!(hit.reason, "wall ahead");
        assert_eq!(hit.route, ParseRoute::Structured);
    }

    #[test]
    fn fenced_json_without_language_tag() {
        let raw = "```\n{\"command\": \"right\", \"reason\": \"doorway\"}\n```";
        assert_eq!(interpret(raw).unwrap().command, Command::Right);
    }

    #[test]
    fn single_line_fence_with_tag() {
        let raw = "```json {\"command\": \"back\", \"reason\": \"too close\"}```";
        let hit = interpret(raw).unwrap();
        assert_eq!(hit.command, Command::Back);
        assert_eq!(hit.route, ParseRoute::Structured);
    }

    #[test]
    fn command_field_is_trimmed() {
        let hit = interpret(r#"{"command": "  STOP ", "reason": "dark"}"#).unwrap();
        assert_eq!(hit.command, Command::Stop);
    }

    #[test]
    fn missing_reason_is_empty_string() {
        let hit = interpret(r#"{"command": "stop"}"#).unwrap();
        assert_eq!(hit.reason, "");
        assert_eq!(hit.route, ParseRoute::Structured);
    }

    #[test]
    fn keyword_fallback_finds_back() {
        let raw = "I see an obstacle, you should go back slowly";
        let hit = interpret(raw).unwrap();
        assert_eq!(hit.command, Command::Back);
        assert_eq!(hit.reason, raw);
        assert_eq!(hit.route, ParseRoute::Keyword);
    }

    #[test]
    fn keyword_priority_order() {
        assert_eq!(interpret("turn left then go forward").unwrap().command, Command::Forward);
        assert_eq!(interpret("right or back?").unwrap().command, Command::Back);
        assert_eq!(interpret("right, no, LEFT").unwrap().command, Command::Left);
        assert_eq!(interpret("stop and go right").unwrap().command, Command::Right);
        assert_eq!(interpret("please STOP").unwrap().command, Command::Stop);
    }

    #[test]
    fn invalid_structured_command_falls_back_to_scan() {
        let raw = r#"{"command": "jump", "reason": "then move forward"}"#;
        let hit = interpret(raw).unwrap();
        assert_eq!(hit.command, Command::Forward);
        assert_eq!(hit.route, ParseRoute::Keyword);
    }

    #[test]
    fn non_object_json_falls_back_to_scan() {
        let hit = interpret(r#"["left"]"#).unwrap();
        assert_eq!(hit.command, Command::Left);
        assert_eq!(hit.route, ParseRoute::Keyword);
    }

    #[test]
    fn keyword_reason_is_truncated_to_100_chars() {
        let raw = format!("stop {}", "é".repeat(200));
        let hit = interpret(&raw).unwrap();
        assert_eq!(hit.reason.chars().count(), KEYWORD_REASON_CHARS);
    }

    #[test]
    fn no_structure_no_keyword_is_none() {
        assert!(interpret("unable to determine scene").is_none());
        assert!(interpret("").is_none());
        assert!(interpret(r#"{"command": "jump", "reason": "hm"}"#).is_none());
    }

    #[test]
    fn strip_code_fence_variants() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
        assert_eq!(strip_code_fence("json {}"), "{}");
        assert_eq!(strip_code_fence("```"), "");
    }
}
