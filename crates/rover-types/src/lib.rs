//! `rover-types` – shared vocabulary for the rover autopilot.
//!
//! Pure data: the closed [`Command`] set the actuator understands, the
//! immutable [`Decision`] records the loop emits once per cycle, the
//! [`LoopStatus`] snapshot served to observers, and the global
//! [`RoverError`] type.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Command vocabulary
// ─────────────────────────────────────────────────────────────────────────────

/// The motion primitives the drive base accepts.  Anything else is invalid
/// and must never reach the drive base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Forward,
    Left,
    Right,
    Back,
    Stop,
}

impl Command {
    /// Every command, in the order the oracle prompt lists them.
    pub const ALL: [Command; 5] = [
        Command::Forward,
        Command::Left,
        Command::Right,
        Command::Back,
        Command::Stop,
    ];

    /// Priority order used when scanning free text for a keyword.
    ///
    /// `back` is checked before `left`/`right`, unlike [`Command::ALL`].
    pub const FALLBACK_SCAN_ORDER: [Command; 5] = [
        Command::Forward,
        Command::Back,
        Command::Left,
        Command::Right,
        Command::Stop,
    ];

    /// Lowercase token for this command, e.g. `"forward"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Forward => "forward",
            Command::Left => "left",
            Command::Right => "right",
            Command::Back => "back",
            Command::Stop => "stop",
        }
    }

    /// Single byte understood by the drive-base firmware.
    ///
    /// The firmware halts on any byte outside `'0'..='3'`; `'s'` is used for
    /// an explicit stop.
    pub fn wire_byte(self) -> u8 {
        match self {
            Command::Forward => b'0',
            Command::Right => b'1',
            Command::Left => b'2',
            Command::Back => b'3',
            Command::Stop => b's',
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a token is not one of the five primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown command: {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    /// Exact match after lowercasing and trimming.  No synonyms, no prefixes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_lowercase();
        Command::ALL
            .into_iter()
            .find(|c| c.as_str() == token)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

/// `true` iff `token`, lowercased and trimmed, names one of the primitives.
pub fn is_valid(token: &str) -> bool {
    token.parse::<Command>().is_ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Decisions
// ─────────────────────────────────────────────────────────────────────────────

/// What a cycle ended with: a validated command or an error.
///
/// Serialised as a bare string (`"forward"`, …, `"error"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionTag {
    Command(Command),
    Error,
}

impl DecisionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionTag::Command(c) => c.as_str(),
            DecisionTag::Error => "error",
        }
    }
}

impl FromStr for DecisionTag {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "error" {
            return Ok(DecisionTag::Error);
        }
        s.parse().map(DecisionTag::Command)
    }
}

impl Serialize for DecisionTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DecisionTag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One entry of the decision history.  Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Wall-clock time, whole seconds.
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "command")]
    pub tag: DecisionTag,
    pub reason: String,
}

impl Decision {
    /// A successfully validated command and the oracle's rationale.
    pub fn command(command: Command, reason: impl Into<String>) -> Self {
        Self::at(Utc::now(), DecisionTag::Command(command), reason)
    }

    /// A failed cycle; `message` describes what went wrong.
    pub fn error(message: impl Into<String>) -> Self {
        Self::at(Utc::now(), DecisionTag::Error, message)
    }

    fn at(now: DateTime<Utc>, tag: DecisionTag, reason: impl Into<String>) -> Self {
        Self {
            timestamp: now.trunc_subsecs(0),
            tag,
            reason: reason.into(),
        }
    }

    /// The command, if this decision was not an error.
    pub fn as_command(&self) -> Option<Command> {
        match self.tag {
            DecisionTag::Command(c) => Some(c),
            DecisionTag::Error => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.tag == DecisionTag::Error
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop status
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of the decision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Point-in-time snapshot of the decision loop, safe to hand to any number of
/// concurrent readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopStatus {
    pub running: bool,
    pub state: LoopState,
    /// Effective pacing interval in seconds (already clamped).
    pub interval_secs: f64,
    /// Oracle model identifier.
    pub model: String,
    pub last_command: Option<Command>,
    pub last_reason: Option<String>,
    pub last_error: Option<String>,
    /// Most recent decisions, oldest first.
    pub decisions: Vec<Decision>,
    /// An oracle client is compiled in and wired up.
    pub oracle_client_available: bool,
    /// The oracle credential is present in the environment.
    pub credential_present: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Global error type: start-up configuration and hardware failures.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoverError {
    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_valid_accepts_case_and_whitespace() {
        assert!(is_valid("forward"));
        assert!(is_valid("  Back\n"));
        assert!(is_valid("STOP"));
    }

    #[test]
    fn is_valid_rejects_partial_and_synonyms() {
        assert!(!is_valid("forwards"));
        assert!(!is_valid("fwd"));
        assert!(!is_valid("turn left"));
        assert!(!is_valid(""));
    }

    #[test]
    fn command_serializes_lowercase() {
        let json = serde_json::to_string(&Command::Forward).unwrap();
        assert_eq!(json, "\"forward\"");
    }

    #[test]
    fn wire_bytes_match_firmware_table() {
        assert_eq!(Command::Forward.wire_byte(), b'0');
        assert_eq!(Command::Right.wire_byte(), b'1');
        assert_eq!(Command::Left.wire_byte(), b'2');
        assert_eq!(Command::Back.wire_byte(), b'3');
        assert_eq!(Command::Stop.wire_byte(), b's');
    }

    #[test]
    fn fallback_order_checks_back_before_turns() {
        assert_eq!(Command::FALLBACK_SCAN_ORDER[1], Command::Back);
        assert_eq!(Command::FALLBACK_SCAN_ORDER.len(), Command::ALL.len());
    }

    #[test]
    fn decision_tag_serializes_as_plain_string() {
        let d = Decision::command(Command::Left, "wall ahead");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["command"], "left");
        assert_eq!(json["reason"], "wall ahead");

        let e = Decision::error("timeout");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["command"], "error");
    }

    #[test]
    fn decision_timestamp_has_second_precision() {
        let d = Decision::error("x");
        assert_eq!(d.timestamp.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn decision_tag_rejects_unknown_string() {
        assert!("jump".parse::<DecisionTag>().is_err());
        let back: Decision =
            serde_json::from_str(r#"{"timestamp":"2026-01-01T00:00:00Z","command":"error","reason":"x"}"#)
                .unwrap();
        assert!(back.is_error());
    }

    #[test]
    fn rover_error_display() {
        let err = RoverError::Configuration("GEMINI_API_KEY not set".into());
        assert!(err.to_string().contains("Configuration"));

        let err2 = RoverError::HardwareFault {
            component: "drive_base".to_string(),
            details: "link closed".to_string(),
        };
        assert!(err2.to_string().contains("drive_base"));
    }
}
