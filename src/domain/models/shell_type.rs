//! The closed set of agent engines a sandbox can run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Agent engine tag. Parsed case-insensitively from the wire; an engine
/// is constructed by tag and receives an opaque `agent_config` blob it
/// alone interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellType {
    /// Claude Code: a streaming LLM client driving tool use directly.
    ClaudeCode,
    /// Agno: a multi-agent team runtime.
    Agno,
    /// Dify: an external AI gateway reached over HTTP.
    Dify,
    /// A non-conversational validation engine.
    ImageValidator,
}

impl ShellType {
    /// Lowercase wire representation, matching the original's
    /// `bot[0].shell_type.lower()` convention.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClaudeCode => "claudecode",
            Self::Agno => "agno",
            Self::Dify => "dify",
            Self::ImageValidator => "imagevalidator",
        }
    }
}

impl fmt::Display for ShellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShellType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claudecode" | "claude_code" => Ok(Self::ClaudeCode),
            "agno" => Ok(Self::Agno),
            "dify" => Ok(Self::Dify),
            "imagevalidator" | "image_validator" => Ok(Self::ImageValidator),
            other => Err(format!("unknown shell_type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(
            ShellType::from_str("ClaudeCode").unwrap(),
            ShellType::ClaudeCode
        );
        assert_eq!(ShellType::from_str("DIFY").unwrap(), ShellType::Dify);
    }

    #[test]
    fn rejects_unknown_tags() {
        assert!(ShellType::from_str("gpt5").is_err());
    }

    #[test]
    fn roundtrips_through_display() {
        for shell in [
            ShellType::ClaudeCode,
            ShellType::Agno,
            ShellType::Dify,
            ShellType::ImageValidator,
        ] {
            assert_eq!(ShellType::from_str(&shell.to_string()).unwrap(), shell);
        }
    }
}
