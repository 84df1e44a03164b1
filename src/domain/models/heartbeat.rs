//! Heartbeat key classes.

use std::fmt;

/// The two heartbeat key classes, keyed by id, as laid out in the Redis
/// key table: `sandbox:heartbeat:{id}` and `task:heartbeat:{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeartbeatKind {
    Sandbox,
    Task,
}

impl HeartbeatKind {
    pub const fn key_prefix(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox:heartbeat:",
            Self::Task => "task:heartbeat:",
        }
    }

    pub fn key_for(self, id: &str) -> String {
        format!("{}{id}", self.key_prefix())
    }
}

impl fmt::Display for HeartbeatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sandbox => f.write_str("sandbox"),
            Self::Task => f.write_str("task"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_the_redis_key_table() {
        assert_eq!(HeartbeatKind::Sandbox.key_for("100"), "sandbox:heartbeat:100");
        assert_eq!(HeartbeatKind::Task.key_for("200"), "task:heartbeat:200");
    }
}
