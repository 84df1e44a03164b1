//! Shared `silent_exit` marker logic, grounded verbatim in
//! `executor/tools/silent_exit.py`. Used both by `response_processor`'s
//! in-stream detection and by the `wegent-mcp-silent-exit` MCP tool
//! binary, which exposes the same tool over stdio for agent engines that
//! cannot natively emit the marker (e.g. Claude via MCP).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SILENT_EXIT_MARKER_KEY: &str = "__silent_exit__";
pub const SILENT_EXIT_TOOL_NAME: &str = "silent_exit";

/// Arguments the tool accepts: an optional human-readable reason.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SilentExitArgs {
    #[serde(default)]
    pub reason: Option<String>,
}

/// `(is_silent_exit, reason)`. Non-JSON or non-object tool results are
/// never an error — just `(false, "")`, matching the original's liberal
/// parsing.
pub fn detect(tool_result_text: &str) -> (bool, String) {
    match serde_json::from_str::<Value>(tool_result_text) {
        Ok(Value::Object(map)) => {
            let flagged = map.get(SILENT_EXIT_MARKER_KEY).and_then(Value::as_bool).unwrap_or(false);
            if flagged {
                let reason = map.get("reason").and_then(Value::as_str).unwrap_or_default().to_string();
                (true, reason)
            } else {
                (false, String::new())
            }
        }
        _ => (false, String::new()),
    }
}

/// Builds the marker payload the `silent_exit` tool itself returns.
pub fn build_marker(args: &SilentExitArgs) -> Value {
    serde_json::json!({
        SILENT_EXIT_MARKER_KEY: true,
        "reason": args.reason.clone().unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_flagged_marker_with_reason() {
        let text = serde_json::json!({ SILENT_EXIT_MARKER_KEY: true, "reason": "nothing to report" }).to_string();
        assert_eq!(detect(&text), (true, "nothing to report".to_string()));
    }

    #[test]
    fn non_json_text_is_never_silent_exit() {
        assert_eq!(detect("plain text result"), (false, String::new()));
    }

    #[test]
    fn json_array_is_never_silent_exit() {
        assert_eq!(detect("[1, 2, 3]"), (false, String::new()));
    }

    #[test]
    fn unflagged_object_is_not_silent_exit() {
        let text = serde_json::json!({ "result": "ok" }).to_string();
        assert_eq!(detect(&text), (false, String::new()));
    }

    #[test]
    fn build_marker_defaults_empty_reason() {
        let marker = build_marker(&SilentExitArgs::default());
        assert_eq!(marker["reason"], "");
        assert_eq!(marker[SILENT_EXIT_MARKER_KEY], true);
    }
}
