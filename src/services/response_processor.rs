//! In-executor streaming-event loop (§4.7) — the hardest in-container
//! component. Consumes a restartable stream of typed agent-SDK events and
//! turns them into throttled progress callbacks plus one terminal outcome.
//!
//! The SDK wrapper itself (Claude/Gemini/OpenAI/Agno/Dify client) is out of
//! scope (§1); this module owns only the event classification, throttling,
//! API-error retry, cancellation-checkpoint, and silent-exit logic that
//! behaves identically regardless of which SDK produced the events.

use std::time::{Duration, Instant};

use serde_json::Value;

pub const MAX_API_ERROR_RETRIES: u32 = 3;
const CONTENT_THROTTLE: Duration = Duration::from_millis(500);
const THINKING_THROTTLE: Duration = Duration::from_millis(300);

/// A typed event as produced by the (out-of-scope) agent SDK stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    System { subtype: String },
    User { content: Vec<ContentBlock> },
    Assistant { content: Vec<ContentBlock> },
    Result { subtype: String, is_error: bool, body: Value },
}

#[derive(Debug, Clone)]
pub enum ContentBlock {
    Text(String),
    ToolUse { name: String },
    ToolResult { text: String },
}

/// Outer outcome of one `drive` pass over the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    /// The loop detected a retryable API error at the `Result` boundary and
    /// wants the caller to restart the stream from a fresh query on the
    /// same session_id.
    RetryRequested,
}

/// A single progress callback the caller should send (throttled or
/// immediate per the rules in §4.7).
#[derive(Debug, Clone)]
pub struct ProgressReport {
    pub progress: u8,
    pub status: Option<&'static str>,
    pub message: Option<String>,
    pub result: Option<Value>,
}

/// Current cancellation state as observed from the in-process
/// TaskStateManager (§5 Cancellation layer 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationState {
    Running,
    Cancelling,
    Cancelled,
}

impl CancellationState {
    pub const fn is_cancelling_or_cancelled(self) -> bool {
        matches!(self, Self::Cancelling | Self::Cancelled)
    }
}

/// Two independent token-bucket-style throttle gates, one for content
/// reports and one for thinking/reasoning reports. The *last* event before
/// a terminal status always bypasses throttling (§4.7).
pub struct ThrottleGate {
    last_content: Option<Instant>,
    last_thinking: Option<Instant>,
}

impl Default for ThrottleGate {
    fn default() -> Self {
        Self { last_content: None, last_thinking: None }
    }
}

impl ThrottleGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_content(&mut self, now: Instant) -> bool {
        Self::allow(&mut self.last_content, now, CONTENT_THROTTLE)
    }

    pub fn allow_thinking(&mut self, now: Instant) -> bool {
        Self::allow(&mut self.last_thinking, now, THINKING_THROTTLE)
    }

    fn allow(last: &mut Option<Instant>, now: Instant, window: Duration) -> bool {
        match *last {
            Some(prev) if now.duration_since(prev) < window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// The exact API-error substrings that mark a retryable SDK failure. These
/// are literal, case-sensitive matches, not a broader "sounds like an
/// outage" heuristic.
fn is_retryable_api_error(text: &str) -> bool {
    const PATTERNS: &[&str] = &[
        "API Error: Cannot read properties of undefined",
        "API Error: undefined is not an object",
    ];
    PATTERNS.iter().any(|p| text.contains(p))
}

const SILENT_EXIT_TOOL_NAME: &str = "silent_exit";
const SILENT_EXIT_MARKER_KEY: &str = "__silent_exit__";

/// Detect the silent-exit JSON marker in a `ToolResult`'s text payload.
/// Returns the `reason` field if present.
fn detect_silent_exit(text: &str) -> Option<Option<String>> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get(SILENT_EXIT_MARKER_KEY).and_then(Value::as_bool) == Some(true) {
        Some(value.get("reason").and_then(Value::as_str).map(str::to_string))
    } else {
        None
    }
}

/// Drives one pass over an already-collected slice of events (the real
/// stream is async and lazy; callers feed events as they arrive and call
/// `step` per event — this function models a full pass for testing and
/// for callers that buffer a turn before processing).
pub struct ResponseProcessor {
    throttle: ThrottleGate,
    api_error_retries: u32,
    silent_exit: bool,
    silent_exit_reason: Option<String>,
}

impl Default for ResponseProcessor {
    fn default() -> Self {
        Self {
            throttle: ThrottleGate::new(),
            api_error_retries: 0,
            silent_exit: false,
            silent_exit_reason: None,
        }
    }
}

impl ResponseProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one event, returning zero or more progress reports to send
    /// and `Some(outcome)` if this event was terminal (or a cancellation
    /// checkpoint fired). `cancellation` is sampled before the event is
    /// consumed, matching the "checkpoint before each event" rule.
    pub fn step(
        &mut self,
        event: &StreamEvent,
        cancellation: CancellationState,
        now: Instant,
    ) -> (Vec<ProgressReport>, Option<Outcome>) {
        if cancellation.is_cancelling_or_cancelled() {
            return (
                vec![ProgressReport { progress: 100, status: Some("COMPLETED"), message: None, result: None }],
                Some(Outcome::Completed),
            );
        }

        match event {
            StreamEvent::System { subtype } => (
                vec![ProgressReport {
                    progress: 0,
                    status: None,
                    message: Some(format!("system:{subtype}")),
                    result: None,
                }],
                None,
            ),

            StreamEvent::User { content } => {
                for block in content {
                    if let ContentBlock::ToolResult { text } = block {
                        if let Some(reason) = detect_silent_exit(text) {
                            self.silent_exit = true;
                            self.silent_exit_reason = reason;
                        }
                    }
                }
                (Vec::new(), None)
            }

            StreamEvent::Assistant { content } => {
                let mut reports = Vec::new();
                let mut saw_retryable_error = false;
                for block in content {
                    match block {
                        ContentBlock::Text(text) if is_retryable_api_error(text) => {
                            saw_retryable_error = true;
                        }
                        ContentBlock::ToolUse { name } if name == SILENT_EXIT_TOOL_NAME => {}
                        _ => {}
                    }
                }
                let _ = saw_retryable_error; // actual retry decision happens at the Result boundary
                if self.throttle.allow_thinking(now) {
                    reports.push(ProgressReport {
                        progress: 0,
                        status: None,
                        message: Some("assistant_message_received".to_string()),
                        result: None,
                    });
                }
                (reports, None)
            }

            StreamEvent::Result { subtype, is_error, body } => {
                if !self.silent_exit {
                    if let Some(result_str) = body.get("result").and_then(Value::as_str) {
                        if let Some(reason) = detect_silent_exit(result_str) {
                            self.silent_exit = true;
                            self.silent_exit_reason = reason;
                        }
                    }
                }

                if subtype == "success" && !is_error {
                    let mut result = body.clone();
                    if self.silent_exit {
                        if let Value::Object(ref mut map) = result {
                            map.insert("silent_exit".to_string(), Value::Bool(true));
                            map.insert(
                                "silent_exit_reason".to_string(),
                                Value::String(self.silent_exit_reason.clone().unwrap_or_default()),
                            );
                        }
                    }
                    return (
                        vec![ProgressReport { progress: 100, status: Some("COMPLETED"), message: None, result: Some(result) }],
                        Some(Outcome::Completed),
                    );
                }

                let text = body.get("error").and_then(Value::as_str).unwrap_or_default();
                if is_retryable_api_error(text) && self.api_error_retries < MAX_API_ERROR_RETRIES {
                    self.api_error_retries += 1;
                    return (
                        vec![ProgressReport {
                            progress: 0,
                            status: None,
                            message: Some(format!("retrying after API error (attempt {})", self.api_error_retries)),
                            result: None,
                        }],
                        Some(Outcome::RetryRequested),
                    );
                }

                (
                    vec![ProgressReport {
                        progress: 100,
                        status: Some("FAILED"),
                        message: Some(text.to_string()),
                        result: None,
                    }],
                    Some(Outcome::Failed),
                )
            }
        }
    }

    pub const fn silent_exit(&self) -> bool {
        self.silent_exit
    }

    pub fn silent_exit_reason(&self) -> Option<&str> {
        self.silent_exit_reason.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_exit_marker(reason: &str) -> String {
        serde_json::json!({ "__silent_exit__": true, "reason": reason }).to_string()
    }

    #[test]
    fn throttle_gate_suppresses_rapid_repeats() {
        let mut gate = ThrottleGate::new();
        let t0 = Instant::now();
        assert!(gate.allow_content(t0));
        assert!(!gate.allow_content(t0 + Duration::from_millis(100)));
        assert!(gate.allow_content(t0 + Duration::from_millis(600)));
    }

    #[test]
    fn thinking_gate_has_a_shorter_window_than_content() {
        let mut gate = ThrottleGate::new();
        let t0 = Instant::now();
        assert!(gate.allow_thinking(t0));
        assert!(!gate.allow_thinking(t0 + Duration::from_millis(200)));
        assert!(gate.allow_thinking(t0 + Duration::from_millis(350)));
    }

    #[test]
    fn detects_silent_exit_marker_in_tool_result() {
        let mut processor = ResponseProcessor::new();
        let event = StreamEvent::User {
            content: vec![ContentBlock::ToolResult { text: silent_exit_marker("nothing to do") }],
        };
        let (_, outcome) = processor.step(&event, CancellationState::Running, Instant::now());
        assert!(outcome.is_none());
        assert!(processor.silent_exit());
        assert_eq!(processor.silent_exit_reason(), Some("nothing to do"));
    }

    #[test]
    fn silent_exit_flag_propagates_into_terminal_result() {
        let mut processor = ResponseProcessor::new();
        let tool_result = StreamEvent::User {
            content: vec![ContentBlock::ToolResult { text: silent_exit_marker("done quietly") }],
        };
        processor.step(&tool_result, CancellationState::Running, Instant::now());

        let result_event = StreamEvent::Result {
            subtype: "success".to_string(),
            is_error: false,
            body: serde_json::json!({}),
        };
        let (reports, outcome) = processor.step(&result_event, CancellationState::Running, Instant::now());
        assert_eq!(outcome, Some(Outcome::Completed));
        let report = &reports[0];
        assert_eq!(report.result.as_ref().unwrap()["silent_exit"], true);
        assert_eq!(report.result.as_ref().unwrap()["silent_exit_reason"], "done quietly");
    }

    #[test]
    fn silent_exit_marker_in_result_body_is_detected_as_a_fallback() {
        // No ToolResult ever carried the marker; it only shows up inside
        // the terminal Result's own `result` string.
        let mut processor = ResponseProcessor::new();
        let result_event = StreamEvent::Result {
            subtype: "success".to_string(),
            is_error: false,
            body: serde_json::json!({ "result": silent_exit_marker("quiet from the result body") }),
        };
        let (reports, outcome) = processor.step(&result_event, CancellationState::Running, Instant::now());
        assert_eq!(outcome, Some(Outcome::Completed));
        assert!(processor.silent_exit());
        assert_eq!(processor.silent_exit_reason(), Some("quiet from the result body"));
        let report = &reports[0];
        assert_eq!(report.result.as_ref().unwrap()["silent_exit"], true);
    }

    #[test]
    fn cancellation_checkpoint_short_circuits_to_completed() {
        let mut processor = ResponseProcessor::new();
        let event = StreamEvent::System { subtype: "init".to_string() };
        let (_, outcome) = processor.step(&event, CancellationState::Cancelling, Instant::now());
        assert_eq!(outcome, Some(Outcome::Completed));
    }

    #[test]
    fn retryable_api_error_requests_retry_until_cap() {
        let mut processor = ResponseProcessor::new();
        let error_event = StreamEvent::Result {
            subtype: "error".to_string(),
            is_error: true,
            body: serde_json::json!({ "error": "API Error: Cannot read properties of undefined (reading 'foo')" }),
        };
        for expected_attempt in 1..=MAX_API_ERROR_RETRIES {
            let (_, outcome) = processor.step(&error_event, CancellationState::Running, Instant::now());
            assert_eq!(outcome, Some(Outcome::RetryRequested));
            assert_eq!(processor.api_error_retries, expected_attempt);
        }
        let (_, outcome) = processor.step(&error_event, CancellationState::Running, Instant::now());
        assert_eq!(outcome, Some(Outcome::Failed));
    }

    #[test]
    fn non_retryable_error_fails_immediately() {
        let mut processor = ResponseProcessor::new();
        let error_event = StreamEvent::Result {
            subtype: "error".to_string(),
            is_error: true,
            body: serde_json::json!({ "error": "invalid prompt" }),
        };
        let (reports, outcome) = processor.step(&error_event, CancellationState::Running, Instant::now());
        assert_eq!(outcome, Some(Outcome::Failed));
        assert_eq!(reports[0].progress, 100);
    }
}
