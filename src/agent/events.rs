use serde::Serialize;
use serde_json::Value;

/// Events streamed to the transport while the agent loop runs. Serialized
/// with a `type` tag; `sse()` renders the named-event wire form.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Incremental model tokens.
    Text { delta: String },
    /// The model invoked a tool.
    ToolCall { name: String, input: Value },
    /// Parsed tool output, with any `_report` field split out for
    /// separate rendering.
    ToolResult {
        name: String,
        output: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        report: Option<String>,
    },
    /// Accumulated assistant text for history.
    AssistantMessage { text: String },
    Error { message: String },
    Done,
}

impl AgentEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            AgentEvent::Text { .. } => "text",
            AgentEvent::ToolCall { .. } => "tool_call",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::AssistantMessage { .. } => "assistant_message",
            AgentEvent::Error { .. } => "error",
            AgentEvent::Done => "done",
        }
    }

    /// Render as one server-sent event.
    pub fn sse(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("event: {}\ndata: {}\n\n", self.event_name(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_frames_carry_the_event_name_and_tagged_json() {
        let event = AgentEvent::Text { delta: "hello".into() };
        let sse = event.sse();
        assert!(sse.starts_with("event: text\n"));
        assert!(sse.contains(r#""type":"text""#));
        assert!(sse.ends_with("\n\n"));

        let done = AgentEvent::Done.sse();
        assert!(done.starts_with("event: done\n"));
    }

    #[test]
    fn tool_result_report_is_optional_on_the_wire() {
        let without = AgentEvent::ToolResult {
            name: "markets".into(),
            output: serde_json::json!({}),
            report: None,
        };
        assert!(!serde_json::to_string(&without).unwrap().contains("report"));
    }
}
