//! LLM tool-execution loop.
//!
//! Streams model output, dispatches tool calls against the trading core,
//! feeds results back, and repeats until the model produces a terminal
//! text response or the round cap trips.

pub mod events;
pub mod llm;
pub mod tools;

use anyhow::Result;
use serde_json::{Value, json};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_stream::Stream;
use tracing::debug;

pub use events::AgentEvent;
pub use llm::{LlmClient, StreamedMessage, ToolSpec};
pub use tools::ToolContext;

/// Hard bound on tool rounds per user turn.
pub const MAX_ROUNDS: usize = 10;

const SYSTEM_PROMPT: &str = "\
You are PerplBot, a trading assistant for a perpetual-futures exchange. \
You answer questions about the user's account, positions, markets, funding, \
fees and liquidation risk, and you can place, close and cancel orders.

Rules:
- For any WRITE tool (open_position, close_position, cancel_order) you MUST \
have an explicit confirmation from the user in this conversation for the \
specific action. If you do not have one, describe the trade (use \
dry_run_trade) and ask for confirmation instead of calling the tool.
- Liquidation questions go to the liquidation_analysis tool; do not estimate \
liquidation prices yourself.
- Strategy questions (grid, market making) go to simulate_strategy.
- Quote prices and sizes in display units and say which market you mean.
- Be concise. If a tool returns an error, tell the user what failed.";

pub struct AgentLoop {
    llm: LlmClient,
    ctx: ToolContext,
    system_prompt: String,
}

impl AgentLoop {
    pub fn new(llm: LlmClient, ctx: ToolContext) -> Self {
        Self { llm, ctx, system_prompt: SYSTEM_PROMPT.to_string() }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Run the loop over `messages` (Messages-API shaped history ending in
    /// a user turn), emitting events until a terminal response. Returns
    /// the extended history so the caller can persist it.
    pub async fn run(
        &self,
        mut messages: Vec<Value>,
        events: &UnboundedSender<AgentEvent>,
    ) -> Result<Vec<Value>> {
        let catalogue = tools::catalogue();

        for round in 0..MAX_ROUNDS {
            debug!(round, "agent round");
            let mut on_text = |delta: &str| {
                let _ = events.send(AgentEvent::Text { delta: delta.to_string() });
            };
            let reply = match self
                .llm
                .stream_message(&self.system_prompt, &messages, &catalogue, &mut on_text)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    let _ = events.send(AgentEvent::Error { message: e.to_string() });
                    let _ = events.send(AgentEvent::Done);
                    return Err(e);
                }
            };

            if reply.stop_reason.as_deref() != Some("tool_use") {
                let _ = events.send(AgentEvent::AssistantMessage { text: reply.text.clone() });
                let _ = events.send(AgentEvent::Done);
                messages.push(json!({ "role": "assistant", "content": reply.text }));
                return Ok(messages);
            }

            // Running text history: later rounds see what happened.
            let mut running_text = reply.text.clone();
            let mut assistant_content = Vec::new();
            if !reply.text.is_empty() {
                assistant_content.push(json!({ "type": "text", "text": reply.text }));
            }
            let mut tool_results = Vec::new();

            for tool_use in &reply.tool_uses {
                assistant_content.push(json!({
                    "type": "tool_use",
                    "id": tool_use.id,
                    "name": tool_use.name,
                    "input": tool_use.input,
                }));
                let _ = events.send(AgentEvent::ToolCall {
                    name: tool_use.name.clone(),
                    input: tool_use.input.clone(),
                });

                match tools::execute(&self.ctx, &tool_use.name, &tool_use.input).await {
                    Ok(mut output) => {
                        let report = take_report(&mut output);
                        let _ = events.send(AgentEvent::ToolResult {
                            name: tool_use.name.clone(),
                            output: output.clone(),
                            report,
                        });
                        running_text.push_str(&format!("\n[Called {}: {}]", tool_use.name, output));
                        tool_results.push(json!({
                            "type": "tool_result",
                            "tool_use_id": tool_use.id,
                            "content": output.to_string(),
                        }));
                    }
                    Err(e) => {
                        // The model sees the failure as tool output and the
                        // loop continues for this round only.
                        let _ = events.send(AgentEvent::Error {
                            message: format!("{}: {e}", tool_use.name),
                        });
                        running_text
                            .push_str(&format!("\n[Called {}: error: {e}]", tool_use.name));
                        tool_results.push(json!({
                            "type": "tool_result",
                            "tool_use_id": tool_use.id,
                            "content": format!("error: {e}"),
                            "is_error": true,
                        }));
                    }
                }
            }

            let _ = events.send(AgentEvent::AssistantMessage { text: running_text });
            messages.push(json!({ "role": "assistant", "content": assistant_content }));
            messages.push(json!({ "role": "user", "content": tool_results }));
        }

        let _ = events.send(AgentEvent::Error {
            message: format!("tool loop exceeded {MAX_ROUNDS} rounds; stopping"),
        });
        let _ = events.send(AgentEvent::Done);
        Ok(messages)
    }
}

/// Pull the `_report` field out of a tool result for separate rendering.
fn take_report(output: &mut Value) -> Option<String> {
    output
        .as_object_mut()?
        .remove("_report")
        .and_then(|value| value.as_str().map(String::from))
}

/// Adapt an event receiver into an SSE body stream.
pub fn sse_stream(mut rx: UnboundedReceiver<AgentEvent>) -> impl Stream<Item = String> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = matches!(event, AgentEvent::Done);
            yield event.sse();
            if terminal {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_extraction_removes_the_field() {
        let mut output = json!({ "math_price": 94736.84, "_report": "BTC: ..." });
        let report = take_report(&mut output);
        assert_eq!(report.as_deref(), Some("BTC: ..."));
        assert!(output.get("_report").is_none());
        assert!(output.get("math_price").is_some());

        let mut plain = json!({ "a": 1 });
        assert!(take_report(&mut plain).is_none());
    }

    #[tokio::test]
    async fn sse_stream_terminates_on_done() {
        use tokio_stream::StreamExt;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(AgentEvent::Text { delta: "hi".into() }).unwrap();
        tx.send(AgentEvent::Done).unwrap();
        tx.send(AgentEvent::Text { delta: "never".into() }).unwrap();

        let frames: Vec<String> = sse_stream(rx).collect().await;
        assert_eq!(frames.len(), 2);
        assert!(frames[0].starts_with("event: text\n"));
        assert!(frames[1].starts_with("event: done\n"));
    }
}
