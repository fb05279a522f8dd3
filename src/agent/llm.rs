//! Streaming client for the model endpoint (Anthropic Messages API).

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::{Value, json};
use tokio_stream::StreamExt;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// One fully-streamed assistant turn.
#[derive(Debug, Default)]
pub struct StreamedMessage {
    pub text: String,
    pub tool_uses: Vec<ToolUse>,
    pub stop_reason: Option<String>,
}

pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send the conversation and stream the reply, invoking `on_text` for
    /// every text delta as it arrives.
    pub async fn stream_message(
        &self,
        system: &str,
        messages: &[Value],
        tools: &[ToolSpec],
        on_text: &mut dyn FnMut(&str),
    ) -> Result<StreamedMessage> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": system,
            "messages": messages,
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("model request failed")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_else(|_| "unknown error".into());
            bail!("model endpoint returned {status}: {text}");
        }

        let mut accumulator = Accumulator::default();
        let mut stream = response.bytes_stream();
        let mut buf = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("model stream failed")?;
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buf.find('\n') {
                let line: String = buf.drain(..=pos).collect();
                if let Some(delta) = accumulator.feed_line(line.trim_end())? {
                    on_text(&delta);
                }
            }
            if accumulator.done {
                break;
            }
        }

        Ok(accumulator.finish())
    }
}

// ==================== SSE accumulation ====================

enum Block {
    Text,
    ToolUse { id: String, name: String, json: String },
}

/// Folds the provider's SSE events into one `StreamedMessage`.
#[derive(Default)]
struct Accumulator {
    text: String,
    blocks: HashMap<u64, Block>,
    order: Vec<u64>,
    stop_reason: Option<String>,
    done: bool,
}

impl Accumulator {
    /// Feed one SSE line; returns a text delta when the line carried one.
    fn feed_line(&mut self, line: &str) -> Result<Option<String>> {
        let Some(data) = line.strip_prefix("data: ") else {
            return Ok(None); // "event:" lines, comments, blanks
        };
        let event: Value = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(_) => return Ok(None),
        };
        self.feed_event(&event)
    }

    fn feed_event(&mut self, event: &Value) -> Result<Option<String>> {
        match event["type"].as_str().unwrap_or_default() {
            "content_block_start" => {
                let index = event["index"].as_u64().unwrap_or(0);
                let block = &event["content_block"];
                let parsed = match block["type"].as_str() {
                    Some("tool_use") => Block::ToolUse {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        json: String::new(),
                    },
                    _ => Block::Text,
                };
                self.blocks.insert(index, parsed);
                self.order.push(index);
                Ok(None)
            }
            "content_block_delta" => {
                let index = event["index"].as_u64().unwrap_or(0);
                let delta = &event["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => {
                        let text = delta["text"].as_str().unwrap_or_default().to_string();
                        self.text.push_str(&text);
                        Ok(Some(text))
                    }
                    Some("input_json_delta") => {
                        if let Some(Block::ToolUse { json, .. }) = self.blocks.get_mut(&index) {
                            json.push_str(delta["partial_json"].as_str().unwrap_or_default());
                        }
                        Ok(None)
                    }
                    _ => Ok(None),
                }
            }
            "message_delta" => {
                if let Some(reason) = event["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(reason.to_string());
                }
                Ok(None)
            }
            "message_stop" => {
                self.done = true;
                Ok(None)
            }
            "error" => {
                bail!(
                    "model stream error: {}",
                    event["error"]["message"].as_str().unwrap_or("unknown")
                )
            }
            _ => Ok(None),
        }
    }

    fn finish(mut self) -> StreamedMessage {
        let mut tool_uses = Vec::new();
        for index in &self.order {
            if let Some(Block::ToolUse { id, name, json }) = self.blocks.remove(index) {
                let input = if json.is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&json).unwrap_or_else(|_| json!({}))
                };
                tool_uses.push(ToolUse { id, name, input });
            }
        }
        StreamedMessage { text: self.text, tool_uses, stop_reason: self.stop_reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_deltas_accumulate_and_emit() {
        let mut acc = Accumulator::default();
        acc.feed_line(r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"text"}}"#)
            .unwrap();
        let first = acc
            .feed_line(r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#)
            .unwrap();
        assert_eq!(first.as_deref(), Some("Hel"));
        acc.feed_line(r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"lo"}}"#)
            .unwrap();
        acc.feed_line(r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#)
            .unwrap();
        acc.feed_line(r#"data: {"type":"message_stop"}"#).unwrap();

        assert!(acc.done);
        let message = acc.finish();
        assert_eq!(message.text, "Hello");
        assert_eq!(message.stop_reason.as_deref(), Some("end_turn"));
        assert!(message.tool_uses.is_empty());
    }

    #[test]
    fn tool_use_blocks_assemble_from_partial_json() {
        let mut acc = Accumulator::default();
        acc.feed_line(r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"tu_1","name":"order_book"}}"#)
            .unwrap();
        acc.feed_line(r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"market\":"}}"#)
            .unwrap();
        acc.feed_line(r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"\"BTC\"}"}}"#)
            .unwrap();
        acc.feed_line(r#"data: {"type":"message_delta","delta":{"stop_reason":"tool_use"}}"#)
            .unwrap();

        let message = acc.finish();
        assert_eq!(message.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(message.tool_uses.len(), 1);
        assert_eq!(message.tool_uses[0].name, "order_book");
        assert_eq!(message.tool_uses[0].input["market"], "BTC");
    }

    #[test]
    fn non_data_lines_and_junk_are_ignored() {
        let mut acc = Accumulator::default();
        assert!(acc.feed_line("event: content_block_delta").unwrap().is_none());
        assert!(acc.feed_line("").unwrap().is_none());
        assert!(acc.feed_line("data: not-json").unwrap().is_none());
    }

    #[test]
    fn provider_errors_surface() {
        let mut acc = Accumulator::default();
        let result = acc
            .feed_line(r#"data: {"type":"error","error":{"message":"overloaded"}}"#);
        assert!(result.is_err());
    }
}
