use agw_protocol::anthropic::response::MessageType;
use agw_protocol::anthropic::stream::{
    ContentBlockDelta, MessageDelta, StreamEvent, StreamMessage, StreamUsage,
};
use agw_protocol::anthropic::types::{ContentBlock, MessageRole, StopReason};
use agw_protocol::gemini::response::GenerateContentResponse;
use agw_protocol::gemini::types::{FinishReason, FunctionCall};

use crate::content::stringify_tool_arguments;

use super::synth_id;

/// Rewrites Gemini stream chunks into Anthropic message events. Gemini sends
/// complete `functionCall` parts, so each becomes a fully-delimited tool-use
/// block; `finishReason` is the terminal signal.
#[derive(Debug)]
pub struct GeminiToAnthropicStream {
    model: String,
    opening_emitted: bool,
    next_block_index: u32,
    text_block: Option<u32>,
    call_counter: usize,
    stop_reason: Option<StopReason>,
    usage: StreamUsage,
    saw_tool_use: bool,
    finished: bool,
}

impl GeminiToAnthropicStream {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            opening_emitted: false,
            next_block_index: 0,
            text_block: None,
            call_counter: 0,
            stop_reason: None,
            usage: StreamUsage::default(),
            saw_tool_use: false,
            finished: false,
        }
    }

    pub fn push(&mut self, chunk: GenerateContentResponse) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();
        if !self.opening_emitted {
            events.extend(self.open_message());
        }

        if let Some(usage) = &chunk.usage_metadata {
            if let Some(input) = usage.prompt_token_count {
                self.usage.input_tokens = Some(input);
            }
            if let Some(output) = usage.candidates_token_count {
                self.usage.output_tokens = Some(output);
            }
        }

        let mut finish_reason = None;
        if let Some(candidate) = chunk.candidates.into_iter().next() {
            for part in candidate.content.parts {
                if let Some(text) = part.text {
                    events.extend(self.emit_text(&text));
                } else if let Some(call) = part.function_call {
                    events.extend(self.emit_tool_call(call));
                }
            }
            finish_reason = candidate.finish_reason;
        }

        if let Some(reason) = finish_reason {
            if self.stop_reason.is_none() {
                self.stop_reason = Some(map_finish_reason(reason));
            }
            events.extend(self.emit_terminal());
        }

        events
    }

    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished || !self.opening_emitted {
            self.finished = true;
            return Vec::new();
        }
        self.emit_terminal()
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    fn open_message(&mut self) -> Vec<StreamEvent> {
        self.opening_emitted = true;
        let index = self.next_block_index;
        self.next_block_index += 1;
        self.text_block = Some(index);
        vec![
            StreamEvent::MessageStart {
                message: StreamMessage {
                    id: synth_id("msg_"),
                    r#type: MessageType::Message,
                    role: MessageRole::Assistant,
                    content: Vec::new(),
                    model: self.model.clone(),
                    stop_reason: None,
                    stop_sequence: None,
                    usage: StreamUsage::default(),
                },
            },
            StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::Text {
                    text: String::new(),
                },
            },
        ]
    }

    fn emit_text(&mut self, text: &str) -> Vec<StreamEvent> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut events = Vec::new();
        let index = match self.text_block {
            Some(index) => index,
            None => {
                let index = self.next_block_index;
                self.next_block_index += 1;
                self.text_block = Some(index);
                events.push(StreamEvent::ContentBlockStart {
                    index,
                    content_block: ContentBlock::Text {
                        text: String::new(),
                    },
                });
                index
            }
        };
        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: ContentBlockDelta::TextDelta {
                text: text.to_string(),
            },
        });
        events
    }

    fn emit_tool_call(&mut self, call: FunctionCall) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if let Some(index) = self.text_block.take() {
            events.push(StreamEvent::ContentBlockStop { index });
        }

        let index = self.next_block_index;
        self.next_block_index += 1;
        self.saw_tool_use = true;
        let id = format!("call_{}", self.call_counter);
        self.call_counter += 1;
        let args = call.args.unwrap_or_else(|| serde_json::json!({}));

        events.push(StreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlock::ToolUse {
                id,
                name: call.name,
                input: serde_json::Map::new(),
            },
        });
        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: ContentBlockDelta::InputJsonDelta {
                partial_json: stringify_tool_arguments(&args),
            },
        });
        events.push(StreamEvent::ContentBlockStop { index });
        events
    }

    fn emit_terminal(&mut self) -> Vec<StreamEvent> {
        self.finished = true;
        let mut events = Vec::new();
        if let Some(index) = self.text_block.take() {
            events.push(StreamEvent::ContentBlockStop { index });
        }
        let stop_reason = if self.saw_tool_use {
            StopReason::ToolUse
        } else {
            self.stop_reason.unwrap_or(StopReason::EndTurn)
        };
        events.push(StreamEvent::MessageDelta {
            delta: MessageDelta {
                stop_reason: Some(stop_reason),
                stop_sequence: None,
            },
            usage: Some(StreamUsage {
                input_tokens: self.usage.input_tokens,
                output_tokens: self.usage.output_tokens.or(Some(0)),
            }),
        });
        events.push(StreamEvent::MessageStop);
        events
    }
}

fn map_finish_reason(reason: FinishReason) -> StopReason {
    match reason {
        FinishReason::Stop | FinishReason::Recitation | FinishReason::Other => StopReason::EndTurn,
        FinishReason::MaxTokens => StopReason::MaxTokens,
        FinishReason::Safety => StopReason::Refusal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(value: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn max_tokens_finish_closes_the_text_block() {
        let mut machine = GeminiToAnthropicStream::new("claude-x");
        machine.push(chunk(json!({
            "candidates": [{"content": {"parts": [{"text": "partial"}], "role": "model"}}],
        })));
        let events = machine.push(chunk(json!({
            "candidates": [{"content": {"parts": []}, "finishReason": "MAX_TOKENS"}],
        })));

        let names: Vec<&str> = events.iter().map(|event| event.event_name()).collect();
        assert_eq!(names, vec!["content_block_stop", "message_delta", "message_stop"]);
        match &events[1] {
            StreamEvent::MessageDelta { delta, .. } => {
                assert_eq!(delta.stop_reason, Some(StopReason::MaxTokens));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(machine.finished());
    }

    #[test]
    fn function_calls_become_delimited_tool_blocks() {
        let mut machine = GeminiToAnthropicStream::new("claude-x");
        let events = machine.push(chunk(json!({
            "candidates": [{
                "content": {"parts": [
                    {"functionCall": {"name": "sum", "args": {"a": 1}}},
                ], "role": "model"},
                "finishReason": "STOP",
            }],
        })));

        let names: Vec<&str> = events.iter().map(|event| event.event_name()).collect();
        assert_eq!(
            names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        match &events[6] {
            StreamEvent::MessageDelta { delta, .. } => {
                assert_eq!(delta.stop_reason, Some(StopReason::ToolUse));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
