use std::collections::BTreeMap;

use agw_protocol::anthropic::stream::{ContentBlockDelta, StreamEvent};
use agw_protocol::anthropic::types::{ContentBlock, StopReason};
use agw_protocol::gemini::response::{Candidate, GenerateContentResponse};
use agw_protocol::gemini::types::{
    Content, ContentRole, FinishReason, FunctionCall, Part, UsageMetadata,
};

use crate::content::parse_tool_arguments;

/// Rewrites Anthropic message events into Gemini stream chunks. The Gemini
/// wire carries complete `functionCall` parts only, so tool-argument deltas
/// are buffered per block and flushed when the block closes.
#[derive(Debug)]
pub struct AnthropicToGeminiStream {
    tool_buffers: BTreeMap<u32, (String, String)>,
    finish_reason: Option<FinishReason>,
    usage: UsageMetadata,
    saw_tool_use: bool,
    finished: bool,
}

impl AnthropicToGeminiStream {
    pub fn new(_model: &str) -> Self {
        Self {
            tool_buffers: BTreeMap::new(),
            finish_reason: None,
            usage: UsageMetadata::default(),
            saw_tool_use: false,
            finished: false,
        }
    }

    pub fn push(&mut self, event: StreamEvent) -> Vec<GenerateContentResponse> {
        if self.finished {
            return Vec::new();
        }

        match event {
            StreamEvent::MessageStart { message } => {
                if let Some(input) = message.usage.input_tokens {
                    self.usage.prompt_token_count = Some(input);
                }
                Vec::new()
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse { name, .. },
            } => {
                self.saw_tool_use = true;
                self.tool_buffers.insert(index, (name, String::new()));
                Vec::new()
            }
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentBlockDelta::TextDelta { text } => {
                    if text.is_empty() {
                        return Vec::new();
                    }
                    vec![text_chunk(text)]
                }
                ContentBlockDelta::InputJsonDelta { partial_json } => {
                    if let Some((_, buffer)) = self.tool_buffers.get_mut(&index) {
                        buffer.push_str(&partial_json);
                    } else {
                        // Arguments without an opener: buffer under a
                        // synthesized nameless entry.
                        self.saw_tool_use = true;
                        self.tool_buffers
                            .insert(index, (String::new(), partial_json));
                    }
                    Vec::new()
                }
            },
            StreamEvent::ContentBlockStop { index } => match self.tool_buffers.remove(&index) {
                Some((name, buffer)) => vec![function_call_chunk(name, &buffer)],
                None => Vec::new(),
            },
            StreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = usage {
                    if let Some(input) = usage.input_tokens {
                        self.usage.prompt_token_count = Some(input);
                    }
                    if let Some(output) = usage.output_tokens {
                        self.usage.candidates_token_count = Some(output);
                    }
                }
                if let Some(reason) = delta.stop_reason {
                    if self.finish_reason.is_none() {
                        self.finish_reason = Some(map_stop_reason(reason));
                    }
                }
                Vec::new()
            }
            StreamEvent::MessageStop => self.finish(),
            StreamEvent::ContentBlockStart { .. }
            | StreamEvent::Ping
            | StreamEvent::Error { .. } => Vec::new(),
        }
    }

    pub fn finish(&mut self) -> Vec<GenerateContentResponse> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut chunks = Vec::new();
        let buffers = std::mem::take(&mut self.tool_buffers);
        for (_, (name, buffer)) in buffers {
            chunks.push(function_call_chunk(name, &buffer));
        }

        let finish_reason = if self.saw_tool_use {
            FinishReason::Stop
        } else {
            self.finish_reason.unwrap_or(FinishReason::Stop)
        };
        let total = self.usage.prompt_token_count.unwrap_or(0)
            + self.usage.candidates_token_count.unwrap_or(0);
        chunks.push(GenerateContentResponse {
            candidates: vec![Candidate {
                content: Content {
                    role: Some(ContentRole::Model),
                    parts: Vec::new(),
                },
                finish_reason: Some(finish_reason),
                index: Some(0),
            }],
            usage_metadata: Some(UsageMetadata {
                prompt_token_count: self.usage.prompt_token_count,
                candidates_token_count: self.usage.candidates_token_count,
                total_token_count: Some(total),
            }),
            model_version: None,
        });
        chunks
    }

    pub fn finished(&self) -> bool {
        self.finished
    }
}

fn text_chunk(text: String) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Content {
                role: Some(ContentRole::Model),
                parts: vec![Part::text(text)],
            },
            finish_reason: None,
            index: Some(0),
        }],
        usage_metadata: None,
        model_version: None,
    }
}

fn function_call_chunk(name: String, arguments: &str) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Content {
                role: Some(ContentRole::Model),
                parts: vec![Part {
                    function_call: Some(FunctionCall {
                        name,
                        args: Some(parse_tool_arguments(arguments)),
                    }),
                    ..Part::default()
                }],
            },
            finish_reason: None,
            index: Some(0),
        }],
        usage_metadata: None,
        model_version: None,
    }
}

fn map_stop_reason(reason: StopReason) -> FinishReason {
    match reason {
        StopReason::EndTurn | StopReason::StopSequence | StopReason::ToolUse => FinishReason::Stop,
        StopReason::MaxTokens => FinishReason::MaxTokens,
        StopReason::Refusal => FinishReason::Safety,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> StreamEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn buffered_tool_arguments_flush_as_one_function_call() {
        let mut machine = AnthropicToGeminiStream::new("gemini-proxy");
        machine.push(event(json!({
            "type": "content_block_start", "index": 0,
            "content_block": {"type": "tool_use", "id": "t1", "name": "sum", "input": {}},
        })));
        machine.push(event(json!({
            "type": "content_block_delta", "index": 0,
            "delta": {"type": "input_json_delta", "partial_json": "{\"a\":"},
        })));
        machine.push(event(json!({
            "type": "content_block_delta", "index": 0,
            "delta": {"type": "input_json_delta", "partial_json": "1}"},
        })));
        let chunks = machine.push(event(json!({"type": "content_block_stop", "index": 0})));

        let call = chunks[0].candidates[0].content.parts[0]
            .function_call
            .as_ref()
            .unwrap();
        assert_eq!(call.name, "sum");
        assert_eq!(call.args, Some(json!({"a": 1})));
    }
}
