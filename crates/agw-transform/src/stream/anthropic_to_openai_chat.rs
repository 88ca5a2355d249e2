use std::collections::BTreeMap;

use agw_protocol::anthropic::stream::{
    ContentBlockDelta, StreamEvent, StreamUsage as AnthropicStreamUsage,
};
use agw_protocol::anthropic::types::{ContentBlock, StopReason};
use agw_protocol::openai_chat::stream::{
    ChatCompletionChunk, ChunkChoice, ChunkDelta, ChunkObjectType, FunctionCallChunk,
    ToolCallChunk,
};
use agw_protocol::openai_chat::types::{FinishReason, ToolCallType, Usage};

use super::{epoch_seconds, synth_id};

/// Rewrites Anthropic message events into chat-completions chunks. The HTTP
/// layer appends `data: [DONE]` once the machine reports finished.
#[derive(Debug)]
pub struct AnthropicToOpenAIChatStream {
    id: String,
    model: String,
    created: i64,
    opening_emitted: bool,
    // Anthropic block index → outbound tool_calls index.
    tool_blocks: BTreeMap<u32, i64>,
    next_tool_index: i64,
    finish_reason: Option<FinishReason>,
    input_tokens: Option<i32>,
    output_tokens: Option<i32>,
    saw_tool_use: bool,
    finished: bool,
}

impl AnthropicToOpenAIChatStream {
    pub fn new(model: &str) -> Self {
        Self {
            id: synth_id("chatcmpl-"),
            model: model.to_string(),
            created: epoch_seconds(),
            opening_emitted: false,
            tool_blocks: BTreeMap::new(),
            next_tool_index: 0,
            finish_reason: None,
            input_tokens: None,
            output_tokens: None,
            saw_tool_use: false,
            finished: false,
        }
    }

    pub fn push(&mut self, event: StreamEvent) -> Vec<ChatCompletionChunk> {
        if self.finished {
            return Vec::new();
        }

        match event {
            StreamEvent::MessageStart { message } => {
                self.id = message.id;
                self.latch_usage(&message.usage);
                self.opening_emitted = true;
                vec![self.chunk(
                    ChunkDelta {
                        role: Some("assistant".to_string()),
                        ..ChunkDelta::default()
                    },
                    None,
                    None,
                )]
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ContentBlock::ToolUse { id, name, .. } => {
                    vec![self.open_tool(index, Some(id), name)]
                }
                _ => Vec::new(),
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentBlockDelta::TextDelta { text } => {
                    if text.is_empty() {
                        return Vec::new();
                    }
                    vec![self.chunk(
                        ChunkDelta {
                            content: Some(text),
                            ..ChunkDelta::default()
                        },
                        None,
                        None,
                    )]
                }
                ContentBlockDelta::InputJsonDelta { partial_json } => {
                    let mut events = Vec::new();
                    if !self.tool_blocks.contains_key(&index) {
                        events.push(self.open_tool(index, None, String::new()));
                    }
                    let tool_index = self.tool_blocks[&index];
                    events.push(self.chunk(
                        ChunkDelta {
                            tool_calls: Some(vec![ToolCallChunk {
                                index: tool_index,
                                id: None,
                                r#type: None,
                                function: Some(FunctionCallChunk {
                                    name: None,
                                    arguments: Some(partial_json),
                                }),
                            }]),
                            ..ChunkDelta::default()
                        },
                        None,
                        None,
                    ));
                    events
                }
            },
            StreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = usage {
                    self.latch_usage(&usage);
                }
                if let Some(reason) = delta.stop_reason {
                    if self.finish_reason.is_none() {
                        self.finish_reason = Some(map_stop_reason(reason));
                    }
                }
                Vec::new()
            }
            StreamEvent::MessageStop => self.finish(),
            StreamEvent::ContentBlockStop { .. }
            | StreamEvent::Ping
            | StreamEvent::Error { .. } => Vec::new(),
        }
    }

    pub fn finish(&mut self) -> Vec<ChatCompletionChunk> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        if !self.opening_emitted {
            return Vec::new();
        }

        let finish_reason = if self.saw_tool_use {
            FinishReason::ToolCalls
        } else {
            self.finish_reason.unwrap_or(FinishReason::Stop)
        };
        let usage = match (self.input_tokens, self.output_tokens) {
            (None, None) => None,
            (input, output) => {
                let prompt = input.unwrap_or(0);
                let completion = output.unwrap_or(0);
                Some(Usage {
                    prompt_tokens: prompt,
                    completion_tokens: completion,
                    total_tokens: prompt + completion,
                })
            }
        };
        vec![self.chunk(ChunkDelta::default(), Some(finish_reason), usage)]
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    fn open_tool(&mut self, block_index: u32, id: Option<String>, name: String) -> ChatCompletionChunk {
        let tool_index = self.next_tool_index;
        self.next_tool_index += 1;
        self.tool_blocks.insert(block_index, tool_index);
        self.saw_tool_use = true;
        self.chunk(
            ChunkDelta {
                tool_calls: Some(vec![ToolCallChunk {
                    index: tool_index,
                    id,
                    r#type: Some(ToolCallType::Function),
                    function: Some(FunctionCallChunk {
                        name: Some(name),
                        arguments: Some(String::new()),
                    }),
                }]),
                ..ChunkDelta::default()
            },
            None,
            None,
        )
    }

    fn latch_usage(&mut self, usage: &AnthropicStreamUsage) {
        if usage.input_tokens.is_some() {
            self.input_tokens = usage.input_tokens;
        }
        if usage.output_tokens.is_some() {
            self.output_tokens = usage.output_tokens;
        }
    }

    fn chunk(
        &self,
        delta: ChunkDelta,
        finish_reason: Option<FinishReason>,
        usage: Option<Usage>,
    ) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: ChunkObjectType::ChatCompletionChunk,
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage,
        }
    }
}

fn map_stop_reason(reason: StopReason) -> FinishReason {
    match reason {
        StopReason::EndTurn | StopReason::StopSequence => FinishReason::Stop,
        StopReason::MaxTokens => FinishReason::Length,
        StopReason::ToolUse => FinishReason::ToolCalls,
        StopReason::Refusal => FinishReason::ContentFilter,
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
    fn message_stream_becomes_role_text_finish_chunks() {
        let mut machine = AnthropicToOpenAIChatStream::new("gpt-proxy");
        let mut chunks = machine.push(event(json!({
            "type": "message_start",
            "message": {
                "id": "msg_1", "type": "message", "role": "assistant", "content": [],
                "model": "claude-3", "stop_reason": null, "stop_sequence": null,
                "usage": {"input_tokens": 7},
            },
        })));
        chunks.extend(machine.push(event(json!({
            "type": "content_block_start", "index": 0,
            "content_block": {"type": "text", "text": ""},
        }))));
        chunks.extend(machine.push(event(json!({
            "type": "content_block_delta", "index": 0,
            "delta": {"type": "text_delta", "text": "hi"},
        }))));
        chunks.extend(machine.push(event(json!({
            "type": "content_block_stop", "index": 0,
        }))));
        chunks.extend(machine.push(event(json!({
            "type": "message_delta",
            "delta": {"stop_reason": "end_turn", "stop_sequence": null},
            "usage": {"output_tokens": 3},
        }))));
        chunks.extend(machine.push(event(json!({"type": "message_stop"}))));

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(chunks[1].choices[0].delta.content.as_deref(), Some("hi"));
        let last = &chunks[2];
        assert_eq!(last.choices[0].finish_reason, Some(FinishReason::Stop));
        let usage = last.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 7);
        assert_eq!(usage.completion_tokens, 3);
        assert_eq!(usage.total_tokens, 10);
        assert!(machine.finished());
    }

    #[test]
    fn tool_use_block_streams_as_indexed_tool_call_chunks() {
        let mut machine = AnthropicToOpenAIChatStream::new("gpt-proxy");
        machine.push(event(json!({
            "type": "message_start",
            "message": {
                "id": "msg_1", "type": "message", "role": "assistant", "content": [],
                "model": "claude-3", "stop_reason": null, "stop_sequence": null, "usage": {},
            },
        })));
        let opener = machine.push(event(json!({
            "type": "content_block_start", "index": 1,
            "content_block": {"type": "tool_use", "id": "toolu_1", "name": "calc", "input": {}},
        })));
        let args = machine.push(event(json!({
            "type": "content_block_delta", "index": 1,
            "delta": {"type": "input_json_delta", "partial_json": "{\"x\":2}"},
        })));
        let done = machine.finish();

        let call = &opener[0].choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.index, 0);
        assert_eq!(call.id.as_deref(), Some("toolu_1"));
        assert_eq!(
            call.function.as_ref().unwrap().name.as_deref(),
            Some("calc")
        );
        let delta = &args[0].choices[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(
            delta.function.as_ref().unwrap().arguments.as_deref(),
            Some("{\"x\":2}")
        );
        assert_eq!(
            done[0].choices[0].finish_reason,
            Some(FinishReason::ToolCalls)
        );
    }
}
