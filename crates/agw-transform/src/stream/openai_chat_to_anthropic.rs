use std::collections::BTreeMap;

use agw_protocol::anthropic::response::MessageType;
use agw_protocol::anthropic::stream::{
    ContentBlockDelta, MessageDelta, StreamEvent, StreamMessage, StreamUsage,
};
use agw_protocol::anthropic::types::{ContentBlock, MessageRole, StopReason};
use agw_protocol::openai_chat::stream::{ChatCompletionChunk, ToolCallChunk};
use agw_protocol::openai_chat::types::FinishReason;

/// Rewrites a chat-completions chunk stream into Anthropic message events.
#[derive(Debug)]
pub struct OpenAIChatToAnthropicStream {
    model: String,
    opening_emitted: bool,
    next_block_index: u32,
    text_block: Option<u32>,
    open_tools: BTreeMap<i64, u32>,
    stop_reason: Option<StopReason>,
    usage: StreamUsage,
    saw_tool_use: bool,
    finished: bool,
}

impl OpenAIChatToAnthropicStream {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            opening_emitted: false,
            next_block_index: 0,
            text_block: None,
            open_tools: BTreeMap::new(),
            stop_reason: None,
            usage: StreamUsage::default(),
            saw_tool_use: false,
            finished: false,
        }
    }

    pub fn push(&mut self, chunk: ChatCompletionChunk) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();
        if !self.opening_emitted {
            events.extend(self.open_message(&chunk.id));
        }

        if let Some(usage) = &chunk.usage {
            self.usage.input_tokens = Some(usage.prompt_tokens);
            self.usage.output_tokens = Some(usage.completion_tokens);
        }

        if let Some(choice) = chunk.choices.first() {
            if let Some(content) = &choice.delta.content {
                events.extend(self.emit_text(content));
            }
            for call in choice.delta.tool_calls.as_deref().unwrap_or_default() {
                events.extend(self.emit_tool_call(call));
            }
            if let Some(reason) = choice.finish_reason {
                self.latch_stop_reason(map_finish_reason(reason));
            }
        }

        events
    }

    /// Driven by the upstream `[DONE]` sentinel (or EOF).
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished || !self.opening_emitted {
            self.finished = true;
            return Vec::new();
        }
        self.finished = true;

        let mut events = self.close_open_blocks();
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

    pub fn finished(&self) -> bool {
        self.finished
    }

    fn open_message(&mut self, id: &str) -> Vec<StreamEvent> {
        self.opening_emitted = true;
        let mut events = vec![StreamEvent::MessageStart {
            message: StreamMessage {
                id: id.to_string(),
                r#type: MessageType::Message,
                role: MessageRole::Assistant,
                content: Vec::new(),
                model: self.model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: StreamUsage::default(),
            },
        }];
        events.extend(self.open_text_block());
        events
    }

    fn open_text_block(&mut self) -> Vec<StreamEvent> {
        let index = self.next_block_index;
        self.next_block_index += 1;
        self.text_block = Some(index);
        vec![StreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlock::Text {
                text: String::new(),
            },
        }]
    }

    fn emit_text(&mut self, text: &str) -> Vec<StreamEvent> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut events = Vec::new();
        if self.text_block.is_none() {
            // Text after tool calls: close the tool blocks and start over at
            // the next index.
            events.extend(self.close_tool_blocks());
            events.extend(self.open_text_block());
        }
        if let Some(index) = self.text_block {
            events.push(StreamEvent::ContentBlockDelta {
                index,
                delta: ContentBlockDelta::TextDelta {
                    text: text.to_string(),
                },
            });
        }
        events
    }

    fn emit_tool_call(&mut self, call: &ToolCallChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if !self.open_tools.contains_key(&call.index) {
            if let Some(index) = self.text_block.take() {
                events.push(StreamEvent::ContentBlockStop { index });
            }
            let block_index = self.next_block_index;
            self.next_block_index += 1;
            self.open_tools.insert(call.index, block_index);
            self.saw_tool_use = true;

            let id = call
                .id
                .clone()
                .unwrap_or_else(|| format!("call_{}", call.index));
            let name = call
                .function
                .as_ref()
                .and_then(|function| function.name.clone())
                .unwrap_or_default();
            events.push(StreamEvent::ContentBlockStart {
                index: block_index,
                content_block: ContentBlock::ToolUse {
                    id,
                    name,
                    input: serde_json::Map::new(),
                },
            });
        }

        if let Some(arguments) = call
            .function
            .as_ref()
            .and_then(|function| function.arguments.as_ref())
        {
            if !arguments.is_empty() {
                if let Some(block_index) = self.open_tools.get(&call.index) {
                    events.push(StreamEvent::ContentBlockDelta {
                        index: *block_index,
                        delta: ContentBlockDelta::InputJsonDelta {
                            partial_json: arguments.clone(),
                        },
                    });
                }
            }
        }

        events
    }

    fn close_tool_blocks(&mut self) -> Vec<StreamEvent> {
        let open = std::mem::take(&mut self.open_tools);
        open.into_values()
            .map(|index| StreamEvent::ContentBlockStop { index })
            .collect()
    }

    fn close_open_blocks(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if let Some(index) = self.text_block.take() {
            events.push(StreamEvent::ContentBlockStop { index });
        }
        events.extend(self.close_tool_blocks());
        events
    }

    fn latch_stop_reason(&mut self, reason: StopReason) {
        if self.stop_reason.is_none() {
            self.stop_reason = Some(reason);
        }
    }
}

fn map_finish_reason(reason: FinishReason) -> StopReason {
    match reason {
        FinishReason::Stop => StopReason::EndTurn,
        FinishReason::Length => StopReason::MaxTokens,
        FinishReason::ToolCalls => StopReason::ToolUse,
        FinishReason::ContentFilter => StopReason::Refusal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(value: serde_json::Value) -> ChatCompletionChunk {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_stream_produces_the_full_event_grammar() {
        let mut machine = OpenAIChatToAnthropicStream::new("claude-x");
        let mut events = machine.push(chunk(json!({
            "id": "c1",
            "object": "chat.completion.chunk",
            "created": 0,
            "model": "gpt-4",
            "choices": [{"index": 0, "delta": {"content": "hi"}, "finish_reason": "stop"}],
        })));
        events.extend(machine.finish());

        let names: Vec<&str> = events.iter().map(|event| event.event_name()).collect();
        assert_eq!(
            names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        match &events[4] {
            StreamEvent::MessageDelta { delta, .. } => {
                assert_eq!(delta.stop_reason, Some(StopReason::EndTurn));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(machine.finished());
        assert!(machine
            .push(chunk(json!({
                "id": "c1", "object": "chat.completion.chunk", "created": 0,
                "model": "gpt-4", "choices": [],
            })))
            .is_empty());
    }

    #[test]
    fn tool_call_closes_text_block_and_streams_arguments() {
        let mut machine = OpenAIChatToAnthropicStream::new("claude-x");
        let mut events = machine.push(chunk(json!({
            "id": "c1", "object": "chat.completion.chunk", "created": 0, "model": "gpt-4",
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_x", "type": "function",
                 "function": {"name": "f", "arguments": ""}},
            ]}, "finish_reason": null}],
        })));
        events.extend(machine.push(chunk(json!({
            "id": "c1", "object": "chat.completion.chunk", "created": 0, "model": "gpt-4",
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{\"a\":1}"}},
            ]}, "finish_reason": "tool_calls"}],
        }))));
        events.extend(machine.finish());

        // Text block 0 opens in the preamble and closes when the tool starts.
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
        match &events[3] {
            StreamEvent::ContentBlockStart { index, content_block } => {
                assert_eq!(*index, 1);
                assert!(matches!(
                    content_block,
                    ContentBlock::ToolUse { id, name, .. } if id == "call_x" && name == "f"
                ));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match &events[6] {
            StreamEvent::MessageDelta { delta, .. } => {
                assert_eq!(delta.stop_reason, Some(StopReason::ToolUse));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn arguments_before_opener_synthesize_the_missing_start() {
        let mut machine = OpenAIChatToAnthropicStream::new("claude-x");
        let events = machine.push(chunk(json!({
            "id": "c1", "object": "chat.completion.chunk", "created": 0, "model": "gpt-4",
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 2, "function": {"arguments": "{\"a\":"}},
            ]}, "finish_reason": null}],
        })));
        // message_start, text start, text stop, synthesized tool start, delta
        assert!(matches!(
            &events[3],
            StreamEvent::ContentBlockStart {
                content_block: ContentBlock::ToolUse { name, .. },
                ..
            } if name.is_empty()
        ));
        assert!(matches!(
            &events[4],
            StreamEvent::ContentBlockDelta {
                delta: ContentBlockDelta::InputJsonDelta { partial_json },
                ..
            } if partial_json == "{\"a\":"
        ));
    }
}
