use std::collections::BTreeMap;

use agw_protocol::anthropic::response::MessageType;
use agw_protocol::anthropic::stream::{
    ContentBlockDelta, MessageDelta, StreamEvent, StreamMessage, StreamUsage,
};
use agw_protocol::anthropic::types::{ContentBlock, MessageRole, StopReason};
use agw_protocol::openai_responses::response::Response;
use agw_protocol::openai_responses::stream::ResponseStreamEvent;
use agw_protocol::openai_responses::types::{OutputItem, ResponseStatus};

/// Rewrites a `response.*` event stream into Anthropic message events.
#[derive(Debug)]
pub struct OpenAIResponsesToAnthropicStream {
    model: String,
    opening_emitted: bool,
    next_block_index: u32,
    text_block: Option<u32>,
    open_tools: BTreeMap<String, u32>,
    stop_reason: Option<StopReason>,
    usage: StreamUsage,
    saw_tool_use: bool,
    finished: bool,
}

impl OpenAIResponsesToAnthropicStream {
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

    pub fn push(&mut self, event: ResponseStreamEvent) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        match event {
            ResponseStreamEvent::Created { response, .. }
            | ResponseStreamEvent::InProgress { response, .. } => {
                let mut events = Vec::new();
                if !self.opening_emitted {
                    events.extend(self.open_message(&response.id));
                }
                events
            }
            ResponseStreamEvent::OutputTextDelta { delta, .. } => self.emit_text(&delta),
            ResponseStreamEvent::OutputItemAdded { item, .. } => match item {
                OutputItem::FunctionCall(call) => {
                    let keys: Vec<String> = call
                        .id
                        .iter()
                        .cloned()
                        .chain(std::iter::once(call.call_id.clone()))
                        .collect();
                    self.open_tool_block(&keys, &call.call_id, &call.name)
                }
                OutputItem::Message(_) => Vec::new(),
            },
            ResponseStreamEvent::FunctionCallArgumentsDelta { item_id, delta, .. } => {
                let mut events = Vec::new();
                if !self.open_tools.contains_key(&item_id) {
                    // Arguments before the opener: synthesize one with the
                    // best-known name.
                    events.extend(self.open_tool_block(
                        std::slice::from_ref(&item_id),
                        &item_id,
                        "",
                    ));
                }
                if let Some(index) = self.open_tools.get(&item_id) {
                    events.push(StreamEvent::ContentBlockDelta {
                        index: *index,
                        delta: ContentBlockDelta::InputJsonDelta {
                            partial_json: delta,
                        },
                    });
                }
                events
            }
            ResponseStreamEvent::OutputItemDone { item, .. } => {
                // Close the tool block on its own done event.
                if let OutputItem::FunctionCall(call) = item {
                    let mut events = Vec::new();
                    let keys: Vec<String> = call
                        .id
                        .iter()
                        .cloned()
                        .chain(std::iter::once(call.call_id.clone()))
                        .collect();
                    if let Some(index) = self.take_tool_block(&keys) {
                        events.push(StreamEvent::ContentBlockStop { index });
                    }
                    events
                } else {
                    Vec::new()
                }
            }
            ResponseStreamEvent::Completed { response, .. }
            | ResponseStreamEvent::Incomplete { response, .. }
            | ResponseStreamEvent::Failed { response, .. } => self.finish_with(&response),
            ResponseStreamEvent::ContentPartAdded { .. }
            | ResponseStreamEvent::ContentPartDone { .. }
            | ResponseStreamEvent::OutputTextDone { .. }
            | ResponseStreamEvent::FunctionCallArgumentsDone { .. } => Vec::new(),
        }
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

    fn finish_with(&mut self, response: &Response) -> Vec<StreamEvent> {
        if let Some(usage) = &response.usage {
            self.usage.input_tokens = Some(usage.input_tokens);
            self.usage.output_tokens = Some(usage.output_tokens);
        }
        let reason = map_status(response);
        if self.stop_reason.is_none() {
            self.stop_reason = Some(reason);
        }
        if !self.opening_emitted {
            // Terminal before any identity event; open so the grammar stays
            // complete.
            let mut events = self.open_message(&response.id);
            events.extend(self.emit_terminal());
            return events;
        }
        self.emit_terminal()
    }

    fn emit_terminal(&mut self) -> Vec<StreamEvent> {
        self.finished = true;
        let mut events = Vec::new();
        if let Some(index) = self.text_block.take() {
            events.push(StreamEvent::ContentBlockStop { index });
        }
        let open = std::mem::take(&mut self.open_tools);
        let mut indexes: Vec<u32> = open.into_values().collect();
        indexes.sort_unstable();
        indexes.dedup();
        for index in indexes {
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

    fn open_tool_block(&mut self, keys: &[String], call_id: &str, name: &str) -> Vec<StreamEvent> {
        if keys.iter().any(|key| self.open_tools.contains_key(key)) {
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(index) = self.text_block.take() {
            events.push(StreamEvent::ContentBlockStop { index });
        }
        let block_index = self.next_block_index;
        self.next_block_index += 1;
        self.saw_tool_use = true;
        for key in keys {
            self.open_tools.insert(key.clone(), block_index);
        }
        events.push(StreamEvent::ContentBlockStart {
            index: block_index,
            content_block: ContentBlock::ToolUse {
                id: call_id.to_string(),
                name: name.to_string(),
                input: serde_json::Map::new(),
            },
        });
        events
    }

    fn take_tool_block(&mut self, keys: &[String]) -> Option<u32> {
        let index = keys
            .iter()
            .find_map(|key| self.open_tools.get(key).copied())?;
        self.open_tools.retain(|_, value| *value != index);
        Some(index)
    }
}

fn map_status(response: &Response) -> StopReason {
    match response.status {
        ResponseStatus::Incomplete => {
            let max_tokens = response
                .incomplete_details
                .as_ref()
                .map(|details| details.reason == "max_output_tokens")
                .unwrap_or(false);
            if max_tokens {
                StopReason::MaxTokens
            } else {
                StopReason::EndTurn
            }
        }
        _ => StopReason::EndTurn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> ResponseStreamEvent {
        serde_json::from_value(value).unwrap()
    }

    fn response_skeleton(status: &str) -> serde_json::Value {
        json!({
            "id": "resp_1",
            "object": "response",
            "created_at": 0,
            "status": status,
            "model": "gpt-4.1",
            "output": [],
            "usage": {"input_tokens": 5, "output_tokens": 9, "total_tokens": 14},
        })
    }

    #[test]
    fn function_call_stream_maps_to_tool_use_blocks() {
        let mut machine = OpenAIResponsesToAnthropicStream::new("claude-x");
        let mut events = machine.push(event(json!({
            "type": "response.created",
            "response": response_skeleton("in_progress"),
            "sequence_number": 0,
        })));
        events.extend(machine.push(event(json!({
            "type": "response.output_item.added",
            "output_index": 0,
            "item": {"type": "function_call", "id": "fc_1", "call_id": "call_x",
                     "name": "f", "arguments": ""},
            "sequence_number": 1,
        }))));
        events.extend(machine.push(event(json!({
            "type": "response.function_call_arguments.delta",
            "item_id": "fc_1",
            "output_index": 0,
            "delta": "{\"a\":1}",
            "sequence_number": 2,
        }))));
        events.extend(machine.push(event(json!({
            "type": "response.completed",
            "response": response_skeleton("completed"),
            "sequence_number": 3,
        }))));

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
            StreamEvent::MessageDelta { delta, usage } => {
                assert_eq!(delta.stop_reason, Some(StopReason::ToolUse));
                assert_eq!(usage.unwrap().output_tokens, Some(9));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(machine.finished());
    }

    #[test]
    fn incomplete_max_output_tokens_becomes_max_tokens() {
        let mut machine = OpenAIResponsesToAnthropicStream::new("claude-x");
        machine.push(event(json!({
            "type": "response.created",
            "response": response_skeleton("in_progress"),
            "sequence_number": 0,
        })));
        let mut terminal = response_skeleton("incomplete");
        terminal["incomplete_details"] = json!({"reason": "max_output_tokens"});
        let events = machine.push(event(json!({
            "type": "response.incomplete",
            "response": terminal,
            "sequence_number": 1,
        })));
        let delta = events
            .iter()
            .find_map(|event| match event {
                StreamEvent::MessageDelta { delta, .. } => Some(delta),
                _ => None,
            })
            .unwrap();
        assert_eq!(delta.stop_reason, Some(StopReason::MaxTokens));
    }
}
