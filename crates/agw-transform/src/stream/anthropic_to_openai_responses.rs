use std::collections::BTreeMap;

use agw_protocol::anthropic::stream::{ContentBlockDelta, StreamEvent};
use agw_protocol::anthropic::types::{ContentBlock, StopReason};
use agw_protocol::openai_responses::response::{ObjectType, Response};
use agw_protocol::openai_responses::stream::ResponseStreamEvent;
use agw_protocol::openai_responses::types::{
    FunctionCallItem, FunctionCallItemType, IncompleteDetails, ItemStatus, OutputContent,
    OutputItem, OutputMessage, ResponseStatus, ResponseUsage,
};

use super::{epoch_seconds, synth_id};

#[derive(Debug)]
struct ToolState {
    output_index: i64,
    item_id: String,
    call_id: String,
    name: String,
    arguments: String,
}

/// Rewrites Anthropic message events into the `response.*` event family.
#[derive(Debug)]
pub struct AnthropicToOpenAIResponsesStream {
    id: String,
    model: String,
    created_at: i64,
    sequence_number: i64,
    opening_emitted: bool,
    message_item_id: String,
    text: String,
    tools: Vec<ToolState>,
    // Anthropic block index → position in `tools`.
    tool_blocks: BTreeMap<u32, usize>,
    next_output_index: i64,
    stop_reason: Option<StopReason>,
    usage: Option<ResponseUsage>,
    finished: bool,
}

impl AnthropicToOpenAIResponsesStream {
    pub fn new(model: &str) -> Self {
        Self {
            id: synth_id("resp_"),
            model: model.to_string(),
            created_at: epoch_seconds(),
            sequence_number: 0,
            opening_emitted: false,
            message_item_id: synth_id("msg_"),
            text: String::new(),
            tools: Vec::new(),
            tool_blocks: BTreeMap::new(),
            next_output_index: 1,
            stop_reason: None,
            usage: None,
            finished: false,
        }
    }

    pub fn push(&mut self, event: StreamEvent) -> Vec<ResponseStreamEvent> {
        if self.finished {
            return Vec::new();
        }

        match event {
            StreamEvent::MessageStart { message } => {
                self.id = message.id;
                self.open_response()
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block: ContentBlock::ToolUse { id, name, .. },
            } => self.open_tool(index, id, name),
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentBlockDelta::TextDelta { text } => self.emit_text(text),
                ContentBlockDelta::InputJsonDelta { partial_json } => {
                    self.emit_arguments(index, partial_json)
                }
            },
            StreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = usage {
                    let input = usage.input_tokens.unwrap_or(0);
                    let output = usage.output_tokens.unwrap_or(0);
                    self.usage = Some(ResponseUsage {
                        input_tokens: input,
                        output_tokens: output,
                        total_tokens: input + output,
                    });
                }
                if let Some(reason) = delta.stop_reason {
                    if self.stop_reason.is_none() {
                        self.stop_reason = Some(reason);
                    }
                }
                Vec::new()
            }
            StreamEvent::MessageStop => self.finish(),
            StreamEvent::ContentBlockStart { .. }
            | StreamEvent::ContentBlockStop { .. }
            | StreamEvent::Ping
            | StreamEvent::Error { .. } => Vec::new(),
        }
    }

    pub fn finish(&mut self) -> Vec<ResponseStreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        if !self.opening_emitted {
            return Vec::new();
        }

        let mut events = vec![
            ResponseStreamEvent::OutputTextDone {
                item_id: self.message_item_id.clone(),
                output_index: 0,
                content_index: 0,
                text: self.text.clone(),
                sequence_number: self.next_seq(),
            },
            ResponseStreamEvent::ContentPartDone {
                item_id: self.message_item_id.clone(),
                output_index: 0,
                content_index: 0,
                part: OutputContent::OutputText {
                    text: self.text.clone(),
                },
                sequence_number: self.next_seq(),
            },
            ResponseStreamEvent::OutputItemDone {
                output_index: 0,
                item: self.message_item(ItemStatus::Completed),
                sequence_number: self.next_seq(),
            },
        ];

        for position in 0..self.tools.len() {
            let (item_id, output_index, name, arguments) = {
                let tool = &self.tools[position];
                (
                    tool.item_id.clone(),
                    tool.output_index,
                    tool.name.clone(),
                    tool.arguments.clone(),
                )
            };
            events.push(ResponseStreamEvent::FunctionCallArgumentsDone {
                item_id,
                output_index,
                name: Some(name),
                arguments,
                sequence_number: self.next_seq(),
            });
            events.push(ResponseStreamEvent::OutputItemDone {
                output_index,
                item: self.tool_item(position, ItemStatus::Completed),
                sequence_number: self.next_seq(),
            });
        }

        let (status, incomplete_details) = self.terminal_status();
        let response = self.response(status, incomplete_details);
        let sequence_number = self.next_seq();
        events.push(match status {
            ResponseStatus::Incomplete => ResponseStreamEvent::Incomplete {
                response,
                sequence_number,
            },
            _ => ResponseStreamEvent::Completed {
                response,
                sequence_number,
            },
        });
        events
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    fn open_response(&mut self) -> Vec<ResponseStreamEvent> {
        if self.opening_emitted {
            return Vec::new();
        }
        self.opening_emitted = true;
        vec![
            ResponseStreamEvent::Created {
                response: self.response(ResponseStatus::InProgress, None),
                sequence_number: self.next_seq(),
            },
            ResponseStreamEvent::OutputItemAdded {
                output_index: 0,
                item: self.message_item(ItemStatus::InProgress),
                sequence_number: self.next_seq(),
            },
            ResponseStreamEvent::ContentPartAdded {
                item_id: self.message_item_id.clone(),
                output_index: 0,
                content_index: 0,
                part: OutputContent::OutputText {
                    text: String::new(),
                },
                sequence_number: self.next_seq(),
            },
        ]
    }

    fn emit_text(&mut self, text: String) -> Vec<ResponseStreamEvent> {
        if text.is_empty() {
            return Vec::new();
        }
        self.text.push_str(&text);
        vec![ResponseStreamEvent::OutputTextDelta {
            item_id: self.message_item_id.clone(),
            output_index: 0,
            content_index: 0,
            delta: text,
            sequence_number: self.next_seq(),
        }]
    }

    fn open_tool(&mut self, block_index: u32, call_id: String, name: String) -> Vec<ResponseStreamEvent> {
        if self.tool_blocks.contains_key(&block_index) {
            return Vec::new();
        }
        let output_index = self.next_output_index;
        self.next_output_index += 1;
        let item_id = synth_id("fc_");
        self.tools.push(ToolState {
            output_index,
            item_id,
            call_id,
            name,
            arguments: String::new(),
        });
        let position = self.tools.len() - 1;
        self.tool_blocks.insert(block_index, position);

        vec![ResponseStreamEvent::OutputItemAdded {
            output_index,
            item: self.tool_item(position, ItemStatus::InProgress),
            sequence_number: self.next_seq(),
        }]
    }

    fn emit_arguments(&mut self, block_index: u32, delta: String) -> Vec<ResponseStreamEvent> {
        let mut events = Vec::new();
        if !self.tool_blocks.contains_key(&block_index) {
            // Arguments before the opener: synthesize one.
            events.extend(self.open_tool(block_index, synth_id("call_"), String::new()));
        }
        let position = self.tool_blocks[&block_index];
        let (item_id, output_index) = {
            let tool = &mut self.tools[position];
            tool.arguments.push_str(&delta);
            (tool.item_id.clone(), tool.output_index)
        };
        events.push(ResponseStreamEvent::FunctionCallArgumentsDelta {
            item_id,
            output_index,
            delta,
            sequence_number: self.next_seq(),
        });
        events
    }

    fn message_item(&self, status: ItemStatus) -> OutputItem {
        let content = if self.text.is_empty() && status == ItemStatus::InProgress {
            Vec::new()
        } else {
            vec![OutputContent::OutputText {
                text: self.text.clone(),
            }]
        };
        OutputItem::Message(OutputMessage {
            id: self.message_item_id.clone(),
            role: "assistant".to_string(),
            status,
            content,
        })
    }

    fn tool_item(&self, position: usize, status: ItemStatus) -> OutputItem {
        let tool = &self.tools[position];
        OutputItem::FunctionCall(FunctionCallItem {
            r#type: FunctionCallItemType::FunctionCall,
            id: Some(tool.item_id.clone()),
            call_id: tool.call_id.clone(),
            name: tool.name.clone(),
            arguments: tool.arguments.clone(),
            status: Some(status),
        })
    }

    fn terminal_status(&self) -> (ResponseStatus, Option<IncompleteDetails>) {
        if self.tools.is_empty() && self.stop_reason == Some(StopReason::MaxTokens) {
            (
                ResponseStatus::Incomplete,
                Some(IncompleteDetails {
                    reason: "max_output_tokens".to_string(),
                }),
            )
        } else {
            (ResponseStatus::Completed, None)
        }
    }

    fn response(
        &self,
        status: ResponseStatus,
        incomplete_details: Option<IncompleteDetails>,
    ) -> Response {
        let mut output = vec![self.message_item(match status {
            ResponseStatus::InProgress => ItemStatus::InProgress,
            _ => ItemStatus::Completed,
        })];
        if status != ResponseStatus::InProgress {
            for position in 0..self.tools.len() {
                output.push(self.tool_item(position, ItemStatus::Completed));
            }
        }
        Response {
            id: self.id.clone(),
            object: ObjectType::Response,
            created_at: self.created_at,
            status,
            incomplete_details,
            model: self.model.clone(),
            output,
            usage: self.usage,
        }
    }

    fn next_seq(&mut self) -> i64 {
        let value = self.sequence_number;
        self.sequence_number += 1;
        value
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
    fn preamble_then_text_then_completed() {
        let mut machine = AnthropicToOpenAIResponsesStream::new("gpt-proxy");
        let mut events = machine.push(event(json!({
            "type": "message_start",
            "message": {
                "id": "msg_1", "type": "message", "role": "assistant", "content": [],
                "model": "claude-3", "stop_reason": null, "stop_sequence": null, "usage": {},
            },
        })));
        events.extend(machine.push(event(json!({
            "type": "content_block_delta", "index": 0,
            "delta": {"type": "text_delta", "text": "hi"},
        }))));
        events.extend(machine.push(event(json!({"type": "message_stop"}))));

        assert!(matches!(events[0], ResponseStreamEvent::Created { .. }));
        assert!(matches!(events[1], ResponseStreamEvent::OutputItemAdded { .. }));
        assert!(matches!(events[2], ResponseStreamEvent::ContentPartAdded { .. }));
        assert!(matches!(
            &events[3],
            ResponseStreamEvent::OutputTextDelta { delta, .. } if delta == "hi"
        ));
        let last = events.last().unwrap();
        match last {
            ResponseStreamEvent::Completed { response, .. } => {
                assert_eq!(response.status, ResponseStatus::Completed);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        // Sequence numbers are strictly increasing from zero.
        let seqs: Vec<i64> = events
            .iter()
            .map(|event| match event {
                ResponseStreamEvent::Created { sequence_number, .. }
                | ResponseStreamEvent::OutputItemAdded { sequence_number, .. }
                | ResponseStreamEvent::ContentPartAdded { sequence_number, .. }
                | ResponseStreamEvent::OutputTextDelta { sequence_number, .. }
                | ResponseStreamEvent::OutputTextDone { sequence_number, .. }
                | ResponseStreamEvent::ContentPartDone { sequence_number, .. }
                | ResponseStreamEvent::OutputItemDone { sequence_number, .. }
                | ResponseStreamEvent::Completed { sequence_number, .. } => *sequence_number,
                _ => panic!("unexpected event"),
            })
            .collect();
        assert_eq!(seqs, (0..seqs.len() as i64).collect::<Vec<_>>());
    }
}
