use std::collections::BTreeMap;

use agw_protocol::openai_chat::stream::{ChatCompletionChunk, ToolCallChunk};
use agw_protocol::openai_chat::types::FinishReason;
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

/// Rewrites chat-completions chunks into the `response.*` event family.
#[derive(Debug)]
pub struct OpenAIChatToOpenAIResponsesStream {
    id: String,
    model: String,
    created_at: i64,
    sequence_number: i64,
    opening_emitted: bool,
    message_item_id: String,
    text: String,
    tools: Vec<ToolState>,
    // Upstream tool-call index → position in `tools`.
    tool_indexes: BTreeMap<i64, usize>,
    next_output_index: i64,
    finish_reason: Option<FinishReason>,
    usage: Option<ResponseUsage>,
    finished: bool,
}

impl OpenAIChatToOpenAIResponsesStream {
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
            tool_indexes: BTreeMap::new(),
            next_output_index: 1,
            finish_reason: None,
            usage: None,
            finished: false,
        }
    }

    pub fn push(&mut self, chunk: ChatCompletionChunk) -> Vec<ResponseStreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();
        if !self.opening_emitted {
            events.extend(self.open_response());
        }

        if let Some(usage) = &chunk.usage {
            self.usage = Some(ResponseUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            });
        }

        if let Some(choice) = chunk.choices.first() {
            if let Some(content) = &choice.delta.content {
                events.extend(self.emit_text(content));
            }
            for call in choice.delta.tool_calls.as_deref().unwrap_or_default() {
                events.extend(self.emit_tool_call(call));
            }
            if let Some(reason) = choice.finish_reason {
                if self.finish_reason.is_none() {
                    self.finish_reason = Some(reason);
                }
            }
        }

        events
    }

    /// Driven by the upstream `[DONE]` sentinel (or EOF).
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

    fn emit_text(&mut self, text: &str) -> Vec<ResponseStreamEvent> {
        if text.is_empty() {
            return Vec::new();
        }
        self.text.push_str(text);
        vec![ResponseStreamEvent::OutputTextDelta {
            item_id: self.message_item_id.clone(),
            output_index: 0,
            content_index: 0,
            delta: text.to_string(),
            sequence_number: self.next_seq(),
        }]
    }

    fn emit_tool_call(&mut self, call: &ToolCallChunk) -> Vec<ResponseStreamEvent> {
        let mut events = Vec::new();

        let position = match self.tool_indexes.get(&call.index) {
            Some(position) => *position,
            None => {
                let output_index = self.next_output_index;
                self.next_output_index += 1;
                let call_id = call
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("call_{}", call.index));
                let name = call
                    .function
                    .as_ref()
                    .and_then(|function| function.name.clone())
                    .unwrap_or_default();
                self.tools.push(ToolState {
                    output_index,
                    item_id: synth_id("fc_"),
                    call_id,
                    name,
                    arguments: String::new(),
                });
                let position = self.tools.len() - 1;
                self.tool_indexes.insert(call.index, position);
                events.push(ResponseStreamEvent::OutputItemAdded {
                    output_index,
                    item: self.tool_item(position, ItemStatus::InProgress),
                    sequence_number: self.next_seq(),
                });
                position
            }
        };

        if let Some(arguments) = call
            .function
            .as_ref()
            .and_then(|function| function.arguments.as_ref())
        {
            if !arguments.is_empty() {
                let (item_id, output_index) = {
                    let tool = &mut self.tools[position];
                    tool.arguments.push_str(arguments);
                    (tool.item_id.clone(), tool.output_index)
                };
                events.push(ResponseStreamEvent::FunctionCallArgumentsDelta {
                    item_id,
                    output_index,
                    delta: arguments.clone(),
                    sequence_number: self.next_seq(),
                });
            }
        }

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
        if self.tools.is_empty() && self.finish_reason == Some(FinishReason::Length) {
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

    fn chunk(value: serde_json::Value) -> ChatCompletionChunk {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn streamed_tool_call_produces_the_responses_grammar() {
        let mut machine = OpenAIChatToOpenAIResponsesStream::new("gpt-proxy");
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
                {"index": 0, "function": {"arguments": "{\"a\":"}},
            ]}, "finish_reason": null}],
        }))));
        events.extend(machine.push(chunk(json!({
            "id": "c1", "object": "chat.completion.chunk", "created": 0, "model": "gpt-4",
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "1}"}},
            ]}, "finish_reason": null}],
        }))));
        events.extend(machine.push(chunk(json!({
            "id": "c1", "object": "chat.completion.chunk", "created": 0, "model": "gpt-4",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}],
        }))));
        events.extend(machine.finish());

        assert!(matches!(events[0], ResponseStreamEvent::Created { .. }));
        assert!(matches!(
            &events[1],
            ResponseStreamEvent::OutputItemAdded { item: OutputItem::Message(_), .. }
        ));
        assert!(matches!(events[2], ResponseStreamEvent::ContentPartAdded { .. }));
        match &events[3] {
            ResponseStreamEvent::OutputItemAdded {
                item: OutputItem::FunctionCall(call),
                ..
            } => {
                assert_eq!(call.call_id, "call_x");
                assert_eq!(call.name, "f");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let deltas: Vec<&str> = events
            .iter()
            .filter_map(|event| match event {
                ResponseStreamEvent::FunctionCallArgumentsDelta { delta, .. } => {
                    Some(delta.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(deltas, vec!["{\"a\":", "1}"]);

        match events.last().unwrap() {
            ResponseStreamEvent::Completed { response, .. } => {
                assert_eq!(response.status, ResponseStatus::Completed);
                match &response.output[1] {
                    OutputItem::FunctionCall(call) => {
                        assert_eq!(call.arguments, "{\"a\":1}");
                    }
                    other => panic!("unexpected item: {other:?}"),
                }
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let done_items = events
            .iter()
            .filter(|event| matches!(event, ResponseStreamEvent::OutputItemDone { .. }))
            .count();
        assert_eq!(done_items, 2);
    }
}
