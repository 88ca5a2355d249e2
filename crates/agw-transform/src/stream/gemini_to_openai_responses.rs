use agw_protocol::gemini::response::GenerateContentResponse;
use agw_protocol::gemini::types::{FinishReason, FunctionCall};
use agw_protocol::openai_responses::response::{ObjectType, Response};
use agw_protocol::openai_responses::stream::ResponseStreamEvent;
use agw_protocol::openai_responses::types::{
    FunctionCallItem, FunctionCallItemType, IncompleteDetails, ItemStatus, OutputContent,
    OutputItem, OutputMessage, ResponseStatus, ResponseUsage,
};

use crate::content::stringify_tool_arguments;

use super::{epoch_seconds, synth_id};

#[derive(Debug)]
struct ToolState {
    output_index: i64,
    item_id: String,
    call_id: String,
    name: String,
    arguments: String,
}

/// Rewrites Gemini stream chunks into the `response.*` event family.
#[derive(Debug)]
pub struct GeminiToOpenAIResponsesStream {
    id: String,
    model: String,
    created_at: i64,
    sequence_number: i64,
    opening_emitted: bool,
    message_item_id: String,
    text: String,
    tools: Vec<ToolState>,
    next_output_index: i64,
    finish_reason: Option<FinishReason>,
    usage: Option<ResponseUsage>,
    finished: bool,
}

impl GeminiToOpenAIResponsesStream {
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
            next_output_index: 1,
            finish_reason: None,
            usage: None,
            finished: false,
        }
    }

    pub fn push(&mut self, chunk: GenerateContentResponse) -> Vec<ResponseStreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();
        if !self.opening_emitted {
            events.extend(self.open_response());
        }

        if let Some(usage) = &chunk.usage_metadata {
            let input = usage.prompt_token_count.unwrap_or(0);
            let output = usage.candidates_token_count.unwrap_or(0);
            self.usage = Some(ResponseUsage {
                input_tokens: input,
                output_tokens: output,
                total_tokens: usage.total_token_count.unwrap_or(input + output),
            });
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
            if self.finish_reason.is_none() {
                self.finish_reason = Some(reason);
            }
            events.extend(self.finish());
        }

        events
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

    /// Complete calls arrive in one part: item added plus one arguments
    /// delta.
    fn emit_tool_call(&mut self, call: FunctionCall) -> Vec<ResponseStreamEvent> {
        let output_index = self.next_output_index;
        self.next_output_index += 1;
        let arguments = stringify_tool_arguments(
            &call.args.unwrap_or_else(|| serde_json::json!({})),
        );
        self.tools.push(ToolState {
            output_index,
            item_id: synth_id("fc_"),
            call_id: format!("call_{}", self.tools.len()),
            name: call.name,
            arguments: arguments.clone(),
        });
        let position = self.tools.len() - 1;
        let item_id = self.tools[position].item_id.clone();

        vec![
            ResponseStreamEvent::OutputItemAdded {
                output_index,
                item: self.tool_item(position, ItemStatus::InProgress),
                sequence_number: self.next_seq(),
            },
            ResponseStreamEvent::FunctionCallArgumentsDelta {
                item_id,
                output_index,
                delta: arguments,
                sequence_number: self.next_seq(),
            },
        ]
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
            arguments: if status == ItemStatus::InProgress {
                String::new()
            } else {
                tool.arguments.clone()
            },
            status: Some(status),
        })
    }

    fn terminal_status(&self) -> (ResponseStatus, Option<IncompleteDetails>) {
        if self.tools.is_empty() && self.finish_reason == Some(FinishReason::MaxTokens) {
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
