use std::collections::BTreeMap;

use agw_protocol::gemini::response::{Candidate, GenerateContentResponse};
use agw_protocol::gemini::types::{
    Content, ContentRole, FinishReason, FunctionCall, Part, UsageMetadata,
};
use agw_protocol::openai_responses::response::Response;
use agw_protocol::openai_responses::stream::ResponseStreamEvent;
use agw_protocol::openai_responses::types::{OutputItem, ResponseStatus};

use crate::content::parse_tool_arguments;

/// Rewrites a `response.*` event stream into Gemini stream chunks. Argument
/// deltas are buffered per item and flushed as complete `functionCall` parts
/// when the item is done (or at stream end).
#[derive(Debug)]
pub struct OpenAIResponsesToGeminiStream {
    tool_buffers: BTreeMap<String, (String, String)>,
    finish_reason: Option<FinishReason>,
    usage: Option<UsageMetadata>,
    saw_tool_use: bool,
    finished: bool,
}

impl OpenAIResponsesToGeminiStream {
    pub fn new(_model: &str) -> Self {
        Self {
            tool_buffers: BTreeMap::new(),
            finish_reason: None,
            usage: None,
            saw_tool_use: false,
            finished: false,
        }
    }

    pub fn push(&mut self, event: ResponseStreamEvent) -> Vec<GenerateContentResponse> {
        if self.finished {
            return Vec::new();
        }

        match event {
            ResponseStreamEvent::OutputTextDelta { delta, .. } => {
                if delta.is_empty() {
                    return Vec::new();
                }
                vec![text_chunk(delta)]
            }
            ResponseStreamEvent::OutputItemAdded { item, .. } => {
                if let OutputItem::FunctionCall(call) = item {
                    self.saw_tool_use = true;
                    let key = call.id.unwrap_or(call.call_id);
                    self.tool_buffers.insert(key, (call.name, call.arguments));
                }
                Vec::new()
            }
            ResponseStreamEvent::FunctionCallArgumentsDelta { item_id, delta, .. } => {
                self.saw_tool_use = true;
                let entry = self
                    .tool_buffers
                    .entry(item_id)
                    .or_insert_with(|| (String::new(), String::new()));
                entry.1.push_str(&delta);
                Vec::new()
            }
            ResponseStreamEvent::OutputItemDone { item, .. } => {
                if let OutputItem::FunctionCall(call) = item {
                    let key = call.id.unwrap_or(call.call_id);
                    let (name, buffered) = self
                        .tool_buffers
                        .remove(&key)
                        .unwrap_or((call.name.clone(), String::new()));
                    // The done item carries the authoritative arguments.
                    let arguments = if call.arguments.is_empty() {
                        buffered
                    } else {
                        call.arguments
                    };
                    let name = if name.is_empty() { call.name } else { name };
                    return vec![function_call_chunk(name, &arguments)];
                }
                Vec::new()
            }
            ResponseStreamEvent::Completed { response, .. }
            | ResponseStreamEvent::Incomplete { response, .. }
            | ResponseStreamEvent::Failed { response, .. } => self.finish_with(&response),
            ResponseStreamEvent::Created { .. }
            | ResponseStreamEvent::InProgress { .. }
            | ResponseStreamEvent::ContentPartAdded { .. }
            | ResponseStreamEvent::ContentPartDone { .. }
            | ResponseStreamEvent::OutputTextDone { .. }
            | ResponseStreamEvent::FunctionCallArgumentsDone { .. } => Vec::new(),
        }
    }

    pub fn finish(&mut self) -> Vec<GenerateContentResponse> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        self.emit_terminal()
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    fn finish_with(&mut self, response: &Response) -> Vec<GenerateContentResponse> {
        self.finished = true;
        if let Some(usage) = &response.usage {
            self.usage = Some(UsageMetadata {
                prompt_token_count: Some(usage.input_tokens),
                candidates_token_count: Some(usage.output_tokens),
                total_token_count: Some(usage.total_tokens),
            });
        }
        if self.finish_reason.is_none() {
            self.finish_reason = Some(map_status(response));
        }
        self.emit_terminal()
    }

    fn emit_terminal(&mut self) -> Vec<GenerateContentResponse> {
        let mut chunks = Vec::new();
        let buffers = std::mem::take(&mut self.tool_buffers);
        for (_, (name, arguments)) in buffers {
            chunks.push(function_call_chunk(name, &arguments));
        }

        let finish_reason = if self.saw_tool_use {
            FinishReason::Stop
        } else {
            self.finish_reason.unwrap_or(FinishReason::Stop)
        };
        chunks.push(GenerateContentResponse {
            candidates: vec![Candidate {
                content: Content {
                    role: Some(ContentRole::Model),
                    parts: Vec::new(),
                },
                finish_reason: Some(finish_reason),
                index: Some(0),
            }],
            usage_metadata: self.usage,
            model_version: None,
        });
        chunks
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

fn map_status(response: &Response) -> FinishReason {
    match response.status {
        ResponseStatus::Incomplete => {
            let max_tokens = response
                .incomplete_details
                .as_ref()
                .map(|details| details.reason == "max_output_tokens")
                .unwrap_or(false);
            if max_tokens {
                FinishReason::MaxTokens
            } else {
                FinishReason::Stop
            }
        }
        _ => FinishReason::Stop,
    }
}
