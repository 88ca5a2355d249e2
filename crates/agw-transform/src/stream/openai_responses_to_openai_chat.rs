use std::collections::BTreeMap;

use agw_protocol::openai_chat::stream::{
    ChatCompletionChunk, ChunkChoice, ChunkDelta, ChunkObjectType, FunctionCallChunk,
    ToolCallChunk,
};
use agw_protocol::openai_chat::types::{FinishReason, ToolCallType, Usage};
use agw_protocol::openai_responses::response::Response;
use agw_protocol::openai_responses::stream::ResponseStreamEvent;
use agw_protocol::openai_responses::types::{OutputItem, ResponseStatus};

use super::{epoch_seconds, synth_id};

/// Rewrites a `response.*` event stream into chat-completions chunks.
#[derive(Debug)]
pub struct OpenAIResponsesToOpenAIChatStream {
    id: String,
    model: String,
    created: i64,
    opening_emitted: bool,
    // Item id (and call id) → outbound tool_calls index.
    tool_items: BTreeMap<String, i64>,
    next_tool_index: i64,
    saw_tool_use: bool,
    finished: bool,
}

impl OpenAIResponsesToOpenAIChatStream {
    pub fn new(model: &str) -> Self {
        Self {
            id: synth_id("chatcmpl-"),
            model: model.to_string(),
            created: epoch_seconds(),
            opening_emitted: false,
            tool_items: BTreeMap::new(),
            next_tool_index: 0,
            saw_tool_use: false,
            finished: false,
        }
    }

    pub fn push(&mut self, event: ResponseStreamEvent) -> Vec<ChatCompletionChunk> {
        if self.finished {
            return Vec::new();
        }

        match event {
            ResponseStreamEvent::Created { response, .. }
            | ResponseStreamEvent::InProgress { response, .. } => {
                if self.opening_emitted {
                    return Vec::new();
                }
                self.id = response.id;
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
            ResponseStreamEvent::OutputTextDelta { delta, .. } => {
                if delta.is_empty() {
                    return Vec::new();
                }
                let mut chunks = self.ensure_opening();
                chunks.push(self.chunk(
                    ChunkDelta {
                        content: Some(delta),
                        ..ChunkDelta::default()
                    },
                    None,
                    None,
                ));
                chunks
            }
            ResponseStreamEvent::OutputItemAdded { item, .. } => match item {
                OutputItem::FunctionCall(call) => {
                    let mut chunks = self.ensure_opening();
                    let keys: Vec<String> = call
                        .id
                        .iter()
                        .cloned()
                        .chain(std::iter::once(call.call_id.clone()))
                        .collect();
                    if let Some(chunk) = self.open_tool(&keys, Some(call.call_id), call.name) {
                        chunks.push(chunk);
                    }
                    chunks
                }
                OutputItem::Message(_) => self.ensure_opening(),
            },
            ResponseStreamEvent::FunctionCallArgumentsDelta { item_id, delta, .. } => {
                let mut chunks = self.ensure_opening();
                if !self.tool_items.contains_key(&item_id) {
                    if let Some(chunk) = self.open_tool(
                        std::slice::from_ref(&item_id),
                        None,
                        String::new(),
                    ) {
                        chunks.push(chunk);
                    }
                }
                let tool_index = self.tool_items[&item_id];
                chunks.push(self.chunk(
                    ChunkDelta {
                        tool_calls: Some(vec![ToolCallChunk {
                            index: tool_index,
                            id: None,
                            r#type: None,
                            function: Some(FunctionCallChunk {
                                name: None,
                                arguments: Some(delta),
                            }),
                        }]),
                        ..ChunkDelta::default()
                    },
                    None,
                    None,
                ));
                chunks
            }
            ResponseStreamEvent::Completed { response, .. }
            | ResponseStreamEvent::Incomplete { response, .. }
            | ResponseStreamEvent::Failed { response, .. } => self.finish_with(&response),
            ResponseStreamEvent::ContentPartAdded { .. }
            | ResponseStreamEvent::ContentPartDone { .. }
            | ResponseStreamEvent::OutputTextDone { .. }
            | ResponseStreamEvent::FunctionCallArgumentsDone { .. }
            | ResponseStreamEvent::OutputItemDone { .. } => Vec::new(),
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
            FinishReason::Stop
        };
        vec![self.chunk(ChunkDelta::default(), Some(finish_reason), None)]
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    fn finish_with(&mut self, response: &Response) -> Vec<ChatCompletionChunk> {
        self.finished = true;
        let mut chunks = Vec::new();
        if !self.opening_emitted {
            self.opening_emitted = true;
            self.id = response.id.clone();
            chunks.push(self.chunk(
                ChunkDelta {
                    role: Some("assistant".to_string()),
                    ..ChunkDelta::default()
                },
                None,
                None,
            ));
        }

        let finish_reason = if self.saw_tool_use {
            FinishReason::ToolCalls
        } else {
            map_status(response)
        };
        let usage = response.usage.map(|usage| Usage {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
        });
        chunks.push(self.chunk(ChunkDelta::default(), Some(finish_reason), usage));
        chunks
    }

    fn ensure_opening(&mut self) -> Vec<ChatCompletionChunk> {
        if self.opening_emitted {
            return Vec::new();
        }
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

    fn open_tool(
        &mut self,
        keys: &[String],
        call_id: Option<String>,
        name: String,
    ) -> Option<ChatCompletionChunk> {
        if keys.iter().any(|key| self.tool_items.contains_key(key)) {
            return None;
        }
        let tool_index = self.next_tool_index;
        self.next_tool_index += 1;
        for key in keys {
            self.tool_items.insert(key.clone(), tool_index);
        }
        self.saw_tool_use = true;
        Some(self.chunk(
            ChunkDelta {
                tool_calls: Some(vec![ToolCallChunk {
                    index: tool_index,
                    id: call_id,
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
        ))
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

fn map_status(response: &Response) -> FinishReason {
    match response.status {
        ResponseStatus::Incomplete => {
            let max_tokens = response
                .incomplete_details
                .as_ref()
                .map(|details| details.reason == "max_output_tokens")
                .unwrap_or(false);
            if max_tokens {
                FinishReason::Length
            } else {
                FinishReason::Stop
            }
        }
        _ => FinishReason::Stop,
    }
}
