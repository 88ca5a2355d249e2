use std::collections::BTreeMap;

use agw_protocol::gemini::response::{Candidate, GenerateContentResponse};
use agw_protocol::gemini::types::{
    Content, ContentRole, FinishReason, FunctionCall, Part, UsageMetadata,
};
use agw_protocol::openai_chat::stream::ChatCompletionChunk;
use agw_protocol::openai_chat::types::FinishReason as ChatFinishReason;

use crate::content::parse_tool_arguments;

/// Rewrites chat-completions chunks into Gemini stream chunks. Tool-call
/// argument fragments are buffered per upstream index and flushed as complete
/// `functionCall` parts at stream end.
#[derive(Debug)]
pub struct OpenAIChatToGeminiStream {
    tool_buffers: BTreeMap<i64, (String, String)>,
    finish_reason: Option<FinishReason>,
    usage: Option<UsageMetadata>,
    saw_tool_use: bool,
    finished: bool,
}

impl OpenAIChatToGeminiStream {
    pub fn new(_model: &str) -> Self {
        Self {
            tool_buffers: BTreeMap::new(),
            finish_reason: None,
            usage: None,
            saw_tool_use: false,
            finished: false,
        }
    }

    pub fn push(&mut self, chunk: ChatCompletionChunk) -> Vec<GenerateContentResponse> {
        if self.finished {
            return Vec::new();
        }

        if let Some(usage) = &chunk.usage {
            self.usage = Some(UsageMetadata {
                prompt_token_count: Some(usage.prompt_tokens),
                candidates_token_count: Some(usage.completion_tokens),
                total_token_count: Some(usage.total_tokens),
            });
        }

        let mut chunks = Vec::new();
        if let Some(choice) = chunk.choices.first() {
            if let Some(content) = &choice.delta.content {
                if !content.is_empty() {
                    chunks.push(text_chunk(content.clone()));
                }
            }
            for call in choice.delta.tool_calls.as_deref().unwrap_or_default() {
                self.saw_tool_use = true;
                let entry = self
                    .tool_buffers
                    .entry(call.index)
                    .or_insert_with(|| (String::new(), String::new()));
                if let Some(function) = &call.function {
                    if let Some(name) = &function.name {
                        entry.0 = name.clone();
                    }
                    if let Some(arguments) = &function.arguments {
                        entry.1.push_str(arguments);
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                if self.finish_reason.is_none() {
                    self.finish_reason = Some(map_finish_reason(reason));
                }
            }
        }

        chunks
    }

    /// Driven by the upstream `[DONE]` sentinel (or EOF).
    pub fn finish(&mut self) -> Vec<GenerateContentResponse> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut chunks = Vec::new();
        let buffers = std::mem::take(&mut self.tool_buffers);
        for (_, (name, arguments)) in buffers {
            chunks.push(GenerateContentResponse {
                candidates: vec![Candidate {
                    content: Content {
                        role: Some(ContentRole::Model),
                        parts: vec![Part {
                            function_call: Some(FunctionCall {
                                name,
                                args: Some(parse_tool_arguments(&arguments)),
                            }),
                            ..Part::default()
                        }],
                    },
                    finish_reason: None,
                    index: Some(0),
                }],
                usage_metadata: None,
                model_version: None,
            });
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

fn map_finish_reason(reason: ChatFinishReason) -> FinishReason {
    match reason {
        ChatFinishReason::Stop | ChatFinishReason::ToolCalls => FinishReason::Stop,
        ChatFinishReason::Length => FinishReason::MaxTokens,
        ChatFinishReason::ContentFilter => FinishReason::Safety,
    }
}
