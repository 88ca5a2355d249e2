use agw_protocol::gemini::response::GenerateContentResponse;
use agw_protocol::gemini::types::{FinishReason as GeminiFinishReason, FunctionCall};
use agw_protocol::openai_chat::stream::{
    ChatCompletionChunk, ChunkChoice, ChunkDelta, ChunkObjectType, FunctionCallChunk,
    ToolCallChunk,
};
use agw_protocol::openai_chat::types::{FinishReason, ToolCallType, Usage};

use crate::content::stringify_tool_arguments;

use super::{epoch_seconds, synth_id};

/// Rewrites Gemini stream chunks into chat-completions chunks.
#[derive(Debug)]
pub struct GeminiToOpenAIChatStream {
    id: String,
    model: String,
    created: i64,
    opening_emitted: bool,
    next_tool_index: i64,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    saw_tool_use: bool,
    finished: bool,
}

impl GeminiToOpenAIChatStream {
    pub fn new(model: &str) -> Self {
        Self {
            id: synth_id("chatcmpl-"),
            model: model.to_string(),
            created: epoch_seconds(),
            opening_emitted: false,
            next_tool_index: 0,
            finish_reason: None,
            usage: None,
            saw_tool_use: false,
            finished: false,
        }
    }

    pub fn push(&mut self, chunk: GenerateContentResponse) -> Vec<ChatCompletionChunk> {
        if self.finished {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        if !self.opening_emitted {
            self.opening_emitted = true;
            chunks.push(self.chunk(
                ChunkDelta {
                    role: Some("assistant".to_string()),
                    ..ChunkDelta::default()
                },
                None,
                None,
            ));
        }

        if let Some(usage) = &chunk.usage_metadata {
            let prompt = usage.prompt_token_count.unwrap_or(0);
            let completion = usage.candidates_token_count.unwrap_or(0);
            self.usage = Some(Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: usage.total_token_count.unwrap_or(prompt + completion),
            });
        }

        let mut finish_reason = None;
        if let Some(candidate) = chunk.candidates.into_iter().next() {
            for part in candidate.content.parts {
                if let Some(text) = part.text {
                    if !text.is_empty() {
                        chunks.push(self.chunk(
                            ChunkDelta {
                                content: Some(text),
                                ..ChunkDelta::default()
                            },
                            None,
                            None,
                        ));
                    }
                } else if let Some(call) = part.function_call {
                    chunks.extend(self.emit_tool_call(call));
                }
            }
            finish_reason = candidate.finish_reason;
        }

        if let Some(reason) = finish_reason {
            if self.finish_reason.is_none() {
                self.finish_reason = Some(map_finish_reason(reason));
            }
            chunks.extend(self.emit_terminal());
        }

        chunks
    }

    pub fn finish(&mut self) -> Vec<ChatCompletionChunk> {
        if self.finished || !self.opening_emitted {
            self.finished = true;
            return Vec::new();
        }
        self.emit_terminal()
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    fn emit_tool_call(&mut self, call: FunctionCall) -> Vec<ChatCompletionChunk> {
        let tool_index = self.next_tool_index;
        self.next_tool_index += 1;
        self.saw_tool_use = true;
        let args = call.args.unwrap_or_else(|| serde_json::json!({}));

        vec![
            self.chunk(
                ChunkDelta {
                    tool_calls: Some(vec![ToolCallChunk {
                        index: tool_index,
                        id: Some(format!("call_{tool_index}")),
                        r#type: Some(ToolCallType::Function),
                        function: Some(FunctionCallChunk {
                            name: Some(call.name),
                            arguments: Some(String::new()),
                        }),
                    }]),
                    ..ChunkDelta::default()
                },
                None,
                None,
            ),
            self.chunk(
                ChunkDelta {
                    tool_calls: Some(vec![ToolCallChunk {
                        index: tool_index,
                        id: None,
                        r#type: None,
                        function: Some(FunctionCallChunk {
                            name: None,
                            arguments: Some(stringify_tool_arguments(&args)),
                        }),
                    }]),
                    ..ChunkDelta::default()
                },
                None,
                None,
            ),
        ]
    }

    fn emit_terminal(&mut self) -> Vec<ChatCompletionChunk> {
        self.finished = true;
        let finish_reason = if self.saw_tool_use {
            FinishReason::ToolCalls
        } else {
            self.finish_reason.unwrap_or(FinishReason::Stop)
        };
        vec![self.chunk(ChunkDelta::default(), Some(finish_reason), self.usage)]
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

fn map_finish_reason(reason: GeminiFinishReason) -> FinishReason {
    match reason {
        GeminiFinishReason::Stop
        | GeminiFinishReason::Recitation
        | GeminiFinishReason::Other => FinishReason::Stop,
        GeminiFinishReason::MaxTokens => FinishReason::Length,
        GeminiFinishReason::Safety => FinishReason::ContentFilter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_deltas_preserve_bytes_in_order() {
        let mut machine = GeminiToOpenAIChatStream::new("gpt-proxy");
        let first = machine.push(serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "he"}], "role": "model"}}],
        })).unwrap());
        let second = machine.push(serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "llo"}], "role": "model"},
                            "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 2, "candidatesTokenCount": 4},
        })).unwrap());

        let mut text = String::new();
        for chunk in first.iter().chain(second.iter()) {
            if let Some(content) = &chunk.choices[0].delta.content {
                text.push_str(content);
            }
        }
        assert_eq!(text, "hello");

        let last = second.last().unwrap();
        assert_eq!(last.choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(last.usage.unwrap().total_tokens, 6);
        assert!(machine.finished());
    }
}
