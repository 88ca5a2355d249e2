use agw_protocol::gemini::response::GenerateContentResponse;
use agw_protocol::gemini::types::FinishReason as GeminiFinishReason;
use agw_protocol::openai_chat::response::{
    AssistantRole, ChatCompletionResponse, Choice, ObjectType, ResponseMessage,
};
use agw_protocol::openai_chat::types::{
    FinishReason, FunctionCall, ToolCall, ToolCallType, Usage,
};

use crate::content::stringify_tool_arguments;

use super::{epoch_seconds, synth_id};

pub fn transform_response(resp: GenerateContentResponse, model: &str) -> ChatCompletionResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    let mut finish_reason = None;

    if let Some(candidate) = resp.candidates.into_iter().next() {
        for part in candidate.content.parts {
            if let Some(part_text) = part.text {
                text.push_str(&part_text);
            } else if let Some(call) = part.function_call {
                let arguments = call
                    .args
                    .as_ref()
                    .map(stringify_tool_arguments)
                    .unwrap_or_else(|| "{}".to_string());
                tool_calls.push(ToolCall {
                    id: format!("call_{}", tool_calls.len()),
                    r#type: ToolCallType::Function,
                    function: FunctionCall {
                        name: call.name,
                        arguments,
                    },
                });
            }
        }
        finish_reason = candidate.finish_reason;
    }

    let finish_reason = if tool_calls.is_empty() {
        finish_reason.map(map_finish_reason)
    } else {
        Some(FinishReason::ToolCalls)
    };

    ChatCompletionResponse {
        id: synth_id("chatcmpl-"),
        object: ObjectType::ChatCompletion,
        created: epoch_seconds(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: AssistantRole::Assistant,
                content: (!text.is_empty()).then_some(text),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason,
        }],
        usage: resp.usage_metadata.map(|usage| {
            let prompt = usage.prompt_token_count.unwrap_or(0);
            let completion = usage.candidates_token_count.unwrap_or(0);
            Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: usage.total_token_count.unwrap_or(prompt + completion),
            }
        }),
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
