use agw_protocol::gemini::response::{Candidate, GenerateContentResponse};
use agw_protocol::gemini::types::{
    Content, ContentRole, FinishReason as GeminiFinishReason, FunctionCall, Part, UsageMetadata,
};
use agw_protocol::openai_chat::response::ChatCompletionResponse;
use agw_protocol::openai_chat::types::FinishReason;

use crate::content::parse_tool_arguments;

pub fn transform_response(resp: ChatCompletionResponse, _model: &str) -> GenerateContentResponse {
    let mut parts = Vec::new();
    let mut finish_reason = None;

    if let Some(choice) = resp.choices.into_iter().next() {
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                parts.push(Part::text(text));
            }
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            parts.push(Part {
                function_call: Some(FunctionCall {
                    name: call.function.name,
                    args: Some(parse_tool_arguments(&call.function.arguments)),
                }),
                ..Part::default()
            });
        }
        finish_reason = choice.finish_reason;
    }

    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Content {
                role: Some(ContentRole::Model),
                parts,
            },
            finish_reason: finish_reason.map(map_finish_reason),
            index: Some(0),
        }],
        usage_metadata: resp.usage.map(|usage| UsageMetadata {
            prompt_token_count: Some(usage.prompt_tokens),
            candidates_token_count: Some(usage.completion_tokens),
            total_token_count: Some(usage.total_tokens),
        }),
        model_version: None,
    }
}

fn map_finish_reason(reason: FinishReason) -> GeminiFinishReason {
    match reason {
        FinishReason::Stop | FinishReason::ToolCalls => GeminiFinishReason::Stop,
        FinishReason::Length => GeminiFinishReason::MaxTokens,
        FinishReason::ContentFilter => GeminiFinishReason::Safety,
    }
}
