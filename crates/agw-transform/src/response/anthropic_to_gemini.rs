use agw_protocol::anthropic::response::CreateMessageResponse;
use agw_protocol::anthropic::types::{ContentBlock, StopReason};
use agw_protocol::gemini::response::{Candidate, GenerateContentResponse};
use agw_protocol::gemini::types::{
    Content, ContentRole, FinishReason, FunctionCall, Part, UsageMetadata,
};

pub fn transform_response(resp: CreateMessageResponse, _model: &str) -> GenerateContentResponse {
    let mut parts = Vec::new();
    for block in &resp.content {
        match block {
            ContentBlock::Text { text } => {
                if !text.is_empty() {
                    parts.push(Part::text(text.clone()));
                }
            }
            ContentBlock::ToolUse { name, input, .. } => {
                parts.push(Part {
                    function_call: Some(FunctionCall {
                        name: name.clone(),
                        args: Some(serde_json::Value::Object(input.clone())),
                    }),
                    ..Part::default()
                });
            }
            ContentBlock::Image { .. } | ContentBlock::ToolResult { .. } => {}
        }
    }

    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Content {
                role: Some(ContentRole::Model),
                parts,
            },
            finish_reason: resp.stop_reason.map(map_stop_reason),
            index: Some(0),
        }],
        usage_metadata: Some(UsageMetadata {
            prompt_token_count: Some(resp.usage.input_tokens),
            candidates_token_count: Some(resp.usage.output_tokens),
            total_token_count: Some(resp.usage.input_tokens + resp.usage.output_tokens),
        }),
        model_version: None,
    }
}

fn map_stop_reason(reason: StopReason) -> FinishReason {
    match reason {
        StopReason::EndTurn | StopReason::StopSequence | StopReason::ToolUse => FinishReason::Stop,
        StopReason::MaxTokens => FinishReason::MaxTokens,
        StopReason::Refusal => FinishReason::Safety,
    }
}
