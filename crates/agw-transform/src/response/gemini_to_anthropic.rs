use agw_protocol::anthropic::response::{CreateMessageResponse, MessageType};
use agw_protocol::anthropic::types::{ContentBlock, MessageRole, StopReason, Usage};
use agw_protocol::gemini::response::GenerateContentResponse;
use agw_protocol::gemini::types::FinishReason;

use super::synth_id;

pub fn transform_response(resp: GenerateContentResponse, model: &str) -> CreateMessageResponse {
    let mut content = Vec::new();
    let mut has_tool_use = false;
    let mut finish_reason = None;
    let mut call_index = 0usize;

    if let Some(candidate) = resp.candidates.into_iter().next() {
        for part in candidate.content.parts {
            if let Some(text) = part.text {
                if !text.is_empty() {
                    content.push(ContentBlock::Text { text });
                }
            } else if let Some(call) = part.function_call {
                has_tool_use = true;
                content.push(ContentBlock::ToolUse {
                    id: format!("call_{call_index}"),
                    name: call.name,
                    input: object_of(call.args.unwrap_or(serde_json::Value::Null)),
                });
                call_index += 1;
            }
        }
        finish_reason = candidate.finish_reason;
    }

    let stop_reason = if has_tool_use {
        Some(StopReason::ToolUse)
    } else {
        finish_reason.map(map_finish_reason)
    };

    let usage = resp.usage_metadata.unwrap_or_default();

    CreateMessageResponse {
        id: synth_id("msg_"),
        r#type: MessageType::Message,
        role: MessageRole::Assistant,
        content,
        model: model.to_string(),
        stop_reason,
        stop_sequence: None,
        usage: Usage {
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
        },
    }
}

fn map_finish_reason(reason: FinishReason) -> StopReason {
    match reason {
        FinishReason::Stop | FinishReason::Recitation | FinishReason::Other => StopReason::EndTurn,
        FinishReason::MaxTokens => StopReason::MaxTokens,
        FinishReason::Safety => StopReason::Refusal,
    }
}

fn object_of(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn max_tokens_finish_survives_translation() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"text": "cut"}], "role": "model"},
                "finishReason": "MAX_TOKENS",
            }],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 7},
        }))
        .unwrap();

        let out = transform_response(resp, "claude-x");
        assert_eq!(out.stop_reason, Some(StopReason::MaxTokens));
        assert_eq!(out.usage.input_tokens, 3);
        assert_eq!(out.usage.output_tokens, 7);
    }
}
