use agw_protocol::anthropic::response::{CreateMessageResponse, MessageType};
use agw_protocol::anthropic::types::{ContentBlock, MessageRole, StopReason, Usage};
use agw_protocol::openai_chat::response::ChatCompletionResponse;
use agw_protocol::openai_chat::types::FinishReason;

use crate::content::parse_tool_arguments;

pub fn transform_response(resp: ChatCompletionResponse, model: &str) -> CreateMessageResponse {
    let mut content = Vec::new();
    let mut has_tool_use = false;
    let mut finish_reason = None;

    if let Some(choice) = resp.choices.into_iter().next() {
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(ContentBlock::Text { text });
            }
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            has_tool_use = true;
            content.push(ContentBlock::ToolUse {
                id: call.id,
                name: call.function.name,
                input: object_of(parse_tool_arguments(&call.function.arguments)),
            });
        }
        finish_reason = choice.finish_reason;
    }

    let stop_reason = if has_tool_use {
        Some(StopReason::ToolUse)
    } else {
        finish_reason.map(map_finish_reason)
    };

    CreateMessageResponse {
        id: resp.id,
        r#type: MessageType::Message,
        role: MessageRole::Assistant,
        content,
        model: model.to_string(),
        stop_reason,
        stop_sequence: None,
        usage: resp
            .usage
            .map(|usage| Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            })
            .unwrap_or_default(),
    }
}

fn map_finish_reason(reason: FinishReason) -> StopReason {
    match reason {
        FinishReason::Stop => StopReason::EndTurn,
        FinishReason::Length => StopReason::MaxTokens,
        FinishReason::ToolCalls => StopReason::ToolUse,
        FinishReason::ContentFilter => StopReason::Refusal,
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
    fn malformed_tool_arguments_degrade_to_empty_input() {
        let resp: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "f", "arguments": "{broken"},
                    }],
                },
                "finish_reason": "stop",
            }],
        }))
        .unwrap();

        let out = transform_response(resp, "claude-x");
        match &out.content[0] {
            ContentBlock::ToolUse { input, .. } => assert!(input.is_empty()),
            other => panic!("unexpected block: {other:?}"),
        }
        assert_eq!(out.stop_reason, Some(StopReason::ToolUse));
    }
}
