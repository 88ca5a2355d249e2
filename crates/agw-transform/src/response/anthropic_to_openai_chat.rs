use agw_protocol::anthropic::response::CreateMessageResponse;
use agw_protocol::anthropic::types::{ContentBlock, StopReason};
use agw_protocol::openai_chat::response::{
    AssistantRole, ChatCompletionResponse, Choice, ObjectType, ResponseMessage,
};
use agw_protocol::openai_chat::types::{
    FinishReason, FunctionCall, ToolCall, ToolCallType, Usage,
};

use crate::content::stringify_tool_arguments;

use super::epoch_seconds;

pub fn transform_response(resp: CreateMessageResponse, model: &str) -> ChatCompletionResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in &resp.content {
        match block {
            ContentBlock::Text { text: part } => text.push_str(part),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall {
                    id: id.clone(),
                    r#type: ToolCallType::Function,
                    function: FunctionCall {
                        name: name.clone(),
                        arguments: stringify_tool_arguments(&serde_json::Value::Object(
                            input.clone(),
                        )),
                    },
                });
            }
            ContentBlock::Image { .. } | ContentBlock::ToolResult { .. } => {}
        }
    }

    let finish_reason = if tool_calls.is_empty() {
        resp.stop_reason.map(map_stop_reason)
    } else {
        Some(FinishReason::ToolCalls)
    };

    ChatCompletionResponse {
        id: resp.id,
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
        usage: Some(Usage {
            prompt_tokens: resp.usage.input_tokens,
            completion_tokens: resp.usage.output_tokens,
            total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
        }),
    }
}

fn map_stop_reason(reason: StopReason) -> FinishReason {
    match reason {
        StopReason::EndTurn | StopReason::StopSequence => FinishReason::Stop,
        StopReason::MaxTokens => FinishReason::Length,
        StopReason::ToolUse => FinishReason::ToolCalls,
        StopReason::Refusal => FinishReason::ContentFilter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_use_maps_to_tool_calls_and_overrides_finish() {
        let resp: CreateMessageResponse = serde_json::from_value(json!({
            "id": "a1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "hello"},
                {"type": "tool_use", "id": "t1", "name": "calc", "input": {"x": 2}},
            ],
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 2, "output_tokens": 3},
        }))
        .unwrap();

        let out = transform_response(resp, "my-model");
        assert_eq!(out.model, "my-model");
        let choice = &out.choices[0];
        assert_eq!(choice.message.content.as_deref(), Some("hello"));
        let calls = choice.message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "t1");
        assert_eq!(calls[0].function.name, "calc");
        assert_eq!(calls[0].function.arguments, "{\"x\":2}");
        assert_eq!(choice.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(out.usage.unwrap().total_tokens, 5);
    }

    #[test]
    fn adjacent_text_blocks_concatenate() {
        let resp: CreateMessageResponse = serde_json::from_value(json!({
            "id": "a2",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "hel"},
                {"type": "text", "text": "lo"},
            ],
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1, "output_tokens": 1},
        }))
        .unwrap();

        let out = transform_response(resp, "m");
        assert_eq!(out.choices[0].message.content.as_deref(), Some("hello"));
        assert_eq!(out.choices[0].finish_reason, Some(FinishReason::Stop));
    }
}
