use agw_protocol::anthropic::response::CreateMessageResponse;
use agw_protocol::anthropic::types::{ContentBlock, StopReason};
use agw_protocol::openai_responses::response::{ObjectType, Response};
use agw_protocol::openai_responses::types::{
    FunctionCallItem, FunctionCallItemType, IncompleteDetails, ItemStatus, OutputContent,
    OutputItem, OutputMessage, ResponseStatus, ResponseUsage,
};

use crate::content::stringify_tool_arguments;

use super::{epoch_seconds, synth_id};

pub fn transform_response(resp: CreateMessageResponse, model: &str) -> Response {
    let mut text = String::new();
    let mut function_calls = Vec::new();

    for block in &resp.content {
        match block {
            ContentBlock::Text { text: part } => text.push_str(part),
            ContentBlock::ToolUse { id, name, input } => {
                function_calls.push(OutputItem::FunctionCall(FunctionCallItem {
                    r#type: FunctionCallItemType::FunctionCall,
                    id: None,
                    call_id: id.clone(),
                    name: name.clone(),
                    arguments: stringify_tool_arguments(&serde_json::Value::Object(input.clone())),
                    status: Some(ItemStatus::Completed),
                }));
            }
            ContentBlock::Image { .. } | ContentBlock::ToolResult { .. } => {}
        }
    }

    let mut output = Vec::new();
    if !text.is_empty() {
        output.push(OutputItem::Message(OutputMessage {
            id: synth_id("msg_"),
            role: "assistant".to_string(),
            status: ItemStatus::Completed,
            content: vec![OutputContent::OutputText { text }],
        }));
    }
    let has_tool_calls = !function_calls.is_empty();
    output.extend(function_calls);

    let (status, incomplete_details) = map_status(resp.stop_reason, has_tool_calls);

    Response {
        id: resp.id,
        object: ObjectType::Response,
        created_at: epoch_seconds(),
        status,
        incomplete_details,
        model: model.to_string(),
        output,
        usage: Some(ResponseUsage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
            total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
        }),
    }
}

fn map_status(
    reason: Option<StopReason>,
    has_tool_calls: bool,
) -> (ResponseStatus, Option<IncompleteDetails>) {
    if has_tool_calls {
        return (ResponseStatus::Completed, None);
    }
    match reason {
        Some(StopReason::MaxTokens) => (
            ResponseStatus::Incomplete,
            Some(IncompleteDetails {
                reason: "max_output_tokens".to_string(),
            }),
        ),
        _ => (ResponseStatus::Completed, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn max_tokens_maps_to_incomplete_status() {
        let resp: CreateMessageResponse = serde_json::from_value(json!({
            "id": "a1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "truncated"}],
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "max_tokens",
            "usage": {"input_tokens": 4, "output_tokens": 9},
        }))
        .unwrap();

        let out = transform_response(resp, "m");
        assert_eq!(out.status, ResponseStatus::Incomplete);
        assert_eq!(
            out.incomplete_details.unwrap().reason,
            "max_output_tokens".to_string()
        );
        assert_eq!(out.usage.unwrap().total_tokens, 13);
    }
}
