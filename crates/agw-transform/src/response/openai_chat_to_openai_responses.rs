use agw_protocol::openai_chat::response::ChatCompletionResponse;
use agw_protocol::openai_chat::types::FinishReason;
use agw_protocol::openai_responses::response::{ObjectType, Response};
use agw_protocol::openai_responses::types::{
    FunctionCallItem, FunctionCallItemType, IncompleteDetails, ItemStatus, OutputContent,
    OutputItem, OutputMessage, ResponseStatus, ResponseUsage,
};

use super::synth_id;

pub fn transform_response(resp: ChatCompletionResponse, model: &str) -> Response {
    let mut output = Vec::new();
    let mut has_tool_calls = false;
    let mut finish_reason = None;

    if let Some(choice) = resp.choices.into_iter().next() {
        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                output.push(OutputItem::Message(OutputMessage {
                    id: synth_id("msg_"),
                    role: "assistant".to_string(),
                    status: ItemStatus::Completed,
                    content: vec![OutputContent::OutputText { text }],
                }));
            }
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            has_tool_calls = true;
            output.push(OutputItem::FunctionCall(FunctionCallItem {
                r#type: FunctionCallItemType::FunctionCall,
                id: None,
                call_id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
                status: Some(ItemStatus::Completed),
            }));
        }
        finish_reason = choice.finish_reason;
    }

    let (status, incomplete_details) = map_status(finish_reason, has_tool_calls);

    Response {
        id: resp.id,
        object: ObjectType::Response,
        created_at: resp.created,
        status,
        incomplete_details,
        model: model.to_string(),
        output,
        usage: resp.usage.map(|usage| ResponseUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }),
    }
}

fn map_status(
    reason: Option<FinishReason>,
    has_tool_calls: bool,
) -> (ResponseStatus, Option<IncompleteDetails>) {
    if has_tool_calls {
        return (ResponseStatus::Completed, None);
    }
    match reason {
        Some(FinishReason::Length) => (
            ResponseStatus::Incomplete,
            Some(IncompleteDetails {
                reason: "max_output_tokens".to_string(),
            }),
        ),
        _ => (ResponseStatus::Completed, None),
    }
}
