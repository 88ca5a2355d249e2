use agw_protocol::gemini::response::GenerateContentResponse;
use agw_protocol::gemini::types::FinishReason;
use agw_protocol::openai_responses::response::{ObjectType, Response};
use agw_protocol::openai_responses::types::{
    FunctionCallItem, FunctionCallItemType, IncompleteDetails, ItemStatus, OutputContent,
    OutputItem, OutputMessage, ResponseStatus, ResponseUsage,
};

use crate::content::stringify_tool_arguments;

use super::{epoch_seconds, synth_id};

pub fn transform_response(resp: GenerateContentResponse, model: &str) -> Response {
    let mut text = String::new();
    let mut function_calls = Vec::new();
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
                function_calls.push(OutputItem::FunctionCall(FunctionCallItem {
                    r#type: FunctionCallItemType::FunctionCall,
                    id: None,
                    call_id: format!("call_{}", function_calls.len()),
                    name: call.name,
                    arguments,
                    status: Some(ItemStatus::Completed),
                }));
            }
        }
        finish_reason = candidate.finish_reason;
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

    let incomplete = !has_tool_calls && finish_reason == Some(FinishReason::MaxTokens);
    let (status, incomplete_details) = if incomplete {
        (
            ResponseStatus::Incomplete,
            Some(IncompleteDetails {
                reason: "max_output_tokens".to_string(),
            }),
        )
    } else {
        (ResponseStatus::Completed, None)
    };

    Response {
        id: synth_id("resp_"),
        object: ObjectType::Response,
        created_at: epoch_seconds(),
        status,
        incomplete_details,
        model: model.to_string(),
        output,
        usage: resp.usage_metadata.map(|usage| {
            let input = usage.prompt_token_count.unwrap_or(0);
            let output = usage.candidates_token_count.unwrap_or(0);
            ResponseUsage {
                input_tokens: input,
                output_tokens: output,
                total_tokens: usage.total_token_count.unwrap_or(input + output),
            }
        }),
    }
}
