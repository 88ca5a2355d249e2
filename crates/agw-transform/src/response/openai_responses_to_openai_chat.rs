use agw_protocol::openai_chat::response::{
    AssistantRole, ChatCompletionResponse, Choice, ObjectType, ResponseMessage,
};
use agw_protocol::openai_chat::types::{
    FinishReason, FunctionCall, ToolCall, ToolCallType, Usage,
};
use agw_protocol::openai_responses::response::Response;
use agw_protocol::openai_responses::types::{OutputContent, OutputItem, ResponseStatus};

pub fn transform_response(resp: Response, model: &str) -> ChatCompletionResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for item in &resp.output {
        match item {
            OutputItem::Message(message) => {
                for part in &message.content {
                    match part {
                        OutputContent::OutputText { text: part } => text.push_str(part),
                        OutputContent::Refusal { refusal } => text.push_str(refusal),
                    }
                }
            }
            OutputItem::FunctionCall(call) => {
                tool_calls.push(ToolCall {
                    id: call.call_id.clone(),
                    r#type: ToolCallType::Function,
                    function: FunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                });
            }
        }
    }

    let finish_reason = if tool_calls.is_empty() {
        Some(map_status(&resp))
    } else {
        Some(FinishReason::ToolCalls)
    };

    ChatCompletionResponse {
        id: resp.id,
        object: ObjectType::ChatCompletion,
        created: resp.created_at,
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
        usage: resp.usage.map(|usage| Usage {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
        }),
    }
}

fn map_status(resp: &Response) -> FinishReason {
    match resp.status {
        ResponseStatus::Incomplete => {
            let max_tokens = resp
                .incomplete_details
                .as_ref()
                .map(|details| details.reason == "max_output_tokens")
                .unwrap_or(false);
            if max_tokens {
                FinishReason::Length
            } else {
                FinishReason::Stop
            }
        }
        _ => FinishReason::Stop,
    }
}
