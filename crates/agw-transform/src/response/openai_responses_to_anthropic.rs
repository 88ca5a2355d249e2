use agw_protocol::anthropic::response::{CreateMessageResponse, MessageType};
use agw_protocol::anthropic::types::{ContentBlock, MessageRole, StopReason, Usage};
use agw_protocol::openai_responses::response::Response;
use agw_protocol::openai_responses::types::{OutputContent, OutputItem, ResponseStatus};

use crate::content::parse_tool_arguments;

pub fn transform_response(resp: Response, model: &str) -> CreateMessageResponse {
    let mut content = Vec::new();
    let mut has_tool_use = false;

    for item in &resp.output {
        match item {
            OutputItem::Message(message) => {
                for part in &message.content {
                    match part {
                        OutputContent::OutputText { text } => {
                            if !text.is_empty() {
                                content.push(ContentBlock::Text { text: text.clone() });
                            }
                        }
                        OutputContent::Refusal { refusal } => {
                            if !refusal.is_empty() {
                                content.push(ContentBlock::Text {
                                    text: refusal.clone(),
                                });
                            }
                        }
                    }
                }
            }
            OutputItem::FunctionCall(call) => {
                has_tool_use = true;
                content.push(ContentBlock::ToolUse {
                    id: call.call_id.clone(),
                    name: call.name.clone(),
                    input: object_of(parse_tool_arguments(&call.arguments)),
                });
            }
        }
    }

    let stop_reason = if has_tool_use {
        Some(StopReason::ToolUse)
    } else {
        Some(map_status(&resp))
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
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            })
            .unwrap_or_default(),
    }
}

fn map_status(resp: &Response) -> StopReason {
    match resp.status {
        ResponseStatus::Incomplete => {
            let max_tokens = resp
                .incomplete_details
                .as_ref()
                .map(|details| details.reason == "max_output_tokens")
                .unwrap_or(false);
            if max_tokens {
                StopReason::MaxTokens
            } else {
                StopReason::EndTurn
            }
        }
        _ => StopReason::EndTurn,
    }
}

fn object_of(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}
