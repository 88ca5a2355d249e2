use serde_json::{json, Map, Value as JsonValue};

use agw_protocol::anthropic::request::CreateMessageRequest;
use agw_protocol::anthropic::types as anthropic;
use agw_protocol::gemini::request::GenerateContentRequest;
use agw_protocol::gemini::types as gemini;
use agw_protocol::openai_chat::request::ChatCompletionRequest;
use agw_protocol::openai_chat::types as openai_chat;
use agw_protocol::openai_responses::request::CreateResponseRequest;
use agw_protocol::openai_responses::types as openai_responses;

use crate::content::{
    format_data_url, stringify_tool_arguments, ChatRequest, ContentBlock, ImageData, Message, Role,
    ToolChoice,
};

/// Default `max_tokens` supplied when the source protocol carries none; the
/// target wire requires the field.
const ANTHROPIC_DEFAULT_MAX_TOKENS: i32 = 4096;

pub fn raise_anthropic(req: ChatRequest) -> CreateMessageRequest {
    let system = if req.system.is_empty() {
        None
    } else {
        Some(anthropic::SystemPrompt::Text(req.system.join("\n")))
    };

    let mut messages = Vec::new();
    for message in &req.messages {
        let role = match message.role {
            Role::Assistant => anthropic::MessageRole::Assistant,
            Role::User | Role::Tool => anthropic::MessageRole::User,
        };
        let blocks: Vec<anthropic::ContentBlock> = message
            .content
            .iter()
            .filter_map(raise_anthropic_block)
            .collect();
        if blocks.is_empty() {
            continue;
        }
        let content = match blocks.as_slice() {
            [anthropic::ContentBlock::Text { text }] => {
                anthropic::MessageContent::Text(text.clone())
            }
            _ => anthropic::MessageContent::Blocks(blocks),
        };
        messages.push(anthropic::MessageParam { role, content });
    }

    let tools = if req.tools.is_empty() {
        None
    } else {
        Some(
            req.tools
                .iter()
                .map(|tool| anthropic::Tool {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: Some(tool.schema_or_default()),
                })
                .collect(),
        )
    };

    CreateMessageRequest {
        model: req.model,
        messages,
        max_tokens: req
            .params
            .max_output_tokens
            .filter(|value| *value > 0)
            .unwrap_or(ANTHROPIC_DEFAULT_MAX_TOKENS),
        system,
        metadata: req.params.user.map(|user| anthropic::Metadata {
            user_id: Some(user),
        }),
        stop_sequences: non_empty(req.params.stop_sequences),
        stream: req.stream.then_some(true),
        temperature: req.params.temperature.map(|value| value.clamp(0.0, 1.0)),
        top_k: req.params.top_k,
        top_p: req.params.top_p,
        tool_choice: req.tool_choice.map(|choice| match choice {
            ToolChoice::Auto => anthropic::ToolChoice::Auto,
            ToolChoice::Required => anthropic::ToolChoice::Any,
            ToolChoice::None => anthropic::ToolChoice::None,
            ToolChoice::Specific(name) => anthropic::ToolChoice::Tool { name },
        }),
        tools,
    }
}

fn raise_anthropic_block(block: &ContentBlock) -> Option<anthropic::ContentBlock> {
    match block {
        ContentBlock::Text { text } => {
            (!text.is_empty()).then(|| anthropic::ContentBlock::Text { text: text.clone() })
        }
        ContentBlock::Image { media_type, data } => Some(anthropic::ContentBlock::Image {
            source: match data {
                ImageData::Base64(data) => anthropic::ImageSource::Base64 {
                    media_type: media_type
                        .clone()
                        .unwrap_or_else(|| "image/png".to_string()),
                    data: data.clone(),
                },
                ImageData::Url(url) => anthropic::ImageSource::Url { url: url.clone() },
            },
        }),
        ContentBlock::ToolUse { id, name, input } => Some(anthropic::ContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: as_object(input),
        }),
        ContentBlock::ToolResult {
            id,
            content,
            is_error,
        } => Some(anthropic::ContentBlock::ToolResult {
            tool_use_id: id.clone(),
            content: Some(anthropic::ToolResultContent::Text(content.clone())),
            is_error: is_error.then_some(true),
        }),
    }
}

pub fn raise_openai_chat(req: ChatRequest) -> ChatCompletionRequest {
    let mut messages = Vec::new();
    if !req.system.is_empty() {
        messages.push(openai_chat::RequestMessage::System(
            openai_chat::SystemMessage {
                content: openai_chat::TextContent::Text(req.system.join("\n")),
                name: None,
            },
        ));
    }

    for message in &req.messages {
        match message.role {
            Role::User => {
                if let Some(content) = raise_openai_user_content(&message.content) {
                    messages.push(openai_chat::RequestMessage::User(openai_chat::UserMessage {
                        content,
                        name: None,
                    }));
                }
            }
            Role::Assistant => {
                let mut text = String::new();
                let mut tool_calls = Vec::new();
                for block in &message.content {
                    match block {
                        ContentBlock::Text { text: part } => text.push_str(part),
                        ContentBlock::ToolUse { id, name, input } => {
                            tool_calls.push(openai_chat::ToolCall {
                                id: id.clone(),
                                r#type: openai_chat::ToolCallType::Function,
                                function: openai_chat::FunctionCall {
                                    name: name.clone(),
                                    arguments: stringify_tool_arguments(input),
                                },
                            });
                        }
                        _ => {}
                    }
                }
                if text.is_empty() && tool_calls.is_empty() {
                    continue;
                }
                messages.push(openai_chat::RequestMessage::Assistant(
                    openai_chat::AssistantMessage {
                        content: (!text.is_empty())
                            .then(|| openai_chat::TextContent::Text(text)),
                        tool_calls: non_empty(tool_calls),
                        name: None,
                    },
                ));
            }
            // One tool message per result; this wire links by tool_call_id.
            Role::Tool => {
                for block in &message.content {
                    if let ContentBlock::ToolResult { id, content, .. } = block {
                        messages.push(openai_chat::RequestMessage::Tool(
                            openai_chat::ToolMessage {
                                content: openai_chat::TextContent::Text(content.clone()),
                                tool_call_id: id.clone(),
                            },
                        ));
                    }
                }
            }
        }
    }

    let tools = non_empty(
        req.tools
            .iter()
            .map(|tool| openai_chat::ToolDefinition {
                r#type: openai_chat::ToolCallType::Function,
                function: openai_chat::FunctionDefinition {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: Some(tool.schema_or_default()),
                },
            })
            .collect(),
    );

    ChatCompletionRequest {
        model: req.model,
        messages,
        max_tokens: req.params.max_output_tokens,
        max_completion_tokens: None,
        temperature: req.params.temperature,
        top_p: req.params.top_p,
        n: None,
        stop: non_empty(req.params.stop_sequences).map(openai_chat::StopSequences::Many),
        stream: req.stream.then_some(true),
        stream_options: None,
        seed: req.params.seed,
        user: req.params.user,
        response_format: req
            .params
            .response_format
            .map(|r#type| openai_chat::ResponseFormat { r#type }),
        tools,
        tool_choice: req.tool_choice.map(|choice| match choice {
            ToolChoice::Auto => {
                openai_chat::ToolChoice::Mode(openai_chat::ToolChoiceMode::Auto)
            }
            ToolChoice::Required => {
                openai_chat::ToolChoice::Mode(openai_chat::ToolChoiceMode::Required)
            }
            ToolChoice::None => openai_chat::ToolChoice::Mode(openai_chat::ToolChoiceMode::None),
            ToolChoice::Specific(name) => {
                openai_chat::ToolChoice::Named(openai_chat::NamedToolChoice {
                    r#type: openai_chat::ToolCallType::Function,
                    function: openai_chat::NamedFunction { name },
                })
            }
        }),
        parallel_tool_calls: None,
    }
}

fn raise_openai_user_content(blocks: &[ContentBlock]) -> Option<openai_chat::UserContent> {
    let mut parts = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text } => {
                parts.push(openai_chat::UserContentPart::Text { text: text.clone() });
            }
            ContentBlock::Image { media_type, data } => {
                let url = match data {
                    ImageData::Base64(data) => format_data_url(
                        media_type.as_deref().unwrap_or("image/png"),
                        data,
                    ),
                    ImageData::Url(url) => url.clone(),
                };
                parts.push(openai_chat::UserContentPart::ImageUrl {
                    image_url: openai_chat::ImageUrl { url, detail: None },
                });
            }
            _ => {}
        }
    }

    match parts.as_slice() {
        [] => None,
        [openai_chat::UserContentPart::Text { text }] => {
            Some(openai_chat::UserContent::Text(text.clone()))
        }
        _ => Some(openai_chat::UserContent::Parts(parts)),
    }
}

pub fn raise_openai_responses(req: ChatRequest) -> CreateResponseRequest {
    let mut items = Vec::new();
    for message in &req.messages {
        match message.role {
            Role::User | Role::Assistant => {
                let role = if message.role == Role::Assistant {
                    "assistant"
                } else {
                    "user"
                };
                let mut parts = Vec::new();
                for block in &message.content {
                    match block {
                        ContentBlock::Text { text } => {
                            parts.push(if message.role == Role::Assistant {
                                openai_responses::InputContentPart::OutputText {
                                    text: text.clone(),
                                }
                            } else {
                                openai_responses::InputContentPart::InputText {
                                    text: text.clone(),
                                }
                            });
                        }
                        ContentBlock::Image { media_type, data } => {
                            let url = match data {
                                ImageData::Base64(data) => format_data_url(
                                    media_type.as_deref().unwrap_or("image/png"),
                                    data,
                                ),
                                ImageData::Url(url) => url.clone(),
                            };
                            parts.push(openai_responses::InputContentPart::InputImage {
                                image_url: openai_responses::ImageUrlParam::Object { url },
                            });
                        }
                        ContentBlock::ToolUse { id, name, input } => {
                            items.push(openai_responses::InputItem::FunctionCall(
                                openai_responses::FunctionCallItem {
                                    r#type: openai_responses::FunctionCallItemType::FunctionCall,
                                    id: None,
                                    call_id: id.clone(),
                                    name: name.clone(),
                                    arguments: stringify_tool_arguments(input),
                                    status: None,
                                },
                            ));
                        }
                        ContentBlock::ToolResult { .. } => {}
                    }
                }
                if !parts.is_empty() {
                    items.push(openai_responses::InputItem::Message(
                        openai_responses::InputMessage {
                            r#type: openai_responses::MessageItemType::Message,
                            role: role.to_string(),
                            content: openai_responses::InputContent::Parts(parts),
                        },
                    ));
                }
            }
            Role::Tool => {
                for block in &message.content {
                    if let ContentBlock::ToolResult { id, content, .. } = block {
                        items.push(openai_responses::InputItem::FunctionCallOutput(
                            openai_responses::FunctionCallOutputItem {
                                r#type:
                                    openai_responses::FunctionCallOutputItemType::FunctionCallOutput,
                                call_id: id.clone(),
                                output: content.clone(),
                            },
                        ));
                    }
                }
            }
        }
    }

    CreateResponseRequest {
        model: req.model,
        input: (!items.is_empty()).then_some(openai_responses::InputParam::Items(items)),
        instructions: (!req.system.is_empty()).then(|| req.system.join("\n")),
        max_output_tokens: req.params.max_output_tokens,
        temperature: req.params.temperature,
        top_p: req.params.top_p,
        stream: req.stream.then_some(true),
        user: req.params.user,
        tools: non_empty(
            req.tools
                .iter()
                .map(|tool| openai_responses::ToolDefinition {
                    r#type: openai_responses::FunctionToolType::Function,
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: Some(tool.schema_or_default()),
                })
                .collect(),
        ),
        tool_choice: req.tool_choice.map(|choice| match choice {
            ToolChoice::Auto => {
                openai_responses::ToolChoice::Mode(openai_responses::ToolChoiceMode::Auto)
            }
            ToolChoice::Required => {
                openai_responses::ToolChoice::Mode(openai_responses::ToolChoiceMode::Required)
            }
            ToolChoice::None => {
                openai_responses::ToolChoice::Mode(openai_responses::ToolChoiceMode::None)
            }
            ToolChoice::Specific(name) => {
                openai_responses::ToolChoice::Named(openai_responses::NamedToolChoice {
                    r#type: openai_responses::FunctionToolType::Function,
                    name,
                })
            }
        }),
        parallel_tool_calls: None,
    }
}

/// The model name is not part of this body; it travels in the request path.
pub fn raise_gemini(req: ChatRequest) -> GenerateContentRequest {
    let system_instruction = (!req.system.is_empty()).then(|| gemini::Content {
        role: None,
        parts: vec![gemini::Part::text(req.system.join("\n"))],
    });

    // functionResponse parts carry the function name, not an id; the names
    // are recovered from the matching tool uses earlier in the conversation.
    let mut call_names: Vec<(String, String)> = Vec::new();
    let mut contents = Vec::new();
    for message in &req.messages {
        let (role, parts) = match message.role {
            Role::User => (
                gemini::ContentRole::User,
                raise_gemini_parts(&message.content, &mut call_names),
            ),
            Role::Assistant => (
                gemini::ContentRole::Model,
                raise_gemini_parts(&message.content, &mut call_names),
            ),
            Role::Tool => (
                gemini::ContentRole::User,
                raise_gemini_results(&message.content, &call_names),
            ),
        };
        if parts.is_empty() {
            continue;
        }
        contents.push(gemini::Content {
            role: Some(role),
            parts,
        });
    }

    let params = &req.params;
    let has_config = params.temperature.is_some()
        || params.top_p.is_some()
        || params.top_k.is_some()
        || params.max_output_tokens.is_some()
        || params.seed.is_some()
        || !params.stop_sequences.is_empty();
    let generation_config = has_config.then(|| gemini::GenerationConfig {
        temperature: params.temperature,
        top_p: params.top_p,
        top_k: params.top_k,
        max_output_tokens: params.max_output_tokens,
        candidate_count: None,
        stop_sequences: non_empty(params.stop_sequences.clone()),
        seed: params.seed,
    });

    let tools = (!req.tools.is_empty()).then(|| {
        vec![gemini::Tool {
            function_declarations: req
                .tools
                .iter()
                .map(|tool| gemini::FunctionDeclaration {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: Some(tool.schema_or_default()),
                })
                .collect(),
        }]
    });

    let tool_config = req.tool_choice.map(|choice| {
        let (mode, allowed) = match choice {
            ToolChoice::Auto => (gemini::FunctionCallingMode::Auto, None),
            ToolChoice::Required => (gemini::FunctionCallingMode::Any, None),
            ToolChoice::None => (gemini::FunctionCallingMode::None, None),
            ToolChoice::Specific(name) => (gemini::FunctionCallingMode::Any, Some(vec![name])),
        };
        gemini::ToolConfig {
            function_calling_config: gemini::FunctionCallingConfig {
                mode,
                allowed_function_names: allowed,
            },
        }
    });

    GenerateContentRequest {
        contents,
        system_instruction,
        generation_config,
        tools,
        tool_config,
    }
}

fn raise_gemini_parts(
    blocks: &[ContentBlock],
    call_names: &mut Vec<(String, String)>,
) -> Vec<gemini::Part> {
    let mut parts = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text } => {
                if !text.is_empty() {
                    parts.push(gemini::Part::text(text.clone()));
                }
            }
            ContentBlock::Image { media_type, data } => {
                let blob = match data {
                    ImageData::Base64(data) => gemini::Blob {
                        mime_type: media_type
                            .clone()
                            .unwrap_or_else(|| "image/png".to_string()),
                        data: data.clone(),
                    },
                    // No URL sources on this wire; carry a reference as text.
                    ImageData::Url(url) => {
                        parts.push(gemini::Part::text(format!("[image: {url}]")));
                        continue;
                    }
                };
                parts.push(gemini::Part {
                    inline_data: Some(blob),
                    ..gemini::Part::default()
                });
            }
            // Tool-call ids are omitted on this wire.
            ContentBlock::ToolUse { id, name, input } => {
                call_names.push((id.clone(), name.clone()));
                parts.push(gemini::Part {
                    function_call: Some(gemini::FunctionCall {
                        name: name.clone(),
                        args: Some(as_object_value(input)),
                    }),
                    ..gemini::Part::default()
                });
            }
            ContentBlock::ToolResult { .. } => {}
        }
    }
    parts
}

fn raise_gemini_results(
    blocks: &[ContentBlock],
    call_names: &[(String, String)],
) -> Vec<gemini::Part> {
    let mut parts = Vec::new();
    for block in blocks {
        if let ContentBlock::ToolResult { id, content, .. } = block {
            let name = call_names
                .iter()
                .find(|(call_id, _)| call_id == id)
                .map(|(_, name)| name.clone())
                .unwrap_or_else(|| id.clone());
            parts.push(gemini::Part {
                function_response: Some(gemini::FunctionResponse {
                    name,
                    response: json!({"result": content}),
                }),
                ..gemini::Part::default()
            });
        }
    }
    parts
}

fn as_object(input: &JsonValue) -> Map<String, JsonValue> {
    match input {
        JsonValue::Object(map) => map.clone(),
        _ => Map::new(),
    }
}

fn as_object_value(input: &JsonValue) -> JsonValue {
    match input {
        JsonValue::Object(_) => input.clone(),
        _ => json!({}),
    }
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    (!values.is_empty()).then_some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::SamplingParams;

    fn base_request() -> ChatRequest {
        ChatRequest {
            model: "m".to_string(),
            ..ChatRequest::default()
        }
    }

    #[test]
    fn anthropic_defaults_max_tokens_when_source_has_none() {
        let raised = raise_anthropic(base_request());
        assert_eq!(raised.max_tokens, ANTHROPIC_DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn anthropic_temperature_is_clamped() {
        let raised = raise_anthropic(ChatRequest {
            params: SamplingParams {
                temperature: Some(1.7),
                ..SamplingParams::default()
            },
            ..base_request()
        });
        assert_eq!(raised.temperature, Some(1.0));
    }

    #[test]
    fn empty_assistant_turns_are_dropped() {
        let raised = raise_anthropic(ChatRequest {
            messages: vec![
                Message {
                    role: Role::Assistant,
                    content: vec![ContentBlock::Text { text: String::new() }],
                },
                Message::from_text(Role::User, "hi"),
            ],
            ..base_request()
        });
        assert_eq!(raised.messages.len(), 1);
    }

    #[test]
    fn openai_images_pack_into_data_urls() {
        let raised = raise_openai_chat(ChatRequest {
            messages: vec![Message {
                role: Role::User,
                content: vec![
                    ContentBlock::Text { text: "look".to_string() },
                    ContentBlock::Image {
                        media_type: Some("image/jpeg".to_string()),
                        data: ImageData::Base64("AAAA".to_string()),
                    },
                ],
            }],
            ..base_request()
        });
        let openai_chat::RequestMessage::User(user) = &raised.messages[0] else {
            panic!("expected user message");
        };
        let openai_chat::UserContent::Parts(parts) = &user.content else {
            panic!("expected parts");
        };
        assert_eq!(
            parts[1],
            openai_chat::UserContentPart::ImageUrl {
                image_url: openai_chat::ImageUrl {
                    url: "data:image/jpeg;base64,AAAA".to_string(),
                    detail: None,
                },
            }
        );
    }

    #[test]
    fn gemini_function_responses_recover_names() {
        let raised = raise_gemini(ChatRequest {
            messages: vec![
                Message {
                    role: Role::Assistant,
                    content: vec![ContentBlock::ToolUse {
                        id: "call_7".to_string(),
                        name: "lookup".to_string(),
                        input: json!({"q": "x"}),
                    }],
                },
                Message {
                    role: Role::Tool,
                    content: vec![ContentBlock::ToolResult {
                        id: "call_7".to_string(),
                        content: "found".to_string(),
                        is_error: false,
                    }],
                },
            ],
            ..base_request()
        });
        let response = raised.contents[1].parts[0]
            .function_response
            .as_ref()
            .unwrap();
        assert_eq!(response.name, "lookup");
        assert_eq!(response.response, json!({"result": "found"}));
    }
}
