use agw_protocol::anthropic::request::CreateMessageRequest;
use agw_protocol::anthropic::types as anthropic;
use agw_protocol::gemini::request::GenerateContentRequest;
use agw_protocol::gemini::types as gemini;
use agw_protocol::openai_chat::request::ChatCompletionRequest;
use agw_protocol::openai_chat::types as openai_chat;
use agw_protocol::openai_responses::request::CreateResponseRequest;
use agw_protocol::openai_responses::types as openai_responses;

use crate::content::{
    parse_data_url, parse_tool_arguments, stringify_tool_arguments, ChatRequest, ContentBlock,
    ImageData, InvalidRequest, Message, Role, SamplingParams, ToolChoice, ToolDefinition,
};

pub fn lower_anthropic(req: CreateMessageRequest) -> Result<ChatRequest, InvalidRequest> {
    if req.max_tokens <= 0 {
        return Err(InvalidRequest::new(
            "max_tokens",
            "max_tokens must be a positive integer",
        ));
    }

    let mut out = ChatRequest {
        model: req.model,
        stream: req.stream.unwrap_or(false),
        ..ChatRequest::default()
    };

    match req.system {
        Some(anthropic::SystemPrompt::Text(text)) => push_system(&mut out.system, text),
        Some(anthropic::SystemPrompt::Blocks(blocks)) => {
            for block in blocks {
                let anthropic::SystemBlock::Text { text } = block;
                push_system(&mut out.system, text);
            }
        }
        None => {}
    }

    for message in req.messages {
        let role = match message.role {
            anthropic::MessageRole::User => Role::User,
            anthropic::MessageRole::Assistant => Role::Assistant,
        };
        lower_anthropic_message(&mut out.messages, role, message.content);
    }

    out.params = SamplingParams {
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: req.top_k,
        max_output_tokens: Some(req.max_tokens),
        stop_sequences: req.stop_sequences.unwrap_or_default(),
        seed: None,
        user: req.metadata.and_then(|metadata| metadata.user_id),
        response_format: None,
    };

    if let Some(tools) = req.tools {
        out.tools = tools
            .into_iter()
            .map(|tool| ToolDefinition {
                name: tool.name,
                description: tool.description,
                input_schema: tool.input_schema,
            })
            .collect();
    }
    out.tool_choice = req.tool_choice.map(|choice| match choice {
        anthropic::ToolChoice::Auto => ToolChoice::Auto,
        anthropic::ToolChoice::Any => ToolChoice::Required,
        anthropic::ToolChoice::None => ToolChoice::None,
        anthropic::ToolChoice::Tool { name } => ToolChoice::Specific(name),
    });

    Ok(out)
}

/// Tool results live inside user messages on this wire; they are routed into
/// tool-role messages so every target can re-place them.
fn lower_anthropic_message(
    messages: &mut Vec<Message>,
    role: Role,
    content: anthropic::MessageContent,
) {
    let blocks = match content {
        anthropic::MessageContent::Text(text) => {
            if !text.is_empty() {
                messages.push(Message::from_text(role, text));
            }
            return;
        }
        anthropic::MessageContent::Blocks(blocks) => blocks,
    };

    let mut plain = Vec::new();
    let mut results = Vec::new();
    for block in blocks {
        match block {
            anthropic::ContentBlock::Text { text } => {
                if !text.is_empty() {
                    plain.push(ContentBlock::Text { text });
                }
            }
            anthropic::ContentBlock::Image { source } => plain.push(lower_anthropic_image(source)),
            anthropic::ContentBlock::ToolUse { id, name, input } => {
                plain.push(ContentBlock::ToolUse {
                    id,
                    name,
                    input: serde_json::Value::Object(input),
                });
            }
            anthropic::ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => results.push(ContentBlock::ToolResult {
                id: tool_use_id,
                content: content.map(flatten_tool_result).unwrap_or_default(),
                is_error: is_error.unwrap_or(false),
            }),
        }
    }

    if !results.is_empty() {
        messages.push(Message {
            role: Role::Tool,
            content: results,
        });
    }
    if !plain.is_empty() {
        messages.push(Message {
            role,
            content: plain,
        });
    }
}

fn lower_anthropic_image(source: anthropic::ImageSource) -> ContentBlock {
    match source {
        anthropic::ImageSource::Base64 { media_type, data } => ContentBlock::Image {
            media_type: Some(media_type),
            data: ImageData::Base64(data),
        },
        anthropic::ImageSource::Url { url } => lower_image_url(&url),
    }
}

fn flatten_tool_result(content: anthropic::ToolResultContent) -> String {
    match content {
        anthropic::ToolResultContent::Text(text) => text,
        anthropic::ToolResultContent::Blocks(blocks) => blocks
            .into_iter()
            .filter_map(|block| match block {
                anthropic::ContentBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

pub fn lower_openai_chat(req: ChatCompletionRequest) -> Result<ChatRequest, InvalidRequest> {
    let mut out = ChatRequest {
        model: req.model,
        stream: req.stream.unwrap_or(false),
        ..ChatRequest::default()
    };

    for message in req.messages {
        match message {
            openai_chat::RequestMessage::System(system)
            | openai_chat::RequestMessage::Developer(system) => {
                push_system(&mut out.system, system.content.flatten());
            }
            openai_chat::RequestMessage::User(user) => {
                let blocks = lower_openai_user_content(user.content);
                if !blocks.is_empty() {
                    out.messages.push(Message {
                        role: Role::User,
                        content: blocks,
                    });
                }
            }
            openai_chat::RequestMessage::Assistant(assistant) => {
                let mut blocks = Vec::new();
                if let Some(content) = assistant.content {
                    let text = content.flatten();
                    if !text.is_empty() {
                        blocks.push(ContentBlock::Text { text });
                    }
                }
                for call in assistant.tool_calls.unwrap_or_default() {
                    blocks.push(ContentBlock::ToolUse {
                        id: call.id,
                        name: call.function.name,
                        input: parse_tool_arguments(&call.function.arguments),
                    });
                }
                if !blocks.is_empty() {
                    out.messages.push(Message {
                        role: Role::Assistant,
                        content: blocks,
                    });
                }
            }
            openai_chat::RequestMessage::Tool(tool) => {
                out.messages.push(Message {
                    role: Role::Tool,
                    content: vec![ContentBlock::ToolResult {
                        id: tool.tool_call_id,
                        content: tool.content.flatten(),
                        is_error: false,
                    }],
                });
            }
        }
    }

    out.params = SamplingParams {
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: None,
        max_output_tokens: req.max_completion_tokens.or(req.max_tokens),
        stop_sequences: req.stop.map(|stop| stop.into_vec()).unwrap_or_default(),
        seed: req.seed,
        user: req.user,
        response_format: req.response_format.map(|format| format.r#type),
    };
    if req.n.map_or(false, |n| n > 1) {
        out.warnings.push("n > 1 is not supported; using 1".to_string());
    }

    if let Some(tools) = req.tools {
        out.tools = tools
            .into_iter()
            .map(|tool| ToolDefinition {
                name: tool.function.name,
                description: tool.function.description,
                input_schema: tool.function.parameters,
            })
            .collect();
    }
    out.tool_choice = req.tool_choice.map(|choice| match choice {
        openai_chat::ToolChoice::Mode(openai_chat::ToolChoiceMode::None) => ToolChoice::None,
        openai_chat::ToolChoice::Mode(openai_chat::ToolChoiceMode::Auto) => ToolChoice::Auto,
        openai_chat::ToolChoice::Mode(openai_chat::ToolChoiceMode::Required) => {
            ToolChoice::Required
        }
        openai_chat::ToolChoice::Named(named) => ToolChoice::Specific(named.function.name),
    });

    Ok(out)
}

fn lower_openai_user_content(content: openai_chat::UserContent) -> Vec<ContentBlock> {
    match content {
        openai_chat::UserContent::Text(text) => {
            if text.is_empty() {
                Vec::new()
            } else {
                vec![ContentBlock::Text { text }]
            }
        }
        openai_chat::UserContent::Parts(parts) => parts
            .into_iter()
            .filter_map(|part| match part {
                openai_chat::UserContentPart::Text { text } => {
                    (!text.is_empty()).then_some(ContentBlock::Text { text })
                }
                openai_chat::UserContentPart::ImageUrl { image_url } => {
                    Some(lower_image_url(&image_url.url))
                }
            })
            .collect(),
    }
}

/// Base64 data URLs are unpacked; everything else stays a URL reference.
fn lower_image_url(url: &str) -> ContentBlock {
    match parse_data_url(url) {
        Some((media_type, data)) => ContentBlock::Image {
            media_type: Some(media_type),
            data: ImageData::Base64(data),
        },
        None => ContentBlock::Image {
            media_type: None,
            data: ImageData::Url(url.to_string()),
        },
    }
}

pub fn lower_openai_responses(req: CreateResponseRequest) -> Result<ChatRequest, InvalidRequest> {
    let mut out = ChatRequest {
        model: req.model,
        stream: req.stream.unwrap_or(false),
        ..ChatRequest::default()
    };

    if let Some(instructions) = req.instructions {
        push_system(&mut out.system, instructions);
    }

    match req.input {
        Some(openai_responses::InputParam::Text(text)) => {
            if !text.is_empty() {
                out.messages.push(Message::from_text(Role::User, text));
            }
        }
        Some(openai_responses::InputParam::Items(items)) => {
            for item in items {
                lower_responses_item(&mut out, item);
            }
        }
        None => {}
    }

    out.params = SamplingParams {
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: None,
        max_output_tokens: req.max_output_tokens,
        stop_sequences: Vec::new(),
        seed: None,
        user: req.user,
        response_format: None,
    };

    if let Some(tools) = req.tools {
        out.tools = tools
            .into_iter()
            .map(|tool| ToolDefinition {
                name: tool.name,
                description: tool.description,
                input_schema: tool.parameters,
            })
            .collect();
    }
    out.tool_choice = req.tool_choice.map(|choice| match choice {
        openai_responses::ToolChoice::Mode(openai_responses::ToolChoiceMode::None) => {
            ToolChoice::None
        }
        openai_responses::ToolChoice::Mode(openai_responses::ToolChoiceMode::Auto) => {
            ToolChoice::Auto
        }
        openai_responses::ToolChoice::Mode(openai_responses::ToolChoiceMode::Required) => {
            ToolChoice::Required
        }
        openai_responses::ToolChoice::Named(named) => ToolChoice::Specific(named.name),
    });

    Ok(out)
}

fn lower_responses_item(out: &mut ChatRequest, item: openai_responses::InputItem) {
    match item {
        openai_responses::InputItem::Message(message) => {
            match message.role.as_str() {
                "system" | "developer" => {
                    push_system(&mut out.system, flatten_responses_content(message.content));
                    return;
                }
                _ => {}
            }
            let role = if message.role == "assistant" {
                Role::Assistant
            } else {
                Role::User
            };
            let blocks = lower_responses_content(message.content);
            if !blocks.is_empty() {
                out.messages.push(Message {
                    role,
                    content: blocks,
                });
            }
        }
        openai_responses::InputItem::FunctionCall(call) => {
            out.messages.push(Message {
                role: Role::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: call.call_id,
                    name: call.name,
                    input: parse_tool_arguments(&call.arguments),
                }],
            });
        }
        openai_responses::InputItem::FunctionCallOutput(output) => {
            out.messages.push(Message {
                role: Role::Tool,
                content: vec![ContentBlock::ToolResult {
                    id: output.call_id,
                    content: output.output,
                    is_error: false,
                }],
            });
        }
    }
}

fn lower_responses_content(content: openai_responses::InputContent) -> Vec<ContentBlock> {
    match content {
        openai_responses::InputContent::Text(text) => {
            if text.is_empty() {
                Vec::new()
            } else {
                vec![ContentBlock::Text { text }]
            }
        }
        openai_responses::InputContent::Parts(parts) => parts
            .into_iter()
            .filter_map(|part| match part {
                openai_responses::InputContentPart::InputText { text }
                | openai_responses::InputContentPart::OutputText { text } => {
                    (!text.is_empty()).then_some(ContentBlock::Text { text })
                }
                openai_responses::InputContentPart::InputImage { image_url } => {
                    Some(lower_image_url(image_url.url()))
                }
            })
            .collect(),
    }
}

fn flatten_responses_content(content: openai_responses::InputContent) -> String {
    match content {
        openai_responses::InputContent::Text(text) => text,
        openai_responses::InputContent::Parts(parts) => parts
            .into_iter()
            .filter_map(|part| match part {
                openai_responses::InputContentPart::InputText { text }
                | openai_responses::InputContentPart::OutputText { text } => Some(text),
                openai_responses::InputContentPart::InputImage { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// The Gemini wire has no tool-call ids; stable `call_{index}` ids are
/// synthesized per conversation and replies are matched back by name.
pub fn lower_gemini(model: String, req: GenerateContentRequest) -> Result<ChatRequest, InvalidRequest> {
    let mut out = ChatRequest {
        model,
        ..ChatRequest::default()
    };

    if let Some(system) = req.system_instruction {
        for part in system.parts {
            if let Some(text) = part.text {
                push_system(&mut out.system, text);
            }
        }
    }

    let mut calls = SynthesizedCalls::default();
    for content in req.contents {
        let role = match content.role {
            Some(gemini::ContentRole::Model) => Role::Assistant,
            _ => Role::User,
        };
        lower_gemini_content(&mut out.messages, &mut calls, role, content.parts);
    }

    if let Some(config) = req.generation_config {
        out.params = SamplingParams {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            max_output_tokens: config.max_output_tokens,
            stop_sequences: config.stop_sequences.unwrap_or_default(),
            seed: config.seed,
            user: None,
            response_format: None,
        };
    }

    for tool in req.tools.unwrap_or_default() {
        for declaration in tool.function_declarations {
            out.tools.push(ToolDefinition {
                name: declaration.name,
                description: declaration.description,
                input_schema: declaration.parameters,
            });
        }
    }

    if let Some(config) = req.tool_config {
        let calling = config.function_calling_config;
        out.tool_choice = Some(match calling.mode {
            gemini::FunctionCallingMode::None => ToolChoice::None,
            gemini::FunctionCallingMode::Auto => ToolChoice::Auto,
            gemini::FunctionCallingMode::Any => match calling.allowed_function_names.as_deref() {
                Some([name]) => ToolChoice::Specific(name.clone()),
                _ => ToolChoice::Required,
            },
        });
    }

    Ok(out)
}

#[derive(Default)]
struct SynthesizedCalls {
    counter: usize,
    open: Vec<(String, String)>,
}

impl SynthesizedCalls {
    fn issue(&mut self, name: &str) -> String {
        let id = format!("call_{}", self.counter);
        self.counter += 1;
        self.open.push((name.to_string(), id.clone()));
        id
    }

    fn answer(&mut self, name: &str) -> String {
        if let Some(pos) = self.open.iter().position(|(open_name, _)| open_name == name) {
            return self.open.remove(pos).1;
        }
        let id = format!("call_{}", self.counter);
        self.counter += 1;
        id
    }
}

fn lower_gemini_content(
    messages: &mut Vec<Message>,
    calls: &mut SynthesizedCalls,
    role: Role,
    parts: Vec<gemini::Part>,
) {
    let mut plain = Vec::new();
    let mut results = Vec::new();

    for part in parts {
        if let Some(text) = part.text {
            if !text.is_empty() {
                plain.push(ContentBlock::Text { text });
            }
        } else if let Some(blob) = part.inline_data {
            plain.push(ContentBlock::Image {
                media_type: Some(blob.mime_type),
                data: ImageData::Base64(blob.data),
            });
        } else if let Some(call) = part.function_call {
            let id = calls.issue(&call.name);
            plain.push(ContentBlock::ToolUse {
                id,
                name: call.name,
                input: call.args.unwrap_or_else(|| serde_json::json!({})),
            });
        } else if let Some(response) = part.function_response {
            let id = calls.answer(&response.name);
            results.push(ContentBlock::ToolResult {
                id,
                content: flatten_function_response(response.response),
                is_error: false,
            });
        }
    }

    if !results.is_empty() {
        messages.push(Message {
            role: Role::Tool,
            content: results,
        });
    }
    if !plain.is_empty() {
        messages.push(Message {
            role,
            content: plain,
        });
    }
}

/// The conventional `{"result": …}` envelope is unwrapped; anything else is
/// carried as JSON text.
fn flatten_function_response(response: serde_json::Value) -> String {
    if let Some(result) = response.get("result") {
        if let Some(text) = result.as_str() {
            return text.to_string();
        }
        return stringify_tool_arguments(result);
    }
    match response {
        serde_json::Value::String(text) => text,
        other => stringify_tool_arguments(&other),
    }
}

fn push_system(system: &mut Vec<String>, text: String) {
    if !text.is_empty() {
        system.push(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn anthropic_rejects_non_positive_max_tokens() {
        let req: CreateMessageRequest = serde_json::from_value(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 0,
            "messages": [],
        }))
        .unwrap();
        assert_eq!(lower_anthropic(req).unwrap_err().field, "max_tokens");
    }

    #[test]
    fn openai_system_messages_collect_in_order() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "messages": [
                {"role": "system", "content": "one"},
                {"role": "user", "content": "hi"},
                {"role": "system", "content": "two"},
            ],
        }))
        .unwrap();
        let lowered = lower_openai_chat(req).unwrap();
        assert_eq!(lowered.system, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(lowered.messages.len(), 1);
    }

    #[test]
    fn openai_tool_arguments_parse_into_objects() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "gpt-4",
            "messages": [
                {"role": "assistant", "tool_calls": [
                    {"id": "call1", "type": "function",
                     "function": {"name": "sum", "arguments": "{\"a\":1}"}},
                ]},
                {"role": "tool", "tool_call_id": "call1", "content": "42"},
            ],
        }))
        .unwrap();
        let lowered = lower_openai_chat(req).unwrap();
        assert_eq!(
            lowered.messages[0].content,
            vec![ContentBlock::ToolUse {
                id: "call1".to_string(),
                name: "sum".to_string(),
                input: json!({"a": 1}),
            }]
        );
        assert_eq!(lowered.messages[1].role, Role::Tool);
    }

    #[test]
    fn gemini_synthesizes_stable_call_ids() {
        let req: GenerateContentRequest = serde_json::from_value(json!({
            "contents": [
                {"role": "model", "parts": [
                    {"functionCall": {"name": "sum", "args": {"a": 1}}},
                ]},
                {"role": "user", "parts": [
                    {"functionResponse": {"name": "sum", "response": {"result": "3"}}},
                ]},
            ],
        }))
        .unwrap();
        let lowered = lower_gemini("gemini-1.5-pro".to_string(), req).unwrap();
        let ContentBlock::ToolUse { id: use_id, .. } = &lowered.messages[0].content[0] else {
            panic!("expected tool use");
        };
        let ContentBlock::ToolResult { id: result_id, content, .. } =
            &lowered.messages[1].content[0]
        else {
            panic!("expected tool result");
        };
        assert_eq!(use_id, "call_0");
        assert_eq!(result_id, "call_0");
        assert_eq!(content, "3");
    }

    #[test]
    fn responses_instructions_and_items_lower() {
        let req: CreateResponseRequest = serde_json::from_value(json!({
            "model": "gpt-4.1",
            "instructions": "sys",
            "input": [
                {"role": "user", "content": "hi"},
                {"type": "function_call", "call_id": "call_a", "name": "f", "arguments": "{}"},
                {"type": "function_call_output", "call_id": "call_a", "output": "ok"},
            ],
        }))
        .unwrap();
        let lowered = lower_openai_responses(req).unwrap();
        assert_eq!(lowered.system, vec!["sys".to_string()]);
        assert_eq!(lowered.messages.len(), 3);
        assert_eq!(lowered.messages[2].role, Role::Tool);
    }
}
