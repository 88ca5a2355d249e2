//! The normalized content model every request converter lowers into and
//! raises out of. Pure data plus validation; wire concerns stay in the
//! protocol crate.

use serde_json::{json, Value as JsonValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    /// Carrier of tool results; each block answers one prior tool use.
    Tool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        media_type: Option<String>,
        data: ImageData,
    },
    ToolUse {
        id: String,
        name: String,
        input: JsonValue,
    },
    ToolResult {
        id: String,
        content: String,
        is_error: bool,
    },
}

/// Base64 payloads and URLs are kept distinct end to end.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    Base64(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn from_text(role: Role, text: impl Into<String>) -> Self {
        Message {
            role,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// True when nothing would survive lowering; such messages are dropped.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<JsonValue>,
}

impl ToolDefinition {
    /// The schema as sent on the wire; absent schemas become the permissive
    /// object schema.
    pub fn schema_or_default(&self) -> JsonValue {
        match &self.input_schema {
            Some(schema) => schema.clone(),
            None => json!({"type": "object"}),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    Required,
    None,
    Specific(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplingParams {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<i32>,
    pub max_output_tokens: Option<i32>,
    pub stop_sequences: Vec<String>,
    pub seed: Option<i64>,
    pub user: Option<String>,
    pub response_format: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
}

/// A fully lowered request, protocol-free.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    /// System text sources in original order; raised targets join them.
    pub system: Vec<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    pub params: SamplingParams,
    pub stream: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRequest {
    pub field: String,
    pub reason: String,
}

impl InvalidRequest {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        InvalidRequest {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for InvalidRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl std::error::Error for InvalidRequest {}

/// Validation shared by every inbound direction.
pub fn validate(req: &ChatRequest) -> Result<(), InvalidRequest> {
    if req.model.trim().is_empty() {
        return Err(InvalidRequest::new("model", "model must not be empty"));
    }

    for tool in &req.tools {
        if let Some(schema) = &tool.input_schema {
            if !schema.is_object() {
                return Err(InvalidRequest::new(
                    "tools.input_schema",
                    format!("schema for tool {} is not an object", tool.name),
                ));
            }
        }
    }

    if let Some(ToolChoice::Specific(name)) = &req.tool_choice {
        if !req.tools.iter().any(|tool| &tool.name == name) {
            return Err(InvalidRequest::new(
                "tool_choice",
                format!("tool {name} is not defined"),
            ));
        }
    }

    Ok(())
}

/// Tolerant string → object conversion for tool-call arguments. Parse
/// failures degrade to an empty object; valid non-object JSON is wrapped.
pub fn parse_tool_arguments(arguments: &str) -> JsonValue {
    if arguments.trim().is_empty() {
        return json!({});
    }
    match serde_json::from_str::<JsonValue>(arguments) {
        Ok(value @ JsonValue::Object(_)) => value,
        Ok(other) => json!({"arguments": other}),
        Err(_) => json!({}),
    }
}

/// Tolerant object → string conversion; failures degrade to `"{}"`.
pub fn stringify_tool_arguments(input: &JsonValue) -> String {
    serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string())
}

/// Split a `data:<media>;base64,<payload>` URL.
pub fn parse_data_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let (media_type, encoding) = meta.split_once(';')?;
    if encoding != "base64" {
        return None;
    }
    Some((media_type.to_string(), data.to_string()))
}

pub fn format_data_url(media_type: &str, data: &str) -> String {
    format!("data:{media_type};base64,{data}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_model() {
        let req = ChatRequest::default();
        let err = validate(&req).unwrap_err();
        assert_eq!(err.field, "model");
    }

    #[test]
    fn validate_rejects_non_object_schema() {
        let req = ChatRequest {
            model: "m".to_string(),
            tools: vec![ToolDefinition {
                name: "sum".to_string(),
                description: None,
                input_schema: Some(json!([1, 2])),
            }],
            ..ChatRequest::default()
        };
        assert_eq!(validate(&req).unwrap_err().field, "tools.input_schema");
    }

    #[test]
    fn validate_rejects_unknown_tool_choice() {
        let req = ChatRequest {
            model: "m".to_string(),
            tool_choice: Some(ToolChoice::Specific("missing".to_string())),
            ..ChatRequest::default()
        };
        assert_eq!(validate(&req).unwrap_err().field, "tool_choice");
    }

    #[test]
    fn tool_arguments_degrade_instead_of_failing() {
        assert_eq!(parse_tool_arguments("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_tool_arguments("not json"), json!({}));
        assert_eq!(parse_tool_arguments("[1]"), json!({"arguments": [1]}));
        assert_eq!(parse_tool_arguments("  "), json!({}));
    }

    #[test]
    fn data_urls_round_trip() {
        let url = format_data_url("image/png", "AAAA");
        assert_eq!(
            parse_data_url(&url),
            Some(("image/png".to_string(), "AAAA".to_string()))
        );
        assert_eq!(parse_data_url("https://example.com/x.png"), None);
    }
}
