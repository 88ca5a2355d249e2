use serde::{Deserialize, Serialize};

use agw_protocol::anthropic::request::CreateMessageRequest;
use agw_protocol::anthropic::response::CreateMessageResponse;
use agw_protocol::anthropic::stream::StreamEvent as AnthropicStreamEvent;
use agw_protocol::gemini::request::GenerateContentRequest;
use agw_protocol::gemini::response::GenerateContentResponse;
use agw_protocol::openai_chat::request::ChatCompletionRequest;
use agw_protocol::openai_chat::response::ChatCompletionResponse;
use agw_protocol::openai_chat::stream::ChatCompletionChunk;
use agw_protocol::openai_responses::request::CreateResponseRequest;
use agw_protocol::openai_responses::response::Response as OpenAIResponse;
use agw_protocol::openai_responses::stream::ResponseStreamEvent;

use crate::content::InvalidRequest;

/// The four wire protocols. `openai_code` is the legacy configuration name
/// for the Responses protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Proto {
    #[serde(rename = "anthropic", alias = "claude")]
    Anthropic,
    #[serde(rename = "openai_chat", alias = "openai")]
    OpenAIChat,
    #[serde(rename = "openai_responses", alias = "openai_code")]
    OpenAIResponses,
    #[serde(rename = "gemini")]
    Gemini,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformContext {
    /// The protocol the client speaks.
    pub client: Proto,
    /// The protocol the chosen upstream expects.
    pub upstream: Proto,
}

/// A Gemini generate request with its path-borne model and the streaming
/// flag carried by the endpoint choice.
#[derive(Debug, Clone, PartialEq)]
pub struct GeminiGenerateRequest {
    pub model: String,
    pub stream: bool,
    pub body: GenerateContentRequest,
}

#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateRequest {
    Anthropic(CreateMessageRequest),
    OpenAIChat(ChatCompletionRequest),
    OpenAIResponses(CreateResponseRequest),
    Gemini(GeminiGenerateRequest),
}

impl GenerateRequest {
    pub fn proto(&self) -> Proto {
        match self {
            GenerateRequest::Anthropic(_) => Proto::Anthropic,
            GenerateRequest::OpenAIChat(_) => Proto::OpenAIChat,
            GenerateRequest::OpenAIResponses(_) => Proto::OpenAIResponses,
            GenerateRequest::Gemini(_) => Proto::Gemini,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            GenerateRequest::Anthropic(req) => &req.model,
            GenerateRequest::OpenAIChat(req) => &req.model,
            GenerateRequest::OpenAIResponses(req) => &req.model,
            GenerateRequest::Gemini(req) => &req.model,
        }
    }

    pub fn set_model(&mut self, model: &str) {
        match self {
            GenerateRequest::Anthropic(req) => req.model = model.to_string(),
            GenerateRequest::OpenAIChat(req) => req.model = model.to_string(),
            GenerateRequest::OpenAIResponses(req) => req.model = model.to_string(),
            GenerateRequest::Gemini(req) => req.model = model.to_string(),
        }
    }

    pub fn is_stream(&self) -> bool {
        match self {
            GenerateRequest::Anthropic(req) => req.stream.unwrap_or(false),
            GenerateRequest::OpenAIChat(req) => req.stream.unwrap_or(false),
            GenerateRequest::OpenAIResponses(req) => req.stream.unwrap_or(false),
            GenerateRequest::Gemini(req) => req.stream,
        }
    }
}

#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateResponse {
    Anthropic(CreateMessageResponse),
    OpenAIChat(ChatCompletionResponse),
    OpenAIResponses(OpenAIResponse),
    Gemini(GenerateContentResponse),
}

impl GenerateResponse {
    pub fn proto(&self) -> Proto {
        match self {
            GenerateResponse::Anthropic(_) => Proto::Anthropic,
            GenerateResponse::OpenAIChat(_) => Proto::OpenAIChat,
            GenerateResponse::OpenAIResponses(_) => Proto::OpenAIResponses,
            GenerateResponse::Gemini(_) => Proto::Gemini,
        }
    }
}

#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Anthropic(AnthropicStreamEvent),
    OpenAIChat(ChatCompletionChunk),
    OpenAIResponses(ResponseStreamEvent),
    Gemini(GenerateContentResponse),
}

impl StreamEvent {
    /// Parse one upstream `data:` payload as the given protocol's event.
    pub fn parse(proto: Proto, data: &str) -> Result<Self, serde_json::Error> {
        Ok(match proto {
            Proto::Anthropic => StreamEvent::Anthropic(serde_json::from_str(data)?),
            Proto::OpenAIChat => StreamEvent::OpenAIChat(serde_json::from_str(data)?),
            Proto::OpenAIResponses => StreamEvent::OpenAIResponses(serde_json::from_str(data)?),
            Proto::Gemini => StreamEvent::Gemini(serde_json::from_str(data)?),
        })
    }

    pub fn proto(&self) -> Proto {
        match self {
            StreamEvent::Anthropic(_) => Proto::Anthropic,
            StreamEvent::OpenAIChat(_) => Proto::OpenAIChat,
            StreamEvent::OpenAIResponses(_) => Proto::OpenAIResponses,
            StreamEvent::Gemini(_) => Proto::Gemini,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The value handed to a converter does not match the context's protocol.
    ProtoMismatch,
    Invalid(InvalidRequest),
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformError::ProtoMismatch => write!(f, "protocol mismatch"),
            TransformError::Invalid(err) => write!(f, "invalid request: {err}"),
        }
    }
}

impl std::error::Error for TransformError {}

impl From<InvalidRequest> for TransformError {
    fn from(err: InvalidRequest) -> Self {
        TransformError::Invalid(err)
    }
}
