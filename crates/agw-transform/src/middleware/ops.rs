use agw_protocol::openai_chat::types::StreamOptions;

use crate::content::{validate, ChatRequest};
use crate::request::{lower, raise};
use crate::response;

use super::types::{
    GeminiGenerateRequest, GenerateRequest, GenerateResponse, Proto, TransformContext,
    TransformError,
};

/// Lower the inbound request, validate it, and raise it into the upstream
/// protocol. Identity directions take the same path, which normalizes the
/// body. Returns the outbound request plus conversion warnings.
pub fn transform_request(
    ctx: &TransformContext,
    req: GenerateRequest,
) -> Result<(GenerateRequest, Vec<String>), TransformError> {
    if req.proto() != ctx.client {
        return Err(TransformError::ProtoMismatch);
    }

    let lowered = match req {
        GenerateRequest::Anthropic(req) => lower::lower_anthropic(req)?,
        GenerateRequest::OpenAIChat(req) => lower::lower_openai_chat(req)?,
        GenerateRequest::OpenAIResponses(req) => lower::lower_openai_responses(req)?,
        GenerateRequest::Gemini(req) => {
            let mut lowered = lower::lower_gemini(req.model, req.body)?;
            lowered.stream = req.stream;
            lowered
        }
    };
    validate(&lowered)?;
    let warnings = lowered.warnings.clone();

    Ok((raise_request(ctx.upstream, lowered), warnings))
}

fn raise_request(upstream: Proto, lowered: ChatRequest) -> GenerateRequest {
    match upstream {
        Proto::Anthropic => GenerateRequest::Anthropic(raise::raise_anthropic(lowered)),
        Proto::OpenAIChat => {
            let mut out = raise::raise_openai_chat(lowered);
            // Ask the upstream to attach usage to the final chunk.
            if out.stream == Some(true) {
                out.stream_options = Some(StreamOptions {
                    include_usage: Some(true),
                });
            }
            GenerateRequest::OpenAIChat(out)
        }
        Proto::OpenAIResponses => {
            GenerateRequest::OpenAIResponses(raise::raise_openai_responses(lowered))
        }
        Proto::Gemini => {
            let model = lowered.model.clone();
            let stream = lowered.stream;
            GenerateRequest::Gemini(GeminiGenerateRequest {
                model,
                stream,
                body: raise::raise_gemini(lowered),
            })
        }
    }
}

/// Convert a buffered upstream response back into the client's protocol.
/// `model` is the client-facing model name.
pub fn transform_response(
    ctx: &TransformContext,
    resp: GenerateResponse,
    model: &str,
) -> Result<GenerateResponse, TransformError> {
    if resp.proto() != ctx.upstream {
        return Err(TransformError::ProtoMismatch);
    }

    let out = match (resp, ctx.client) {
        // Identity passes still hide the upstream's canonical model id.
        (GenerateResponse::Anthropic(mut resp), Proto::Anthropic) => {
            resp.model = model.to_string();
            GenerateResponse::Anthropic(resp)
        }
        (GenerateResponse::OpenAIChat(mut resp), Proto::OpenAIChat) => {
            resp.model = model.to_string();
            GenerateResponse::OpenAIChat(resp)
        }
        (GenerateResponse::OpenAIResponses(mut resp), Proto::OpenAIResponses) => {
            resp.model = model.to_string();
            GenerateResponse::OpenAIResponses(resp)
        }
        (GenerateResponse::Gemini(resp), Proto::Gemini) => GenerateResponse::Gemini(resp),

        (GenerateResponse::Anthropic(resp), Proto::OpenAIChat) => GenerateResponse::OpenAIChat(
            response::anthropic_to_openai_chat::transform_response(resp, model),
        ),
        (GenerateResponse::Anthropic(resp), Proto::OpenAIResponses) => {
            GenerateResponse::OpenAIResponses(
                response::anthropic_to_openai_responses::transform_response(resp, model),
            )
        }
        (GenerateResponse::Anthropic(resp), Proto::Gemini) => GenerateResponse::Gemini(
            response::anthropic_to_gemini::transform_response(resp, model),
        ),

        (GenerateResponse::OpenAIChat(resp), Proto::Anthropic) => GenerateResponse::Anthropic(
            response::openai_chat_to_anthropic::transform_response(resp, model),
        ),
        (GenerateResponse::OpenAIChat(resp), Proto::OpenAIResponses) => {
            GenerateResponse::OpenAIResponses(
                response::openai_chat_to_openai_responses::transform_response(resp, model),
            )
        }
        (GenerateResponse::OpenAIChat(resp), Proto::Gemini) => GenerateResponse::Gemini(
            response::openai_chat_to_gemini::transform_response(resp, model),
        ),

        (GenerateResponse::OpenAIResponses(resp), Proto::Anthropic) => {
            GenerateResponse::Anthropic(
                response::openai_responses_to_anthropic::transform_response(resp, model),
            )
        }
        (GenerateResponse::OpenAIResponses(resp), Proto::OpenAIChat) => {
            GenerateResponse::OpenAIChat(
                response::openai_responses_to_openai_chat::transform_response(resp, model),
            )
        }
        (GenerateResponse::OpenAIResponses(resp), Proto::Gemini) => GenerateResponse::Gemini(
            response::openai_responses_to_gemini::transform_response(resp, model),
        ),

        (GenerateResponse::Gemini(resp), Proto::Anthropic) => GenerateResponse::Anthropic(
            response::gemini_to_anthropic::transform_response(resp, model),
        ),
        (GenerateResponse::Gemini(resp), Proto::OpenAIChat) => GenerateResponse::OpenAIChat(
            response::gemini_to_openai_chat::transform_response(resp, model),
        ),
        (GenerateResponse::Gemini(resp), Proto::OpenAIResponses) => {
            GenerateResponse::OpenAIResponses(
                response::gemini_to_openai_responses::transform_response(resp, model),
            )
        }
    };

    Ok(out)
}
