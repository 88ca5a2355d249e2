use crate::stream::anthropic_to_gemini::AnthropicToGeminiStream;
use crate::stream::anthropic_to_openai_chat::AnthropicToOpenAIChatStream;
use crate::stream::anthropic_to_openai_responses::AnthropicToOpenAIResponsesStream;
use crate::stream::gemini_to_anthropic::GeminiToAnthropicStream;
use crate::stream::gemini_to_openai_chat::GeminiToOpenAIChatStream;
use crate::stream::gemini_to_openai_responses::GeminiToOpenAIResponsesStream;
use crate::stream::openai_chat_to_anthropic::OpenAIChatToAnthropicStream;
use crate::stream::openai_chat_to_gemini::OpenAIChatToGeminiStream;
use crate::stream::openai_chat_to_openai_responses::OpenAIChatToOpenAIResponsesStream;
use crate::stream::openai_responses_to_anthropic::OpenAIResponsesToAnthropicStream;
use crate::stream::openai_responses_to_gemini::OpenAIResponsesToGeminiStream;
use crate::stream::openai_responses_to_openai_chat::OpenAIResponsesToOpenAIChatStream;

use super::types::{Proto, StreamEvent, TransformContext, TransformError};

/// One per streaming request: consumes upstream events, produces
/// client-protocol events. Same-protocol pairs pass events through but still
/// track the terminal state.
#[allow(clippy::large_enum_variant)]
pub enum StreamTransformer {
    Passthrough {
        proto: Proto,
        finished: bool,
    },
    AnthropicToOpenAIChat(AnthropicToOpenAIChatStream),
    AnthropicToOpenAIResponses(AnthropicToOpenAIResponsesStream),
    AnthropicToGemini(AnthropicToGeminiStream),
    OpenAIChatToAnthropic(OpenAIChatToAnthropicStream),
    OpenAIChatToOpenAIResponses(OpenAIChatToOpenAIResponsesStream),
    OpenAIChatToGemini(OpenAIChatToGeminiStream),
    OpenAIResponsesToAnthropic(OpenAIResponsesToAnthropicStream),
    OpenAIResponsesToOpenAIChat(OpenAIResponsesToOpenAIChatStream),
    OpenAIResponsesToGemini(OpenAIResponsesToGeminiStream),
    GeminiToAnthropic(GeminiToAnthropicStream),
    GeminiToOpenAIChat(GeminiToOpenAIChatStream),
    GeminiToOpenAIResponses(GeminiToOpenAIResponsesStream),
}

impl StreamTransformer {
    /// `model` is the client-facing model name carried into synthesized
    /// identity events.
    pub fn new(ctx: &TransformContext, model: &str) -> Self {
        match (ctx.upstream, ctx.client) {
            (upstream, client) if upstream == client => StreamTransformer::Passthrough {
                proto: upstream,
                finished: false,
            },
            (Proto::Anthropic, Proto::OpenAIChat) => {
                StreamTransformer::AnthropicToOpenAIChat(AnthropicToOpenAIChatStream::new(model))
            }
            (Proto::Anthropic, Proto::OpenAIResponses) => {
                StreamTransformer::AnthropicToOpenAIResponses(
                    AnthropicToOpenAIResponsesStream::new(model),
                )
            }
            (Proto::Anthropic, Proto::Gemini) => {
                StreamTransformer::AnthropicToGemini(AnthropicToGeminiStream::new(model))
            }
            (Proto::OpenAIChat, Proto::Anthropic) => {
                StreamTransformer::OpenAIChatToAnthropic(OpenAIChatToAnthropicStream::new(model))
            }
            (Proto::OpenAIChat, Proto::OpenAIResponses) => {
                StreamTransformer::OpenAIChatToOpenAIResponses(
                    OpenAIChatToOpenAIResponsesStream::new(model),
                )
            }
            (Proto::OpenAIChat, Proto::Gemini) => {
                StreamTransformer::OpenAIChatToGemini(OpenAIChatToGeminiStream::new(model))
            }
            (Proto::OpenAIResponses, Proto::Anthropic) => {
                StreamTransformer::OpenAIResponsesToAnthropic(
                    OpenAIResponsesToAnthropicStream::new(model),
                )
            }
            (Proto::OpenAIResponses, Proto::OpenAIChat) => {
                StreamTransformer::OpenAIResponsesToOpenAIChat(
                    OpenAIResponsesToOpenAIChatStream::new(model),
                )
            }
            (Proto::OpenAIResponses, Proto::Gemini) => {
                StreamTransformer::OpenAIResponsesToGemini(OpenAIResponsesToGeminiStream::new(
                    model,
                ))
            }
            (Proto::Gemini, Proto::Anthropic) => {
                StreamTransformer::GeminiToAnthropic(GeminiToAnthropicStream::new(model))
            }
            (Proto::Gemini, Proto::OpenAIChat) => {
                StreamTransformer::GeminiToOpenAIChat(GeminiToOpenAIChatStream::new(model))
            }
            (Proto::Gemini, Proto::OpenAIResponses) => {
                StreamTransformer::GeminiToOpenAIResponses(GeminiToOpenAIResponsesStream::new(
                    model,
                ))
            }
            // Equal pairs are handled by the first arm.
            _ => unreachable!("equal protocols take the passthrough arm"),
        }
    }

    pub fn push(&mut self, event: StreamEvent) -> Result<Vec<StreamEvent>, TransformError> {
        match self {
            StreamTransformer::Passthrough { proto, finished } => {
                if event.proto() != *proto {
                    return Err(TransformError::ProtoMismatch);
                }
                if *finished {
                    return Ok(Vec::new());
                }
                *finished = passthrough_terminal(&event);
                Ok(vec![event])
            }
            StreamTransformer::AnthropicToOpenAIChat(machine) => match event {
                StreamEvent::Anthropic(event) => Ok(machine
                    .push(event)
                    .into_iter()
                    .map(StreamEvent::OpenAIChat)
                    .collect()),
                _ => Err(TransformError::ProtoMismatch),
            },
            StreamTransformer::AnthropicToOpenAIResponses(machine) => match event {
                StreamEvent::Anthropic(event) => Ok(machine
                    .push(event)
                    .into_iter()
                    .map(StreamEvent::OpenAIResponses)
                    .collect()),
                _ => Err(TransformError::ProtoMismatch),
            },
            StreamTransformer::AnthropicToGemini(machine) => match event {
                StreamEvent::Anthropic(event) => Ok(machine
                    .push(event)
                    .into_iter()
                    .map(StreamEvent::Gemini)
                    .collect()),
                _ => Err(TransformError::ProtoMismatch),
            },
            StreamTransformer::OpenAIChatToAnthropic(machine) => match event {
                StreamEvent::OpenAIChat(chunk) => Ok(machine
                    .push(chunk)
                    .into_iter()
                    .map(StreamEvent::Anthropic)
                    .collect()),
                _ => Err(TransformError::ProtoMismatch),
            },
            StreamTransformer::OpenAIChatToOpenAIResponses(machine) => match event {
                StreamEvent::OpenAIChat(chunk) => Ok(machine
                    .push(chunk)
                    .into_iter()
                    .map(StreamEvent::OpenAIResponses)
                    .collect()),
                _ => Err(TransformError::ProtoMismatch),
            },
            StreamTransformer::OpenAIChatToGemini(machine) => match event {
                StreamEvent::OpenAIChat(chunk) => Ok(machine
                    .push(chunk)
                    .into_iter()
                    .map(StreamEvent::Gemini)
                    .collect()),
                _ => Err(TransformError::ProtoMismatch),
            },
            StreamTransformer::OpenAIResponsesToAnthropic(machine) => match event {
                StreamEvent::OpenAIResponses(event) => Ok(machine
                    .push(event)
                    .into_iter()
                    .map(StreamEvent::Anthropic)
                    .collect()),
                _ => Err(TransformError::ProtoMismatch),
            },
            StreamTransformer::OpenAIResponsesToOpenAIChat(machine) => match event {
                StreamEvent::OpenAIResponses(event) => Ok(machine
                    .push(event)
                    .into_iter()
                    .map(StreamEvent::OpenAIChat)
                    .collect()),
                _ => Err(TransformError::ProtoMismatch),
            },
            StreamTransformer::OpenAIResponsesToGemini(machine) => match event {
                StreamEvent::OpenAIResponses(event) => Ok(machine
                    .push(event)
                    .into_iter()
                    .map(StreamEvent::Gemini)
                    .collect()),
                _ => Err(TransformError::ProtoMismatch),
            },
            StreamTransformer::GeminiToAnthropic(machine) => match event {
                StreamEvent::Gemini(chunk) => Ok(machine
                    .push(chunk)
                    .into_iter()
                    .map(StreamEvent::Anthropic)
                    .collect()),
                _ => Err(TransformError::ProtoMismatch),
            },
            StreamTransformer::GeminiToOpenAIChat(machine) => match event {
                StreamEvent::Gemini(chunk) => Ok(machine
                    .push(chunk)
                    .into_iter()
                    .map(StreamEvent::OpenAIChat)
                    .collect()),
                _ => Err(TransformError::ProtoMismatch),
            },
            StreamTransformer::GeminiToOpenAIResponses(machine) => match event {
                StreamEvent::Gemini(chunk) => Ok(machine
                    .push(chunk)
                    .into_iter()
                    .map(StreamEvent::OpenAIResponses)
                    .collect()),
                _ => Err(TransformError::ProtoMismatch),
            },
        }
    }

    /// Driven by the upstream terminator (`[DONE]` or EOF).
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        match self {
            StreamTransformer::Passthrough { finished, .. } => {
                *finished = true;
                Vec::new()
            }
            StreamTransformer::AnthropicToOpenAIChat(machine) => machine
                .finish()
                .into_iter()
                .map(StreamEvent::OpenAIChat)
                .collect(),
            StreamTransformer::AnthropicToOpenAIResponses(machine) => machine
                .finish()
                .into_iter()
                .map(StreamEvent::OpenAIResponses)
                .collect(),
            StreamTransformer::AnthropicToGemini(machine) => machine
                .finish()
                .into_iter()
                .map(StreamEvent::Gemini)
                .collect(),
            StreamTransformer::OpenAIChatToAnthropic(machine) => machine
                .finish()
                .into_iter()
                .map(StreamEvent::Anthropic)
                .collect(),
            StreamTransformer::OpenAIChatToOpenAIResponses(machine) => machine
                .finish()
                .into_iter()
                .map(StreamEvent::OpenAIResponses)
                .collect(),
            StreamTransformer::OpenAIChatToGemini(machine) => machine
                .finish()
                .into_iter()
                .map(StreamEvent::Gemini)
                .collect(),
            StreamTransformer::OpenAIResponsesToAnthropic(machine) => machine
                .finish()
                .into_iter()
                .map(StreamEvent::Anthropic)
                .collect(),
            StreamTransformer::OpenAIResponsesToOpenAIChat(machine) => machine
                .finish()
                .into_iter()
                .map(StreamEvent::OpenAIChat)
                .collect(),
            StreamTransformer::OpenAIResponsesToGemini(machine) => machine
                .finish()
                .into_iter()
                .map(StreamEvent::Gemini)
                .collect(),
            StreamTransformer::GeminiToAnthropic(machine) => machine
                .finish()
                .into_iter()
                .map(StreamEvent::Anthropic)
                .collect(),
            StreamTransformer::GeminiToOpenAIChat(machine) => machine
                .finish()
                .into_iter()
                .map(StreamEvent::OpenAIChat)
                .collect(),
            StreamTransformer::GeminiToOpenAIResponses(machine) => machine
                .finish()
                .into_iter()
                .map(StreamEvent::OpenAIResponses)
                .collect(),
        }
    }

    /// True once the terminal outbound events have been emitted. Usage is
    /// recorded only when this holds.
    pub fn finished(&self) -> bool {
        match self {
            StreamTransformer::Passthrough { finished, .. } => *finished,
            StreamTransformer::AnthropicToOpenAIChat(machine) => machine.finished(),
            StreamTransformer::AnthropicToOpenAIResponses(machine) => machine.finished(),
            StreamTransformer::AnthropicToGemini(machine) => machine.finished(),
            StreamTransformer::OpenAIChatToAnthropic(machine) => machine.finished(),
            StreamTransformer::OpenAIChatToOpenAIResponses(machine) => machine.finished(),
            StreamTransformer::OpenAIChatToGemini(machine) => machine.finished(),
            StreamTransformer::OpenAIResponsesToAnthropic(machine) => machine.finished(),
            StreamTransformer::OpenAIResponsesToOpenAIChat(machine) => machine.finished(),
            StreamTransformer::OpenAIResponsesToGemini(machine) => machine.finished(),
            StreamTransformer::GeminiToAnthropic(machine) => machine.finished(),
            StreamTransformer::GeminiToOpenAIChat(machine) => machine.finished(),
            StreamTransformer::GeminiToOpenAIResponses(machine) => machine.finished(),
        }
    }
}

fn passthrough_terminal(event: &StreamEvent) -> bool {
    match event {
        StreamEvent::Anthropic(event) => event.is_terminal(),
        StreamEvent::OpenAIResponses(event) => event.is_terminal(),
        StreamEvent::Gemini(chunk) => chunk
            .candidates
            .iter()
            .any(|candidate| candidate.finish_reason.is_some()),
        // Chat streams finish on the [DONE] sentinel, which arrives via
        // `finish`.
        StreamEvent::OpenAIChat(_) => false,
    }
}
