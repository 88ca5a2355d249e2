//! Usage extraction: from typed responses, from stream events, and from raw
//! upstream JSON in both naming conventions. Counts are copied, never
//! recomputed.

use serde_json::Value as JsonValue;

use agw_protocol::anthropic::stream::StreamEvent as AnthropicStreamEvent;
use agw_protocol::openai_responses::stream::ResponseStreamEvent;

use crate::middleware::{GenerateResponse, Proto, StreamEvent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSummary {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
}

/// Watches the upstream event stream and keeps the latest usage totals.
/// Streamed usage is cumulative on every wire, so latest wins per field.
#[derive(Debug, Clone)]
pub struct UsageAccumulator {
    proto: Proto,
    latest: UsageSummary,
    seen: bool,
}

impl UsageAccumulator {
    pub fn new(proto: Proto) -> Self {
        Self {
            proto,
            latest: UsageSummary::default(),
            seen: false,
        }
    }

    pub fn push(&mut self, event: &StreamEvent) {
        let incoming = match (self.proto, event) {
            (Proto::Anthropic, StreamEvent::Anthropic(event)) => usage_from_anthropic_event(event),
            (Proto::OpenAIChat, StreamEvent::OpenAIChat(chunk)) => {
                chunk.usage.as_ref().map(|usage| UsageSummary {
                    input_tokens: Some(usage.prompt_tokens),
                    output_tokens: Some(usage.completion_tokens),
                })
            }
            (Proto::OpenAIResponses, StreamEvent::OpenAIResponses(event)) => {
                usage_from_responses_event(event)
            }
            (Proto::Gemini, StreamEvent::Gemini(chunk)) => {
                chunk.usage_metadata.as_ref().map(|usage| UsageSummary {
                    input_tokens: usage.prompt_token_count,
                    output_tokens: usage.candidates_token_count,
                })
            }
            _ => None,
        };

        if let Some(incoming) = incoming {
            if incoming.input_tokens.is_some() {
                self.latest.input_tokens = incoming.input_tokens;
            }
            if incoming.output_tokens.is_some() {
                self.latest.output_tokens = incoming.output_tokens;
            }
            self.seen = true;
        }
    }

    pub fn finalize(&self) -> Option<UsageSummary> {
        self.seen.then_some(self.latest)
    }
}

fn usage_from_anthropic_event(event: &AnthropicStreamEvent) -> Option<UsageSummary> {
    match event {
        AnthropicStreamEvent::MessageStart { message } => Some(UsageSummary {
            input_tokens: message.usage.input_tokens,
            output_tokens: message.usage.output_tokens,
        }),
        AnthropicStreamEvent::MessageDelta { usage, .. } => usage.map(|usage| UsageSummary {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }),
        _ => None,
    }
}

fn usage_from_responses_event(event: &ResponseStreamEvent) -> Option<UsageSummary> {
    let response = match event {
        ResponseStreamEvent::Created { response, .. }
        | ResponseStreamEvent::InProgress { response, .. }
        | ResponseStreamEvent::Completed { response, .. }
        | ResponseStreamEvent::Incomplete { response, .. }
        | ResponseStreamEvent::Failed { response, .. } => Some(response),
        _ => None,
    };
    response.and_then(|response| {
        response.usage.map(|usage| UsageSummary {
            input_tokens: Some(usage.input_tokens),
            output_tokens: Some(usage.output_tokens),
        })
    })
}

pub fn usage_from_response(resp: &GenerateResponse) -> Option<UsageSummary> {
    match resp {
        GenerateResponse::Anthropic(resp) => Some(UsageSummary {
            input_tokens: Some(resp.usage.input_tokens),
            output_tokens: Some(resp.usage.output_tokens),
        }),
        GenerateResponse::OpenAIChat(resp) => resp.usage.map(|usage| UsageSummary {
            input_tokens: Some(usage.prompt_tokens),
            output_tokens: Some(usage.completion_tokens),
        }),
        GenerateResponse::OpenAIResponses(resp) => resp.usage.map(|usage| UsageSummary {
            input_tokens: Some(usage.input_tokens),
            output_tokens: Some(usage.output_tokens),
        }),
        GenerateResponse::Gemini(resp) => resp.usage_metadata.map(|usage| UsageSummary {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        }),
    }
}

/// Read usage out of a raw upstream body. Accepts every wire's field names;
/// snake_case wins when both spellings are present.
pub fn usage_from_raw(body: &JsonValue) -> Option<UsageSummary> {
    if let Some(usage) = body.get("usage") {
        let input = int_field(usage, &["input_tokens", "prompt_tokens", "promptTokens"]);
        let output = int_field(
            usage,
            &["output_tokens", "completion_tokens", "completionTokens"],
        );
        if input.is_some() || output.is_some() {
            return Some(UsageSummary {
                input_tokens: input,
                output_tokens: output,
            });
        }
    }

    let metadata = body.get("usageMetadata").or_else(|| body.get("usage_metadata"))?;
    let input = int_field(metadata, &["prompt_token_count", "promptTokenCount"]);
    let output = int_field(metadata, &["candidates_token_count", "candidatesTokenCount"]);
    (input.is_some() || output.is_some()).then_some(UsageSummary {
        input_tokens: input,
        output_tokens: output,
    })
}

fn int_field(value: &JsonValue, names: &[&str]) -> Option<i32> {
    names
        .iter()
        .find_map(|name| value.get(name))
        .and_then(JsonValue::as_i64)
        .map(|value| value.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_extraction_prefers_snake_case() {
        let body = json!({"usage": {
            "input_tokens": 3,
            "promptTokens": 99,
            "output_tokens": 4,
        }});
        assert_eq!(
            usage_from_raw(&body),
            Some(UsageSummary {
                input_tokens: Some(3),
                output_tokens: Some(4),
            })
        );
    }

    #[test]
    fn raw_extraction_reads_openai_and_gemini_conventions() {
        let openai = json!({"usage": {"prompt_tokens": 2, "completion_tokens": 5}});
        assert_eq!(
            usage_from_raw(&openai),
            Some(UsageSummary {
                input_tokens: Some(2),
                output_tokens: Some(5),
            })
        );

        let gemini = json!({"usageMetadata": {
            "promptTokenCount": 7,
            "candidatesTokenCount": 8,
        }});
        assert_eq!(
            usage_from_raw(&gemini),
            Some(UsageSummary {
                input_tokens: Some(7),
                output_tokens: Some(8),
            })
        );
    }

    #[test]
    fn absent_usage_stays_absent() {
        assert_eq!(usage_from_raw(&json!({"id": "x"})), None);
    }

    #[test]
    fn accumulator_keeps_latest_per_field() {
        let mut accumulator = UsageAccumulator::new(Proto::OpenAIChat);
        assert_eq!(accumulator.finalize(), None);

        let chunk: agw_protocol::openai_chat::stream::ChatCompletionChunk =
            serde_json::from_value(json!({
                "id": "c", "object": "chat.completion.chunk", "created": 0, "model": "m",
                "choices": [],
                "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3},
            }))
            .unwrap();
        accumulator.push(&StreamEvent::OpenAIChat(chunk));
        assert_eq!(
            accumulator.finalize(),
            Some(UsageSummary {
                input_tokens: Some(1),
                output_tokens: Some(2),
            })
        );
    }
}
