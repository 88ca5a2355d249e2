use agw_protocol::gemini::response::{Candidate, GenerateContentResponse};
use agw_protocol::gemini::types::{
    Content, ContentRole, FinishReason, FunctionCall, Part, UsageMetadata,
};
use agw_protocol::openai_responses::response::Response;
use agw_protocol::openai_responses::types::{OutputContent, OutputItem, ResponseStatus};

use crate::content::parse_tool_arguments;

pub fn transform_response(resp: Response, _model: &str) -> GenerateContentResponse {
    let mut parts = Vec::new();
    for item in &resp.output {
        match item {
            OutputItem::Message(message) => {
                for part in &message.content {
                    match part {
                        OutputContent::OutputText { text } => {
                            if !text.is_empty() {
                                parts.push(Part::text(text.clone()));
                            }
                        }
                        OutputContent::Refusal { refusal } => {
                            if !refusal.is_empty() {
                                parts.push(Part::text(refusal.clone()));
                            }
                        }
                    }
                }
            }
            OutputItem::FunctionCall(call) => {
                parts.push(Part {
                    function_call: Some(FunctionCall {
                        name: call.name.clone(),
                        args: Some(parse_tool_arguments(&call.arguments)),
                    }),
                    ..Part::default()
                });
            }
        }
    }

    let incomplete_max_tokens = resp.status == ResponseStatus::Incomplete
        && resp
            .incomplete_details
            .as_ref()
            .map(|details| details.reason == "max_output_tokens")
            .unwrap_or(false);
    let finish_reason = if incomplete_max_tokens {
        FinishReason::MaxTokens
    } else {
        FinishReason::Stop
    };

    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Content {
                role: Some(ContentRole::Model),
                parts,
            },
            finish_reason: Some(finish_reason),
            index: Some(0),
        }],
        usage_metadata: resp.usage.map(|usage| UsageMetadata {
            prompt_token_count: Some(usage.input_tokens),
            candidates_token_count: Some(usage.output_tokens),
            total_token_count: Some(usage.total_tokens),
        }),
        model_version: None,
    }
}
