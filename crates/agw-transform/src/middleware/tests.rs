use serde_json::json;

use agw_protocol::anthropic::types::{
    ContentBlock, MessageContent, SystemPrompt, ToolChoice as AnthropicToolChoice,
};

use super::*;
use crate::usage::{usage_from_response, UsageAccumulator};

fn ctx(client: Proto, upstream: Proto) -> TransformContext {
    TransformContext { client, upstream }
}

#[test]
fn openai_to_anthropic_system_and_tool_round_trip() {
    let req: agw_protocol::openai_chat::request::ChatCompletionRequest =
        serde_json::from_value(json!({
            "model": "claude-3-5-sonnet-20241022",
            "messages": [
                {"role": "system", "content": "sys"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "tool_calls": [
                    {"id": "call1", "type": "function",
                     "function": {"name": "sum", "arguments": "{\"a\":1}"}},
                ]},
                {"role": "tool", "tool_call_id": "call1", "content": "42"},
            ],
            "max_tokens": 256,
            "stop": "done",
        }))
        .unwrap();

    let (out, warnings) = transform_request(
        &ctx(Proto::OpenAIChat, Proto::Anthropic),
        GenerateRequest::OpenAIChat(req),
    )
    .unwrap();
    assert!(warnings.is_empty());

    let GenerateRequest::Anthropic(out) = out else {
        panic!("expected anthropic request");
    };
    assert_eq!(out.system, Some(SystemPrompt::Text("sys".to_string())));
    assert_eq!(out.max_tokens, 256);
    assert_eq!(out.stop_sequences, Some(vec!["done".to_string()]));
    assert_eq!(out.messages.len(), 3);

    // Assistant turn: the empty text block is dropped, the tool use stays.
    assert_eq!(
        out.messages[1].content,
        MessageContent::Blocks(vec![ContentBlock::ToolUse {
            id: "call1".to_string(),
            name: "sum".to_string(),
            input: json!({"a": 1}).as_object().unwrap().clone(),
        }])
    );
    // Tool reply becomes a user message holding the tool_result block.
    match &out.messages[2].content {
        MessageContent::Blocks(blocks) => match &blocks[0] {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                assert_eq!(tool_use_id, "call1");
                assert_eq!(
                    content,
                    &Some(agw_protocol::anthropic::types::ToolResultContent::Text(
                        "42".to_string()
                    ))
                );
            }
            other => panic!("unexpected block: {other:?}"),
        },
        other => panic!("unexpected content: {other:?}"),
    }
}

#[test]
fn identity_pass_normalizes_and_validates() {
    let req: agw_protocol::anthropic::request::CreateMessageRequest =
        serde_json::from_value(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 16,
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": "hi"}]},
            ],
        }))
        .unwrap();

    let (out, _) = transform_request(
        &ctx(Proto::Anthropic, Proto::Anthropic),
        GenerateRequest::Anthropic(req),
    )
    .unwrap();
    let GenerateRequest::Anthropic(out) = out else {
        panic!("expected anthropic request");
    };
    // Single text block canonicalizes to the string form.
    assert_eq!(out.messages[0].content, MessageContent::Text("hi".to_string()));
}

#[test]
fn unknown_tool_choice_is_rejected() {
    let req: agw_protocol::anthropic::request::CreateMessageRequest =
        serde_json::from_value(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 16,
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"name": "sum", "input_schema": {"type": "object"}}],
            "tool_choice": {"type": "tool", "name": "missing"},
        }))
        .unwrap();

    let err = transform_request(
        &ctx(Proto::Anthropic, Proto::OpenAIChat),
        GenerateRequest::Anthropic(req),
    )
    .unwrap_err();
    match err {
        TransformError::Invalid(invalid) => assert_eq!(invalid.field, "tool_choice"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn required_tool_choice_maps_to_any_and_back() {
    let req: agw_protocol::openai_chat::request::ChatCompletionRequest =
        serde_json::from_value(json!({
            "model": "claude-3",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"type": "function", "function": {"name": "sum"}}],
            "tool_choice": "required",
        }))
        .unwrap();

    let (out, _) = transform_request(
        &ctx(Proto::OpenAIChat, Proto::Anthropic),
        GenerateRequest::OpenAIChat(req),
    )
    .unwrap();
    let GenerateRequest::Anthropic(out) = out else {
        panic!("expected anthropic request");
    };
    assert_eq!(out.tool_choice, Some(AnthropicToolChoice::Any));
}

#[test]
fn anthropic_tool_use_response_reaches_openai_clients() {
    let resp: agw_protocol::anthropic::response::CreateMessageResponse =
        serde_json::from_value(json!({
            "id": "a1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "hello"},
                {"type": "tool_use", "id": "t1", "name": "calc", "input": {"x": 2}},
            ],
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 2, "output_tokens": 3},
        }))
        .unwrap();

    let out = transform_response(
        &ctx(Proto::OpenAIChat, Proto::Anthropic),
        GenerateResponse::Anthropic(resp),
        "gpt-facade",
    )
    .unwrap();
    let GenerateResponse::OpenAIChat(out) = out else {
        panic!("expected chat response");
    };
    assert_eq!(out.choices[0].message.content.as_deref(), Some("hello"));
    let calls = out.choices[0].message.tool_calls.as_ref().unwrap();
    assert_eq!(calls[0].function.arguments, "{\"x\":2}");
    assert_eq!(
        out.choices[0].finish_reason,
        Some(agw_protocol::openai_chat::types::FinishReason::ToolCalls)
    );
    assert_eq!(out.usage.unwrap().total_tokens, 5);

    let summary = usage_from_response(&GenerateResponse::OpenAIChat(out)).unwrap();
    assert_eq!(summary.input_tokens, Some(2));
    assert_eq!(summary.output_tokens, Some(3));
}

#[test]
fn anthropic_client_over_openai_chat_upstream_streams_six_events() {
    let mut transformer = StreamTransformer::new(
        &ctx(Proto::Anthropic, Proto::OpenAIChat),
        "claude-3-5-sonnet-20241022",
    );
    let mut accumulator = UsageAccumulator::new(Proto::OpenAIChat);

    let upstream = StreamEvent::parse(
        Proto::OpenAIChat,
        &json!({
            "id": "c1", "object": "chat.completion.chunk", "created": 0, "model": "gpt-4",
            "choices": [{"index": 0, "delta": {"content": "hi"}, "finish_reason": "stop"}],
        })
        .to_string(),
    )
    .unwrap();
    accumulator.push(&upstream);

    let mut events = transformer.push(upstream).unwrap();
    events.extend(transformer.finish());

    let names: Vec<&str> = events
        .iter()
        .map(|event| match event {
            StreamEvent::Anthropic(event) => event.event_name(),
            other => panic!("unexpected event: {other:?}"),
        })
        .collect();
    assert_eq!(
        names,
        vec![
            "message_start",
            "content_block_start",
            "content_block_delta",
            "content_block_stop",
            "message_delta",
            "message_stop",
        ]
    );
    assert!(transformer.finished());
    // No usage chunk arrived upstream, so nothing is recorded.
    assert_eq!(accumulator.finalize(), None);
}

#[test]
fn gemini_to_anthropic_max_tokens_latches_and_terminates() {
    let mut transformer = StreamTransformer::new(
        &ctx(Proto::Anthropic, Proto::Gemini),
        "claude-3-5-sonnet-20241022",
    );

    transformer
        .push(
            StreamEvent::parse(
                Proto::Gemini,
                &json!({
                    "candidates": [{"content": {"parts": [{"text": "x"}], "role": "model"}}],
                })
                .to_string(),
            )
            .unwrap(),
        )
        .unwrap();
    let events = transformer
        .push(
            StreamEvent::parse(
                Proto::Gemini,
                &json!({
                    "candidates": [{"content": {"parts": []}, "finishReason": "MAX_TOKENS"}],
                })
                .to_string(),
            )
            .unwrap(),
        )
        .unwrap();

    let delta = events
        .iter()
        .find_map(|event| match event {
            StreamEvent::Anthropic(
                agw_protocol::anthropic::stream::StreamEvent::MessageDelta { delta, .. },
            ) => Some(delta),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        delta.stop_reason,
        Some(agw_protocol::anthropic::types::StopReason::MaxTokens)
    );
    assert!(transformer.finished());
    // Late trailing events are dropped.
    assert!(transformer
        .push(
            StreamEvent::parse(
                Proto::Gemini,
                &json!({"candidates": [{"content": {"parts": [{"text": "late"}]}}]}).to_string(),
            )
            .unwrap(),
        )
        .unwrap()
        .is_empty());
}

#[test]
fn responses_client_over_openai_chat_upstream_streams_tool_call() {
    let mut transformer =
        StreamTransformer::new(&ctx(Proto::OpenAIResponses, Proto::OpenAIChat), "gpt-4.1");

    let chunks = [
        json!({
            "id": "c1", "object": "chat.completion.chunk", "created": 0, "model": "gpt-4",
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "id": "call_x", "type": "function",
                 "function": {"name": "f"}},
            ]}, "finish_reason": null}],
        }),
        json!({
            "id": "c1", "object": "chat.completion.chunk", "created": 0, "model": "gpt-4",
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{\"a\":"}},
            ]}, "finish_reason": null}],
        }),
        json!({
            "id": "c1", "object": "chat.completion.chunk", "created": 0, "model": "gpt-4",
            "choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "1}"}},
            ]}, "finish_reason": null}],
        }),
        json!({
            "id": "c1", "object": "chat.completion.chunk", "created": 0, "model": "gpt-4",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}],
        }),
    ];

    let mut events = Vec::new();
    for chunk in chunks {
        events.extend(
            transformer
                .push(StreamEvent::parse(Proto::OpenAIChat, &chunk.to_string()).unwrap())
                .unwrap(),
        );
    }
    events.extend(transformer.finish());

    use agw_protocol::openai_responses::stream::ResponseStreamEvent as E;
    let unwrap = |event: &StreamEvent| match event {
        StreamEvent::OpenAIResponses(event) => event.clone(),
        other => panic!("unexpected event: {other:?}"),
    };

    assert!(matches!(unwrap(&events[0]), E::Created { .. }));
    assert!(matches!(
        unwrap(&events[1]),
        E::OutputItemAdded {
            item: agw_protocol::openai_responses::types::OutputItem::Message(_),
            ..
        }
    ));
    assert!(matches!(unwrap(&events[2]), E::ContentPartAdded { .. }));
    match unwrap(&events[3]) {
        E::OutputItemAdded {
            item: agw_protocol::openai_responses::types::OutputItem::FunctionCall(call),
            ..
        } => {
            assert_eq!(call.call_id, "call_x");
            assert_eq!(call.name, "f");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let argument_deltas: Vec<String> = events
        .iter()
        .filter_map(|event| match unwrap(event) {
            E::FunctionCallArgumentsDelta { delta, .. } => Some(delta),
            _ => None,
        })
        .collect();
    assert_eq!(argument_deltas, vec!["{\"a\":".to_string(), "1}".to_string()]);

    match unwrap(events.last().unwrap()) {
        E::Completed { response, .. } => {
            assert_eq!(
                response.status,
                agw_protocol::openai_responses::types::ResponseStatus::Completed
            );
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn text_bytes_survive_every_direction_unchanged() {
    // P5: concatenated outbound text deltas equal the upstream text.
    let pieces = ["stre", "amed ", "text"];
    for client in [Proto::Anthropic, Proto::OpenAIResponses, Proto::Gemini] {
        let mut transformer = StreamTransformer::new(
            &TransformContext {
                client,
                upstream: Proto::OpenAIChat,
            },
            "m",
        );
        let mut collected = String::new();
        for piece in pieces {
            let chunk = json!({
                "id": "c1", "object": "chat.completion.chunk", "created": 0, "model": "gpt-4",
                "choices": [{"index": 0, "delta": {"content": piece}, "finish_reason": null}],
            });
            let events = transformer
                .push(StreamEvent::parse(Proto::OpenAIChat, &chunk.to_string()).unwrap())
                .unwrap();
            for event in events {
                match event {
                    StreamEvent::Anthropic(
                        agw_protocol::anthropic::stream::StreamEvent::ContentBlockDelta {
                            delta:
                                agw_protocol::anthropic::stream::ContentBlockDelta::TextDelta {
                                    text,
                                },
                            ..
                        },
                    ) => collected.push_str(&text),
                    StreamEvent::OpenAIResponses(
                        agw_protocol::openai_responses::stream::ResponseStreamEvent::OutputTextDelta {
                            delta,
                            ..
                        },
                    ) => collected.push_str(&delta),
                    StreamEvent::Gemini(chunk) => {
                        for candidate in &chunk.candidates {
                            for part in &candidate.content.parts {
                                if let Some(text) = &part.text {
                                    collected.push_str(text);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        assert_eq!(collected, pieces.concat(), "direction {client:?}");
    }
}
