//! The (inbound, outbound) pipeline: serialize the converted request, call
//! the right adapter, and either convert one buffered body back or pump the
//! SSE stream through the per-request state machine.

use std::sync::Arc;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use agw_protocol::sse::{data_frame, done_frame, is_done_payload, named_frame, StreamDecoder};
use agw_provider::adapter::{
    AnthropicAdapter, BufferedReply, GeminiAdapter, OpenAIChatAdapter, OpenAIResponsesAdapter,
    StreamingReply,
};
use agw_provider::config::ProviderConfig;
use agw_transform::middleware::{
    transform_response, GenerateRequest, GenerateResponse, Proto, StreamEvent, StreamTransformer,
    TransformContext,
};
use agw_transform::usage::{usage_from_raw, UsageAccumulator};

use crate::error::GatewayError;
use crate::state::CoreState;

/// Everything the pump needs beyond the converted request body.
pub struct CallPlan {
    pub ctx: TransformContext,
    pub endpoint: &'static str,
    pub key_id: String,
    /// The model name the client asked for; all client-facing output carries
    /// it.
    pub client_model: String,
    /// The model forwarded upstream (possibly rewritten by the resolver).
    pub upstream_model: String,
}

pub async fn run_buffered(
    state: Arc<CoreState>,
    plan: CallPlan,
    config: &ProviderConfig,
    secret: String,
    outbound: GenerateRequest,
) -> Result<Response, GatewayError> {
    let body = serialize_request(&outbound)?;
    let reply = call_buffered(&state, &plan, config, secret, body).await?;

    if !(200..300).contains(&reply.status) {
        return Err(GatewayError::Upstream {
            status: StatusCode::from_u16(reply.status)
                .unwrap_or(StatusCode::BAD_GATEWAY),
            body: reply.body,
        });
    }

    // Usage is read off the raw body in whichever naming convention the
    // upstream used; absent usage stays unrecorded.
    if let Ok(raw) = serde_json::from_slice::<serde_json::Value>(&reply.body) {
        if let Some(usage) = usage_from_raw(&raw) {
            state.usage.record_usage(
                &plan.key_id,
                plan.endpoint,
                &plan.client_model,
                usage.input_tokens.unwrap_or(0),
                usage.output_tokens.unwrap_or(0),
                reply.status,
            );
        }
    }

    let upstream_resp = parse_response(plan.ctx.upstream, &reply.body)?;
    let client_resp = transform_response(&plan.ctx, upstream_resp, &plan.client_model)?;
    let body = serialize_response(&client_resp)?;

    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() =
        StatusCode::from_u16(reply.status).unwrap_or(StatusCode::OK);
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(resp)
}

pub async fn run_streaming(
    state: Arc<CoreState>,
    plan: CallPlan,
    config: &ProviderConfig,
    secret: String,
    outbound: GenerateRequest,
) -> Result<Response, GatewayError> {
    let body = serialize_request(&outbound)?;
    let reply = call_streaming(&state, &plan, config, secret, body).await?;

    let (status, upstream_rx) = match reply {
        StreamingReply::Stream { status, rx } => (status, rx),
        // Failed before the stream started: propagate the upstream status
        // and body.
        StreamingReply::Error { status, body } => {
            return Err(GatewayError::Upstream {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                body,
            });
        }
    };

    let (tx, rx) = mpsc::channel::<Result<Bytes, std::convert::Infallible>>(16);
    tokio::spawn(pump_stream(state, plan, upstream_rx, tx));

    let mut resp = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    *resp.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(resp)
}

/// Per-request stream pump: decode upstream framing, step the machine,
/// write each outbound frame. Client disconnects surface as send failures;
/// the whole exchange dies with the stream deadline.
async fn pump_stream(
    state: Arc<CoreState>,
    plan: CallPlan,
    mut upstream_rx: mpsc::Receiver<Bytes>,
    tx: mpsc::Sender<Result<Bytes, std::convert::Infallible>>,
) {
    let deadline = tokio::time::Instant::now() + state.stream_deadline;
    let mut decoder = StreamDecoder::new();
    let mut transformer = StreamTransformer::new(&plan.ctx, &plan.client_model);
    let mut accumulator = UsageAccumulator::new(plan.ctx.upstream);
    let mut malformed = 0u64;

    let reason = 'read: loop {
        let next = tokio::time::timeout_at(deadline, upstream_rx.recv()).await;
        let chunk = match next {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break 'read EndReason::Eof,
            Err(_) => {
                warn!(
                    endpoint = plan.endpoint,
                    "stream deadline exceeded, cancelling both sides"
                );
                break 'read EndReason::Deadline;
            }
        };

        for payload in decoder.push(&chunk) {
            if !process_payload(
                &payload,
                &plan,
                &mut transformer,
                &mut accumulator,
                &mut malformed,
                &tx,
            )
            .await
            {
                break 'read EndReason::ClientGone;
            }
            if transformer.finished() {
                break 'read EndReason::Finished;
            }
        }
    };

    let mut client_connected = !matches!(reason, EndReason::ClientGone);
    if matches!(reason, EndReason::Eof) {
        for payload in decoder.finish() {
            if transformer.finished() {
                break;
            }
            if !process_payload(
                &payload,
                &plan,
                &mut transformer,
                &mut accumulator,
                &mut malformed,
                &tx,
            )
            .await
            {
                client_connected = false;
                break;
            }
        }
        // EOF without an explicit terminator: close the outbound grammar.
        if client_connected && !transformer.finished() {
            let events = transformer.finish();
            client_connected = write_events(&plan, &events, &tx).await;
        }
    }
    // On deadline or client disconnect the machine is discarded as-is: no
    // terminal events are synthesized after the fact.

    if transformer.finished() {
        if client_connected && wants_done_sentinel(plan.ctx.client) {
            let _ = tx.send(Ok(done_frame())).await;
        }
        // Recorded only because the terminal events were emitted; a stream
        // that died before its terminator records nothing.
        let usage = accumulator.finalize().unwrap_or_default();
        state.usage.record_usage(
            &plan.key_id,
            plan.endpoint,
            &plan.client_model,
            usage.input_tokens.unwrap_or(0),
            usage.output_tokens.unwrap_or(0),
            200,
        );
    }
    if malformed > 0 {
        debug!(
            endpoint = plan.endpoint,
            malformed, "skipped malformed upstream stream events"
        );
    }
}

/// Why the read loop stopped; only a clean EOF may synthesize the missing
/// close sequence.
enum EndReason {
    /// Upstream closed without an explicit terminator.
    Eof,
    /// The machine emitted its terminal events.
    Finished,
    /// The whole-stream deadline passed.
    Deadline,
    /// The client hung up; nothing more can be written.
    ClientGone,
}

/// Returns false when the client went away.
async fn process_payload(
    payload: &str,
    plan: &CallPlan,
    transformer: &mut StreamTransformer,
    accumulator: &mut UsageAccumulator,
    malformed: &mut u64,
    tx: &mpsc::Sender<Result<Bytes, std::convert::Infallible>>,
) -> bool {
    if is_done_payload(payload) {
        let events = transformer.finish();
        return write_events(plan, &events, tx).await;
    }

    let event = match StreamEvent::parse(plan.ctx.upstream, payload) {
        Ok(event) => event,
        Err(err) => {
            // Malformed lines are skipped; machine state is unchanged.
            debug!(error = %err, "unparseable upstream stream payload");
            *malformed += 1;
            return true;
        }
    };
    accumulator.push(&event);

    let events = match transformer.push(event) {
        Ok(events) => events,
        Err(err) => {
            debug!(error = %err, "stream event rejected by transformer");
            *malformed += 1;
            return true;
        }
    };
    write_events(plan, &events, tx).await
}

async fn write_events(
    plan: &CallPlan,
    events: &[StreamEvent],
    tx: &mpsc::Sender<Result<Bytes, std::convert::Infallible>>,
) -> bool {
    for event in events {
        let Some(frame) = encode_event(plan.ctx.client, event) else {
            continue;
        };
        if tx.send(Ok(frame)).await.is_err() {
            return false;
        }
    }
    true
}

/// Anthropic streams carry named events; the OpenAI-shaped and Gemini
/// streams are `data:`-only and end with `[DONE]`.
fn encode_event(client: Proto, event: &StreamEvent) -> Option<Bytes> {
    match (client, event) {
        (Proto::Anthropic, StreamEvent::Anthropic(event)) => {
            named_frame(event.event_name(), event)
        }
        (Proto::OpenAIChat, StreamEvent::OpenAIChat(chunk)) => data_frame(chunk),
        (Proto::OpenAIResponses, StreamEvent::OpenAIResponses(event)) => data_frame(event),
        (Proto::Gemini, StreamEvent::Gemini(chunk)) => data_frame(chunk),
        _ => None,
    }
}

fn wants_done_sentinel(client: Proto) -> bool {
    !matches!(client, Proto::Anthropic)
}

async fn call_buffered(
    state: &CoreState,
    plan: &CallPlan,
    config: &ProviderConfig,
    secret: String,
    body: Bytes,
) -> Result<BufferedReply, GatewayError> {
    let base_url = config.base_url(&state.base_urls).to_string();
    let client = state.upstream.as_ref();
    let reply = match plan.ctx.upstream {
        Proto::OpenAIChat => {
            OpenAIChatAdapter {
                base_url,
                secret,
            }
            .call_buffered(client, body)
            .await?
        }
        Proto::OpenAIResponses => {
            OpenAIResponsesAdapter {
                base_url,
                secret,
            }
            .call_buffered(client, body)
            .await?
        }
        Proto::Anthropic => {
            AnthropicAdapter {
                base_url,
                secret,
            }
            .call_buffered(client, body)
            .await?
        }
        Proto::Gemini => {
            GeminiAdapter {
                base_url,
                secret,
            }
            .call_buffered(client, &plan.upstream_model, body)
            .await?
        }
    };
    Ok(reply)
}

async fn call_streaming(
    state: &CoreState,
    plan: &CallPlan,
    config: &ProviderConfig,
    secret: String,
    body: Bytes,
) -> Result<StreamingReply, GatewayError> {
    let base_url = config.base_url(&state.base_urls).to_string();
    let client = state.upstream.as_ref();
    let reply = match plan.ctx.upstream {
        Proto::OpenAIChat => {
            OpenAIChatAdapter {
                base_url,
                secret,
            }
            .call_streaming(client, body)
            .await?
        }
        Proto::OpenAIResponses => {
            OpenAIResponsesAdapter {
                base_url,
                secret,
            }
            .call_streaming(client, body)
            .await?
        }
        Proto::Anthropic => {
            AnthropicAdapter {
                base_url,
                secret,
            }
            .call_streaming(client, body)
            .await?
        }
        Proto::Gemini => {
            GeminiAdapter {
                base_url,
                secret,
            }
            .call_streaming(client, &plan.upstream_model, body)
            .await?
        }
    };
    Ok(reply)
}

fn serialize_request(req: &GenerateRequest) -> Result<Bytes, GatewayError> {
    let out = match req {
        GenerateRequest::Anthropic(req) => serde_json::to_vec(req),
        GenerateRequest::OpenAIChat(req) => serde_json::to_vec(req),
        GenerateRequest::OpenAIResponses(req) => serde_json::to_vec(req),
        GenerateRequest::Gemini(req) => serde_json::to_vec(&req.body),
    };
    out.map(Bytes::from)
        .map_err(|err| GatewayError::Internal(format!("serialize outbound request: {err}")))
}

fn parse_response(upstream: Proto, body: &[u8]) -> Result<GenerateResponse, GatewayError> {
    let parsed = match upstream {
        Proto::Anthropic => serde_json::from_slice(body).map(GenerateResponse::Anthropic),
        Proto::OpenAIChat => serde_json::from_slice(body).map(GenerateResponse::OpenAIChat),
        Proto::OpenAIResponses => {
            serde_json::from_slice(body).map(GenerateResponse::OpenAIResponses)
        }
        Proto::Gemini => serde_json::from_slice(body).map(GenerateResponse::Gemini),
    };
    parsed.map_err(|err| GatewayError::Internal(format!("parse upstream response: {err}")))
}

fn serialize_response(resp: &GenerateResponse) -> Result<Bytes, GatewayError> {
    let out = match resp {
        GenerateResponse::Anthropic(resp) => serde_json::to_vec(resp),
        GenerateResponse::OpenAIChat(resp) => serde_json::to_vec(resp),
        GenerateResponse::OpenAIResponses(resp) => serde_json::to_vec(resp),
        GenerateResponse::Gemini(resp) => serde_json::to_vec(resp),
    };
    out.map(Bytes::from)
        .map_err(|err| GatewayError::Internal(format!("serialize client response: {err}")))
}
