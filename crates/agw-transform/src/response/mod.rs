//! Buffered response converters, one module per (upstream → client)
//! direction. Every converter takes the client-facing model name; the
//! upstream's canonical model id never reaches the client.

pub mod anthropic_to_gemini;
pub mod anthropic_to_openai_chat;
pub mod anthropic_to_openai_responses;
pub mod gemini_to_anthropic;
pub mod gemini_to_openai_chat;
pub mod gemini_to_openai_responses;
pub mod openai_chat_to_anthropic;
pub mod openai_chat_to_gemini;
pub mod openai_chat_to_openai_responses;
pub mod openai_responses_to_anthropic;
pub mod openai_responses_to_gemini;
pub mod openai_responses_to_openai_chat;

pub(crate) fn epoch_seconds() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Synthesized ids use monotonic nanos, e.g. `chatcmpl-1730000000000000000`.
pub(crate) fn synth_id(prefix: &str) -> String {
    format!(
        "{prefix}{}",
        time::OffsetDateTime::now_utc().unix_timestamp_nanos()
    )
}
