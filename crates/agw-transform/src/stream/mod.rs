//! Per-direction stream state machines. Each machine owns one mutable state
//! record for the lifetime of a request and is driven once per parsed
//! upstream event: `push(event) -> [outbound events]`, then `finish()` when
//! the upstream terminator (`[DONE]`, EOF) arrives. After a machine reports
//! `finished()`, further input is dropped.

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

pub(crate) fn synth_id(prefix: &str) -> String {
    format!(
        "{prefix}{}",
        time::OffsetDateTime::now_utc().unix_timestamp_nanos()
    )
}
