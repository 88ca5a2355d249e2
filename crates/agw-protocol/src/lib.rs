//! Wire-level types for the four chat protocols the gateway speaks.
//!
//! Each module mirrors one provider's JSON faithfully; no conversion logic
//! lives here. `sse` holds the incremental codecs shared by every streaming
//! path.

pub mod anthropic;
pub mod gemini;
pub mod openai_chat;
pub mod openai_responses;
pub mod sse;
