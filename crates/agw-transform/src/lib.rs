//! Protocol translation: the normalized content model, the directed request
//! and response converters, and the per-direction stream state machines.
//!
//! Everything here is pure CPU; no I/O and no shared state. One request owns
//! one [`middleware::StreamTransformer`] for its whole lifetime.

pub mod content;
pub mod middleware;
pub mod request;
pub mod response;
pub mod stream;
pub mod usage;
