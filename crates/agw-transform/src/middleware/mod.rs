mod ops;
mod stream;
mod types;

#[cfg(test)]
mod tests;

pub use ops::{transform_request, transform_response};
pub use stream::StreamTransformer;
pub use types::{
    GeminiGenerateRequest, GenerateRequest, GenerateResponse, Proto, StreamEvent,
    TransformContext, TransformError,
};
