//! One thin adapter per outbound protocol. Each knows its URL shape and its
//! protocol-fixed headers and offers a buffered and a streaming call; no
//! translation logic lives here.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::upstream::{
    UpstreamBody, UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse,
};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Buffered reply: raw bytes so non-2xx bodies pass through verbatim.
#[derive(Debug)]
pub struct BufferedReply {
    pub status: u16,
    pub body: Bytes,
}

/// Streaming reply: a live byte stream on success, buffered bytes when the
/// upstream failed before streaming.
#[derive(Debug)]
pub enum StreamingReply {
    Stream { status: u16, rx: mpsc::Receiver<Bytes> },
    Error { status: u16, body: Bytes },
}

#[derive(Debug, Clone)]
pub struct OpenAIChatAdapter {
    pub base_url: String,
    pub secret: String,
}

impl OpenAIChatAdapter {
    pub async fn call_buffered(
        &self,
        client: &dyn UpstreamClient,
        body: Bytes,
    ) -> Result<BufferedReply, UpstreamError> {
        buffered(client, self.request(body, false)).await
    }

    pub async fn call_streaming(
        &self,
        client: &dyn UpstreamClient,
        body: Bytes,
    ) -> Result<StreamingReply, UpstreamError> {
        streaming(client, self.request(body, true)).await
    }

    fn request(&self, body: Bytes, want_stream: bool) -> UpstreamRequest {
        UpstreamRequest {
            url: format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
            headers: bearer_headers(&self.secret),
            body,
            want_stream,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAIResponsesAdapter {
    pub base_url: String,
    pub secret: String,
}

impl OpenAIResponsesAdapter {
    pub async fn call_buffered(
        &self,
        client: &dyn UpstreamClient,
        body: Bytes,
    ) -> Result<BufferedReply, UpstreamError> {
        buffered(client, self.request(body, false)).await
    }

    pub async fn call_streaming(
        &self,
        client: &dyn UpstreamClient,
        body: Bytes,
    ) -> Result<StreamingReply, UpstreamError> {
        streaming(client, self.request(body, true)).await
    }

    fn request(&self, body: Bytes, want_stream: bool) -> UpstreamRequest {
        UpstreamRequest {
            url: format!("{}/responses", self.base_url.trim_end_matches('/')),
            headers: bearer_headers(&self.secret),
            body,
            want_stream,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    pub base_url: String,
    pub secret: String,
}

impl AnthropicAdapter {
    pub async fn call_buffered(
        &self,
        client: &dyn UpstreamClient,
        body: Bytes,
    ) -> Result<BufferedReply, UpstreamError> {
        buffered(client, self.request(body, false)).await
    }

    pub async fn call_streaming(
        &self,
        client: &dyn UpstreamClient,
        body: Bytes,
    ) -> Result<StreamingReply, UpstreamError> {
        streaming(client, self.request(body, true)).await
    }

    fn request(&self, body: Bytes, want_stream: bool) -> UpstreamRequest {
        UpstreamRequest {
            url: format!("{}/messages", self.base_url.trim_end_matches('/')),
            headers: vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("x-api-key".to_string(), self.secret.clone()),
                (
                    "anthropic-version".to_string(),
                    ANTHROPIC_VERSION.to_string(),
                ),
            ],
            body,
            want_stream,
        }
    }
}

/// The model travels in the URL; the key rides as a query parameter and
/// streams request SSE framing explicitly.
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    pub base_url: String,
    pub secret: String,
}

impl GeminiAdapter {
    pub async fn call_buffered(
        &self,
        client: &dyn UpstreamClient,
        model: &str,
        body: Bytes,
    ) -> Result<BufferedReply, UpstreamError> {
        buffered(client, self.request(model, body, false)).await
    }

    pub async fn call_streaming(
        &self,
        client: &dyn UpstreamClient,
        model: &str,
        body: Bytes,
    ) -> Result<StreamingReply, UpstreamError> {
        streaming(client, self.request(model, body, true)).await
    }

    fn request(&self, model: &str, body: Bytes, want_stream: bool) -> UpstreamRequest {
        let base = self.base_url.trim_end_matches('/');
        let url = if want_stream {
            format!(
                "{base}/models/{model}:streamGenerateContent?alt=sse&key={}",
                self.secret
            )
        } else {
            format!("{base}/models/{model}:generateContent?key={}", self.secret)
        };
        UpstreamRequest {
            url,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body,
            want_stream,
        }
    }
}

fn bearer_headers(secret: &str) -> Vec<(String, String)> {
    vec![
        ("content-type".to_string(), "application/json".to_string()),
        ("authorization".to_string(), format!("Bearer {secret}")),
    ]
}

async fn buffered(
    client: &dyn UpstreamClient,
    req: UpstreamRequest,
) -> Result<BufferedReply, UpstreamError> {
    let resp = client.send(req).await?;
    Ok(BufferedReply {
        status: resp.status,
        body: collect_body(resp).await,
    })
}

async fn streaming(
    client: &dyn UpstreamClient,
    req: UpstreamRequest,
) -> Result<StreamingReply, UpstreamError> {
    let resp = client.send(req).await?;
    match resp.body {
        UpstreamBody::Stream(rx) => Ok(StreamingReply::Stream {
            status: resp.status,
            rx,
        }),
        UpstreamBody::Bytes(body) => Ok(StreamingReply::Error {
            status: resp.status,
            body,
        }),
    }
}

async fn collect_body(resp: UpstreamResponse) -> Bytes {
    match resp.body {
        UpstreamBody::Bytes(body) => body,
        UpstreamBody::Stream(mut rx) => {
            let mut out = Vec::new();
            while let Some(chunk) = rx.recv().await {
                out.extend_from_slice(&chunk);
            }
            Bytes::from(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_urls_carry_key_and_sse_marker() {
        let adapter = GeminiAdapter {
            base_url: "https://generativelanguage.googleapis.com/v1beta/".to_string(),
            secret: "k1".to_string(),
        };
        let buffered = adapter.request("gemini-1.5-pro", Bytes::new(), false);
        assert_eq!(
            buffered.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:generateContent?key=k1"
        );
        let streaming = adapter.request("gemini-1.5-pro", Bytes::new(), true);
        assert!(streaming.url.contains(":streamGenerateContent?alt=sse&key=k1"));
    }

    #[test]
    fn anthropic_headers_are_protocol_fixed() {
        let adapter = AnthropicAdapter {
            base_url: "https://api.anthropic.com/v1".to_string(),
            secret: "sk-ant".to_string(),
        };
        let req = adapter.request(Bytes::new(), false);
        assert_eq!(req.url, "https://api.anthropic.com/v1/messages");
        assert!(req
            .headers
            .iter()
            .any(|(name, value)| name == "x-api-key" && value == "sk-ant"));
        assert!(req
            .headers
            .iter()
            .any(|(name, value)| name == "anthropic-version" && value == ANTHROPIC_VERSION));
    }
}
