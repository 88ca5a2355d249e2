//! The upstream byte pipe: one buffered or streaming HTTP exchange per
//! request. No protocol knowledge lives here; adapters build the requests.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;

#[derive(Debug)]
pub struct UpstreamRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub want_stream: bool,
}

#[derive(Debug)]
pub enum UpstreamBody {
    Bytes(Bytes),
    /// Chunks of a live response body; dropping the receiver cancels the
    /// upstream read.
    Stream(mpsc::Receiver<Bytes>),
}

#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: UpstreamBody,
}

#[derive(Debug, Clone)]
pub enum UpstreamError {
    Timeout(String),
    Transport(String),
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::Timeout(msg) => write!(f, "upstream timeout: {msg}"),
            UpstreamError::Transport(msg) => write!(f, "upstream transport error: {msg}"),
        }
    }
}

impl std::error::Error for UpstreamError {}

pub trait UpstreamClient: Send + Sync {
    fn send<'a>(
        &'a self,
        req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamError>> + Send + 'a>>;
}

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub connect_timeout: Duration,
    /// Whole-call deadline for buffered exchanges.
    pub request_timeout: Duration,
    /// Per-read idle deadline while streaming.
    pub stream_idle_timeout: Duration,
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(600),
            stream_idle_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct WreqUpstreamClient {
    client: wreq::Client,
    stream_idle_timeout: Duration,
}

impl WreqUpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        let client = wreq::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            stream_idle_timeout: config.stream_idle_timeout,
        })
    }
}

impl UpstreamClient for WreqUpstreamClient {
    fn send<'a>(
        &'a self,
        req: UpstreamRequest,
    ) -> Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = self.client.post(&req.url);
            for (name, value) in &req.headers {
                builder = builder.header(name, value);
            }
            let resp = builder
                .body(req.body)
                .send()
                .await
                .map_err(map_wreq_error)?;

            let status = resp.status().as_u16();
            let success = (200..300).contains(&status);
            if !success || !req.want_stream {
                let body = resp.bytes().await.map_err(map_wreq_error)?;
                return Ok(UpstreamResponse {
                    status,
                    body: UpstreamBody::Bytes(body),
                });
            }

            let idle = self.stream_idle_timeout;
            let (tx, rx) = mpsc::channel::<Bytes>(16);
            tokio::spawn(async move {
                let mut stream = resp.bytes_stream();
                loop {
                    let next = tokio::time::timeout(idle, stream.next()).await;
                    let Ok(item) = next else { break };
                    let Some(item) = item else { break };
                    let Ok(chunk) = item else { break };
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
            });

            Ok(UpstreamResponse {
                status,
                body: UpstreamBody::Stream(rx),
            })
        })
    }
}

fn map_wreq_error(err: wreq::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout(err.to_string())
    } else {
        UpstreamError::Transport(err.to_string())
    }
}
