use std::sync::Arc;
use std::time::Duration;

use agw_provider::config::DefaultBaseUrls;
use agw_provider::credential::SecretResolver;
use agw_provider::upstream::UpstreamClient;
use agw_provider::usage::UsageRecorder;

use crate::auth::AuthProvider;

/// Shared, read-only per-process state. Everything mutable is per-request.
pub struct CoreState {
    pub auth: Arc<dyn AuthProvider>,
    pub secrets: Arc<dyn SecretResolver>,
    pub usage: Arc<dyn UsageRecorder>,
    pub upstream: Arc<dyn UpstreamClient>,
    pub base_urls: DefaultBaseUrls,
    /// Whole-stream deadline; both sides are cancelled when it passes.
    pub stream_deadline: Duration,
}
