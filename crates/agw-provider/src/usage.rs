use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

/// The quota counter tripped. Mapped to 429 at the HTTP surface.
#[derive(Debug, Clone)]
pub struct QuotaExceeded {
    pub message: String,
}

impl std::fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for QuotaExceeded {}

/// Usage-recording collaborator. Recording failures are the implementation's
/// problem; callers log and move on.
pub trait UsageRecorder: Send + Sync {
    fn check_quota(&self, key_id: &str) -> Result<(), QuotaExceeded>;

    fn record_usage(
        &self,
        key_id: &str,
        endpoint: &str,
        model: &str,
        input_tokens: i32,
        output_tokens: i32,
        status: u16,
    );
}

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    requests: u64,
    input_tokens: i64,
    output_tokens: i64,
}

/// Plain in-memory counters with an optional total-token ceiling per key.
#[derive(Debug, Default)]
pub struct MemoryUsageRecorder {
    totals: Mutex<HashMap<String, Totals>>,
    quota_tokens: Option<i64>,
}

impl MemoryUsageRecorder {
    pub fn new(quota_tokens: Option<i64>) -> Self {
        Self {
            totals: Mutex::new(HashMap::new()),
            quota_tokens,
        }
    }

    pub fn totals_for(&self, key_id: &str) -> (u64, i64, i64) {
        let guard = self.totals.lock().unwrap_or_else(|err| err.into_inner());
        let totals = guard.get(key_id).copied().unwrap_or_default();
        (totals.requests, totals.input_tokens, totals.output_tokens)
    }
}

impl UsageRecorder for MemoryUsageRecorder {
    fn check_quota(&self, key_id: &str) -> Result<(), QuotaExceeded> {
        let Some(quota) = self.quota_tokens else {
            return Ok(());
        };
        let guard = self.totals.lock().unwrap_or_else(|err| err.into_inner());
        let totals = guard.get(key_id).copied().unwrap_or_default();
        if totals.input_tokens + totals.output_tokens >= quota {
            return Err(QuotaExceeded {
                message: "token quota exceeded".to_string(),
            });
        }
        Ok(())
    }

    fn record_usage(
        &self,
        key_id: &str,
        endpoint: &str,
        model: &str,
        input_tokens: i32,
        output_tokens: i32,
        status: u16,
    ) {
        debug!(
            key_id,
            endpoint, model, input_tokens, output_tokens, status, "usage recorded"
        );
        let mut guard = self.totals.lock().unwrap_or_else(|err| err.into_inner());
        let totals = guard.entry(key_id.to_string()).or_default();
        totals.requests += 1;
        totals.input_tokens += i64::from(input_tokens);
        totals.output_tokens += i64::from(output_tokens);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_trips_once_the_ceiling_is_reached() {
        let recorder = MemoryUsageRecorder::new(Some(10));
        assert!(recorder.check_quota("k1").is_ok());
        recorder.record_usage("k1", "/v1/messages", "m", 6, 4, 200);
        assert!(recorder.check_quota("k1").is_err());
        // Other keys are unaffected.
        assert!(recorder.check_quota("k2").is_ok());
    }
}
