use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use http::HeaderMap;

use agw_provider::credential::CallerCredential;

use crate::error::GatewayError;

/// Credentials the gateway issued itself carry this prefix; anything else is
/// treated as a session token and verified by the collaborator.
pub const GATEWAY_KEY_PREFIX: &str = "agw_";

pub trait AuthProvider: Send + Sync {
    fn authenticate(&self, credential: &str) -> Result<CallerCredential, GatewayError>;
}

/// Pull the caller credential out of a request: `Authorization: Bearer`,
/// `X-API-Key`, or — for Gemini-shaped clients — `x-goog-api-key` and the
/// `key` query parameter.
pub fn extract_credential(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(value) = header_value(headers, "x-api-key") {
        return Some(value);
    }
    if let Some(auth) = header_value(headers, "authorization") {
        let auth = auth.trim();
        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
        {
            return Some(token.trim().to_string());
        }
    }
    if let Some(value) = header_value(headers, "x-goog-api-key") {
        return Some(value);
    }
    query_param(query?, "key")
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

#[derive(Debug, Clone, Default)]
pub struct AuthSnapshot {
    pub keys: HashMap<String, CallerCredential>,
}

/// Snapshot-swapped credential store; the collaborator replaces whole
/// snapshots, reads are lock-free.
pub struct MemoryAuth {
    snapshot: ArcSwap<AuthSnapshot>,
}

impl MemoryAuth {
    pub fn new(snapshot: AuthSnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot),
        }
    }

    pub fn replace_snapshot(&self, snapshot: AuthSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }
}

impl AuthProvider for MemoryAuth {
    fn authenticate(&self, credential: &str) -> Result<CallerCredential, GatewayError> {
        let snapshot = self.snapshot.load();
        match snapshot.keys.get(credential) {
            Some(caller) => Ok(caller.clone()),
            None if credential.starts_with(GATEWAY_KEY_PREFIX) => {
                Err(GatewayError::Unauthorized("invalid api key".to_string()))
            }
            None => Err(GatewayError::Unauthorized(
                "invalid session token".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn credential_sources_are_tried_in_order() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer agw_b"));
        headers.insert("x-api-key", HeaderValue::from_static("agw_a"));
        assert_eq!(extract_credential(&headers, None).as_deref(), Some("agw_a"));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("bearer agw_b"));
        assert_eq!(extract_credential(&headers, None).as_deref(), Some("agw_b"));

        let headers = HeaderMap::new();
        assert_eq!(
            extract_credential(&headers, Some("alt=sse&key=agw_q")).as_deref(),
            Some("agw_q")
        );
        assert_eq!(extract_credential(&headers, Some("alt=sse")), None);
    }

    #[test]
    fn memory_auth_distinguishes_key_and_session_failures() {
        let auth = MemoryAuth::new(AuthSnapshot::default());
        let key_err = auth.authenticate("agw_missing").unwrap_err();
        assert!(key_err.to_string().contains("api key"));
        let session_err = auth.authenticate("sess-123").unwrap_err();
        assert!(session_err.to_string().contains("session token"));
    }
}
