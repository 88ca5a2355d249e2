use serde::{Deserialize, Serialize};

use agw_transform::middleware::Proto;

/// One outbound provider configuration owned by a caller. Read-only here;
/// the collaborator that stores and decrypts these never hands the core a
/// mutable view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: i64,
    pub provider_kind: ProviderKind,
    /// Absent in legacy records; normalizes to the chat protocol.
    #[serde(default)]
    pub outbound_protocol: Option<Proto>,
    #[serde(default)]
    pub base_url: Option<String>,
    pub secret: String,
    #[serde(default)]
    pub model_codes: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
}

impl ProviderConfig {
    pub fn protocol(&self) -> Proto {
        self.outbound_protocol.unwrap_or(Proto::OpenAIChat)
    }

    /// The effective base URL, falling back to the deployment defaults.
    pub fn base_url<'a>(&'a self, defaults: &'a DefaultBaseUrls) -> &'a str {
        match self.base_url.as_deref().filter(|url| !url.is_empty()) {
            Some(url) => url,
            None => defaults.for_protocol(self.protocol()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    Gemini,
    Custom,
}

#[derive(Debug, Clone)]
pub struct DefaultBaseUrls {
    pub openai: String,
    pub anthropic: String,
    pub gemini: String,
}

impl Default for DefaultBaseUrls {
    fn default() -> Self {
        Self {
            openai: "https://api.openai.com/v1".to_string(),
            anthropic: "https://api.anthropic.com/v1".to_string(),
            gemini: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

impl DefaultBaseUrls {
    pub fn for_protocol(&self, proto: Proto) -> &str {
        match proto {
            Proto::OpenAIChat | Proto::OpenAIResponses => &self.openai,
            Proto::Anthropic => &self.anthropic,
            Proto::Gemini => &self.gemini,
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_records_normalize_protocol_and_activity() {
        let config: ProviderConfig = serde_json::from_value(json!({
            "id": 1,
            "provider_kind": "custom",
            "secret": "sk-x",
        }))
        .unwrap();
        assert_eq!(config.protocol(), Proto::OpenAIChat);
        assert!(config.is_active);
        assert!(!config.is_default);

        let legacy: ProviderConfig = serde_json::from_value(json!({
            "id": 2,
            "provider_kind": "openai",
            "outbound_protocol": "openai_code",
            "secret": "sk-y",
        }))
        .unwrap();
        assert_eq!(legacy.protocol(), Proto::OpenAIResponses);
    }

    #[test]
    fn base_url_falls_back_to_deployment_defaults() {
        let defaults = DefaultBaseUrls::default();
        let config: ProviderConfig = serde_json::from_value(json!({
            "id": 1,
            "provider_kind": "anthropic",
            "outbound_protocol": "anthropic",
            "secret": "sk-x",
            "base_url": "",
        }))
        .unwrap();
        assert_eq!(config.base_url(&defaults), "https://api.anthropic.com/v1");
    }
}
