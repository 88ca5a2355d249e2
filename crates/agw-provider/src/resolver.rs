use crate::config::{ProviderConfig, ProviderKind};
use crate::credential::CallerCredential;

#[derive(Debug, Clone)]
pub struct Resolution {
    pub config: ProviderConfig,
    /// Either the requested model or, on the catch-all path, the chosen
    /// config's first model code.
    pub resolved_model: String,
    /// True when the model matched a config's model codes exactly.
    pub matched: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    NoConfigs,
    NoActiveConfigs,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::NoConfigs => write!(f, "caller has no provider configs"),
            ResolveError::NoActiveConfigs => write!(f, "caller has no active provider configs"),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Map a requested model to one provider configuration. First match wins:
/// exact model-code match, then the built-in prefix classifier, then the
/// caller's first active config as a catch-all (substituting its first model
/// code so a default config can service unknown models).
pub fn resolve(
    credential: &CallerCredential,
    requested_model: &str,
) -> Result<Resolution, ResolveError> {
    if credential.configs.is_empty() {
        return Err(ResolveError::NoConfigs);
    }

    let active: Vec<&ProviderConfig> = credential
        .configs
        .iter()
        .filter(|config| config.is_active)
        .collect();
    let Some(first_active) = active.first() else {
        return Err(ResolveError::NoActiveConfigs);
    };

    for config in &active {
        if config
            .model_codes
            .iter()
            .any(|code| code == requested_model)
        {
            return Ok(Resolution {
                config: (*config).clone(),
                resolved_model: requested_model.to_string(),
                matched: true,
            });
        }
    }

    if let Some(kind) = classify_model(requested_model) {
        let of_kind: Vec<&&ProviderConfig> = active
            .iter()
            .filter(|config| config.provider_kind == kind)
            .collect();
        if let Some(config) = of_kind
            .iter()
            .find(|config| config.is_default)
            .or_else(|| of_kind.first())
        {
            return Ok(Resolution {
                config: (**config).clone(),
                resolved_model: requested_model.to_string(),
                matched: false,
            });
        }
    }

    // Catch-all: the first active config services unknown models under its
    // own first model code; with no model codes the upstream gets the
    // original name and will reject it itself.
    let resolved_model = first_active
        .model_codes
        .first()
        .cloned()
        .unwrap_or_else(|| requested_model.to_string());
    Ok(Resolution {
        config: (*first_active).clone(),
        resolved_model,
        matched: false,
    })
}

fn classify_model(model: &str) -> Option<ProviderKind> {
    if model.starts_with("gpt-") || model.starts_with("o1-") || model.starts_with("o3-") {
        Some(ProviderKind::OpenAI)
    } else if model.starts_with("claude-") {
        Some(ProviderKind::Anthropic)
    } else if model.starts_with("gemini-") {
        Some(ProviderKind::Gemini)
    } else {
        None
    }
}
