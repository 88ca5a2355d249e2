use agw_provider::config::{ProviderConfig, ProviderKind};
use agw_provider::credential::CallerCredential;
use agw_provider::resolver::{resolve, ResolveError};
use agw_transform::middleware::Proto;

fn config(id: i64, kind: ProviderKind, codes: &[&str]) -> ProviderConfig {
    ProviderConfig {
        id,
        provider_kind: kind,
        outbound_protocol: Some(match kind {
            ProviderKind::Anthropic => Proto::Anthropic,
            ProviderKind::Gemini => Proto::Gemini,
            _ => Proto::OpenAIChat,
        }),
        base_url: None,
        secret: format!("sk-{id}"),
        model_codes: codes.iter().map(|code| code.to_string()).collect(),
        is_active: true,
        is_default: false,
    }
}

fn credential(configs: Vec<ProviderConfig>) -> CallerCredential {
    CallerCredential {
        key_id: "key-1".to_string(),
        configs,
    }
}

#[test]
fn exact_model_code_match_wins() {
    let caller = credential(vec![
        config(1, ProviderKind::OpenAI, &["gpt-4"]),
        config(2, ProviderKind::Anthropic, &["claude-3-5-sonnet-20241022"]),
    ]);
    let resolution = resolve(&caller, "claude-3-5-sonnet-20241022").unwrap();
    assert_eq!(resolution.config.id, 2);
    assert_eq!(resolution.resolved_model, "claude-3-5-sonnet-20241022");
    assert!(resolution.matched);
}

#[test]
fn inactive_configs_are_skipped_for_matching() {
    let mut inactive = config(1, ProviderKind::Anthropic, &["claude-3-opus"]);
    inactive.is_active = false;
    let caller = credential(vec![inactive, config(2, ProviderKind::OpenAI, &["gpt-4"])]);
    let resolution = resolve(&caller, "claude-3-opus").unwrap();
    // The inactive exact match loses; the prefix classifier has no anthropic
    // config, so the catch-all picks the first active one.
    assert_eq!(resolution.config.id, 2);
    assert_eq!(resolution.resolved_model, "gpt-4");
    assert!(!resolution.matched);
}

#[test]
fn prefix_classifier_picks_the_default_of_that_kind() {
    let mut preferred = config(3, ProviderKind::Anthropic, &[]);
    preferred.is_default = true;
    let caller = credential(vec![
        config(1, ProviderKind::OpenAI, &[]),
        config(2, ProviderKind::Anthropic, &[]),
        preferred,
    ]);
    let resolution = resolve(&caller, "claude-3-haiku").unwrap();
    assert_eq!(resolution.config.id, 3);
    assert_eq!(resolution.resolved_model, "claude-3-haiku");
    assert!(!resolution.matched);
}

#[test]
fn prefix_classifier_falls_back_to_first_active_of_kind() {
    let caller = credential(vec![
        config(1, ProviderKind::Gemini, &[]),
        config(2, ProviderKind::Gemini, &[]),
    ]);
    let resolution = resolve(&caller, "gemini-1.5-pro").unwrap();
    assert_eq!(resolution.config.id, 1);
}

#[test]
fn catch_all_substitutes_the_first_model_code() {
    let mut catch_all = config(1, ProviderKind::Custom, &["my-model"]);
    catch_all.is_default = true;
    let caller = credential(vec![catch_all]);
    let resolution = resolve(&caller, "unknown-xyz").unwrap();
    assert_eq!(resolution.config.id, 1);
    assert_eq!(resolution.resolved_model, "my-model");
    assert!(!resolution.matched);
}

#[test]
fn catch_all_without_model_codes_keeps_the_requested_model() {
    let caller = credential(vec![config(1, ProviderKind::Custom, &[])]);
    let resolution = resolve(&caller, "unknown-xyz").unwrap();
    assert_eq!(resolution.resolved_model, "unknown-xyz");
}

#[test]
fn missing_or_inactive_configs_are_unauthorized() {
    let caller = credential(Vec::new());
    assert_eq!(resolve(&caller, "gpt-4").unwrap_err(), ResolveError::NoConfigs);

    let mut inactive = config(1, ProviderKind::OpenAI, &["gpt-4"]);
    inactive.is_active = false;
    let caller = credential(vec![inactive]);
    assert_eq!(
        resolve(&caller, "gpt-4").unwrap_err(),
        ResolveError::NoActiveConfigs
    );
}
