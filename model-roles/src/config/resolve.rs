//! Layered resolution of a role's connection settings.
//!
//! Static file settings are overlaid by `{ROLE}_MODEL__*` environment
//! overrides, then normalized by three ordered steps:
//! rename (`openai_api_key` -> `api_key`), gateway fallback
//! (`OPENROUTER_API_KEY`), and gateway header injection. Header injection runs
//! last so it sees the post-fallback `base_url`.

use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::fmt;

use super::env::read_env_overrides;
use super::static_config::{StaticConfig, StaticSection, DEFAULT_HEADERS_KEY};
use crate::error::ModelConfigError;
use crate::redact::mask_secret;
use crate::role::Role;

pub const GATEWAY_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const GATEWAY_API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const GATEWAY_DEFAULT_MODEL: &str = "google/gemini-2.5-pro-preview";
pub const GATEWAY_DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("HTTP-Referer", "https://avaxsearch.vercel.app"),
    ("X-Title", "CryptoSearch"),
];

const API_KEY: &str = "api_key";
const OPENAI_API_KEY: &str = "openai_api_key";
const MODEL: &str = "model";
const BASE_URL: &str = "base_url";

/// Settings after the static/env overlay, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedSettings {
    pub values: BTreeMap<String, String>,
    pub default_headers: BTreeMap<String, String>,
}

impl MergedSettings {
    /// Value for `key`, treating blank strings as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Fully normalized connection settings for one role.
pub struct ResolvedConfig {
    pub role: Role,
    pub model: String,
    pub api_key: SecretString,
    pub base_url: Option<String>,
    pub default_headers: BTreeMap<String, String>,
    /// Remaining settings (temperature, max_tokens, ...) passed to the client.
    pub extra: BTreeMap<String, String>,
}

impl ResolvedConfig {
    pub fn masked_api_key(&self) -> String {
        mask_secret(self.api_key.expose_secret())
    }

    pub fn is_gateway(&self) -> bool {
        self.base_url.as_deref().is_some_and(is_gateway_url)
    }
}

impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("role", &self.role)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers)
            .field("extra", &self.extra)
            .finish()
    }
}

/// Global gateway key from the live environment, if set and non-blank.
pub fn gateway_api_key() -> Option<String> {
    std::env::var(GATEWAY_API_KEY_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub fn is_gateway_url(url: &str) -> bool {
    url.trim().trim_end_matches('/') == GATEWAY_BASE_URL
}

/// Resolve `role` against `static_config` and the live environment.
pub fn resolve(role: Role, static_config: &StaticConfig) -> Result<ResolvedConfig, ModelConfigError> {
    let overrides = read_env_overrides(role);
    let gateway_key = gateway_api_key();
    resolve_with(role, static_config, &overrides, gateway_key.as_deref())
}

/// Resolve a role given by name. Unknown names fail with `InvalidRole`
/// before any settings are inspected.
pub fn resolve_role_name(
    role: &str,
    static_config: &StaticConfig,
) -> Result<ResolvedConfig, ModelConfigError> {
    resolve(role.parse()?, static_config)
}

/// Resolve with the environment inputs supplied explicitly.
pub fn resolve_with(
    role: Role,
    static_config: &StaticConfig,
    overrides: &BTreeMap<String, String>,
    gateway_key: Option<&str>,
) -> Result<ResolvedConfig, ModelConfigError> {
    let merged = merge(static_config.section(role), overrides);
    let normalized =
        inject_gateway_headers(apply_gateway_fallback(rename_openai_api_key(merged), gateway_key));
    let resolved = validate(role, normalized)?;

    tracing::debug!(
        role = %role,
        model = %resolved.model,
        base_url = resolved.base_url.as_deref().unwrap_or("<default>"),
        headers = resolved.default_headers.len(),
        "Resolved model configuration"
    );
    Ok(resolved)
}

/// Overlay `overrides` on the static section; environment wins on conflict.
///
/// Each layer's `openai_api_key` is read as that layer's `api_key` when the
/// layer has no `api_key` of its own, so an env-supplied key beats a static one
/// whichever spelling is used. Headers come from the static file only; a
/// `default_headers` override is skipped.
pub fn merge(section: Option<&StaticSection>, overrides: &BTreeMap<String, String>) -> MergedSettings {
    let mut merged = MergedSettings::default();

    if let Some(section) = section {
        merged.values = alias_layer(&section.settings);
        merged.default_headers = section.default_headers.clone();
    }
    for (key, value) in alias_layer(overrides) {
        if key == DEFAULT_HEADERS_KEY {
            tracing::warn!(
                key = %key,
                "Ignoring env override; default headers can only be set in the static config"
            );
            continue;
        }
        merged.values.insert(key, value);
    }

    merged
}

fn alias_layer(layer: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut values = layer.clone();
    let has_api_key = values
        .get(API_KEY)
        .is_some_and(|value| !value.trim().is_empty());
    if !has_api_key {
        if let Some(key) = values.remove(OPENAI_API_KEY) {
            if !key.trim().is_empty() {
                values.insert(API_KEY.to_string(), key);
            }
        }
    }
    values
}

/// Step 1: move `openai_api_key` to `api_key` when `api_key` is absent.
/// `openai_api_key` is never left behind.
pub fn rename_openai_api_key(mut settings: MergedSettings) -> MergedSettings {
    let Some(legacy) = settings.values.remove(OPENAI_API_KEY) else {
        return settings;
    };
    if !settings.has(API_KEY) && !legacy.trim().is_empty() {
        settings.values.insert(API_KEY.to_string(), legacy);
    }
    settings
}

/// Step 2: with no `api_key`, fall back to the gateway key and fill in the
/// gateway's default `model` and `base_url` where unset.
pub fn apply_gateway_fallback(mut settings: MergedSettings, gateway_key: Option<&str>) -> MergedSettings {
    if settings.has(API_KEY) {
        return settings;
    }
    let Some(key) = gateway_key.filter(|key| !key.trim().is_empty()) else {
        return settings;
    };

    tracing::info!("No api_key configured for role; using {GATEWAY_API_KEY_ENV}");
    settings.values.insert(API_KEY.to_string(), key.to_string());
    if !settings.has(MODEL) {
        settings
            .values
            .insert(MODEL.to_string(), GATEWAY_DEFAULT_MODEL.to_string());
    }
    if !settings.has(BASE_URL) {
        settings
            .values
            .insert(BASE_URL.to_string(), GATEWAY_BASE_URL.to_string());
    }
    settings
}

/// Step 3: for the gateway endpoint, add its fixed attribution headers
/// without replacing headers that are already set.
pub fn inject_gateway_headers(mut settings: MergedSettings) -> MergedSettings {
    if !settings.get(BASE_URL).is_some_and(is_gateway_url) {
        return settings;
    }

    for (name, value) in GATEWAY_DEFAULT_HEADERS {
        let present = settings
            .default_headers
            .keys()
            .any(|existing| existing.eq_ignore_ascii_case(name));
        if !present {
            settings
                .default_headers
                .insert((*name).to_string(), (*value).to_string());
        }
    }
    settings
}

fn validate(role: Role, mut settings: MergedSettings) -> Result<ResolvedConfig, ModelConfigError> {
    let mut missing = Vec::new();
    if !settings.has(API_KEY) {
        missing.push(API_KEY);
    }
    if !settings.has(MODEL) {
        missing.push(MODEL);
    }
    if !missing.is_empty() {
        return Err(ModelConfigError::Configuration {
            role: role.to_string(),
            missing,
        });
    }

    let api_key = settings.values.remove(API_KEY).unwrap_or_default();
    let model = settings.values.remove(MODEL).unwrap_or_default();
    let base_url = settings
        .values
        .remove(BASE_URL)
        .filter(|value| !value.trim().is_empty());

    Ok(ResolvedConfig {
        role,
        model,
        api_key: SecretString::from(api_key.as_str()),
        base_url,
        default_headers: settings.default_headers,
        extra: settings.values,
    })
}
