//! Static config loading, environment overrides, and the resolution pipeline.

pub mod env;
pub mod resolve;
pub mod static_config;

pub use env::{read_env_overrides, read_env_overrides_for_name, read_overrides_from};
pub use resolve::{
    apply_gateway_fallback, gateway_api_key, inject_gateway_headers, is_gateway_url, merge,
    rename_openai_api_key, resolve, resolve_role_name, resolve_with, MergedSettings,
    ResolvedConfig, GATEWAY_API_KEY_ENV, GATEWAY_BASE_URL, GATEWAY_DEFAULT_HEADERS,
    GATEWAY_DEFAULT_MODEL,
};
pub use static_config::{
    load_static_config, resolve_config_path, StaticConfig, StaticConfigStore, StaticSection,
    CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH,
};
