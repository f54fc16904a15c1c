//! Role-based LLM connection settings.
//!
//! A [`Role`] (`basic`, `reasoning`, `vision`) resolves to a [`ResolvedConfig`]
//! by layering `{ROLE}_MODEL__*` environment overrides over a static TOML file,
//! then normalizing credentials and gateway defaults. [`ClientCache`] builds
//! one client per role on demand and keeps it until cleared.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod redact;
pub mod role;
pub mod runtime_env;

pub use cache::ClientCache;
pub use client::{ChatClient, ClientFactory, OpenAiCompatibleFactory, DEFAULT_OPENAI_BASE_URL};
pub use config::{
    load_static_config, read_env_overrides, resolve, resolve_config_path, resolve_role_name,
    resolve_with, ResolvedConfig, StaticConfig, StaticConfigStore, StaticSection,
};
pub use error::{ChatError, ModelConfigError, StaticConfigLoadError};
pub use role::Role;
