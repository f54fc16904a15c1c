use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::error::StaticConfigLoadError;
use crate::role::Role;
use crate::runtime_env::find_in_ancestors;

pub const DEFAULT_CONFIG_PATH: &str = "conf.toml";
pub const CONFIG_PATH_ENV: &str = "MODEL_ROLES_CONFIG_PATH";

pub(crate) const DEFAULT_HEADERS_KEY: &str = "default_headers";

/// Settings for one role as written in the static config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticSection {
    pub settings: BTreeMap<String, String>,
    pub default_headers: BTreeMap<String, String>,
}

impl StaticSection {
    pub fn with_setting(mut self, key: &str, value: &str) -> Self {
        self.settings.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.default_headers
            .insert(name.to_string(), value.to_string());
        self
    }
}

/// File-based defaults, keyed by section name (`BASIC_MODEL`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticConfig {
    sections: BTreeMap<String, StaticSection>,
}

impl StaticConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML content. String values of the form `$NAME` / `${NAME}` are
    /// replaced by the named environment variable; when it is unset the entry
    /// is dropped.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let table: toml::Table = toml::from_str(content)?;
        let mut sections = BTreeMap::new();

        for (name, value) in table {
            let toml::Value::Table(entries) = value else {
                tracing::warn!(key = %name, "Ignoring top-level static config value that is not a table");
                continue;
            };
            sections.insert(name.clone(), section_from_table(&name, entries));
        }

        Ok(Self { sections })
    }

    pub fn with_section(mut self, role: Role, section: StaticSection) -> Self {
        self.sections
            .insert(role.section_name().to_string(), section);
        self
    }

    pub fn section(&self, role: Role) -> Option<&StaticSection> {
        self.sections.get(role.section_name())
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.sections.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }
}

fn section_from_table(section: &str, entries: toml::Table) -> StaticSection {
    let mut out = StaticSection::default();

    for (key, value) in entries {
        if key == DEFAULT_HEADERS_KEY {
            if let toml::Value::Table(headers) = value {
                for (name, header_value) in headers {
                    if let Some(text) = scalar_to_string(section, &name, header_value) {
                        out.default_headers.insert(name, text);
                    }
                }
                continue;
            }
        }

        if let Some(text) = scalar_to_string(section, &key, value) {
            out.settings.insert(key, text);
        }
    }

    out
}

/// Text form of a scalar value. Arrays, tables and env references to unset
/// variables yield `None`, so the entry is treated as absent.
fn scalar_to_string(section: &str, key: &str, value: toml::Value) -> Option<String> {
    match value {
        toml::Value::String(text) => substitute_env(section, key, &text),
        toml::Value::Integer(number) => Some(number.to_string()),
        toml::Value::Float(number) => Some(number.to_string()),
        toml::Value::Boolean(flag) => Some(flag.to_string()),
        toml::Value::Datetime(datetime) => Some(datetime.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => {
            tracing::warn!(
                section = %section,
                key = %key,
                "Ignoring non-scalar static config value"
            );
            None
        }
    }
}

fn env_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))$")
            .expect("env reference pattern is valid")
    })
}

fn substitute_env(section: &str, key: &str, value: &str) -> Option<String> {
    let Some(captures) = env_reference_pattern().captures(value.trim()) else {
        return Some(value.to_string());
    };
    let Some(name) = captures.get(1).or_else(|| captures.get(2)) else {
        return Some(value.to_string());
    };

    match std::env::var(name.as_str()) {
        Ok(resolved) => Some(resolved),
        Err(_) => {
            tracing::warn!(
                section = %section,
                key = %key,
                var = %name.as_str(),
                "Referenced env var is not set; dropping static config value"
            );
            None
        }
    }
}

/// Load the static config at `path`. A missing file is an empty config.
pub fn load_static_config(path: &Path) -> Result<StaticConfig, StaticConfigLoadError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Static model config not found; using empty config");
            return Ok(StaticConfig::default());
        }
        Err(source) => {
            return Err(StaticConfigLoadError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let config =
        StaticConfig::from_toml_str(&content).map_err(|source| StaticConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(
        path = %path.display(),
        sections = config.len(),
        "Loaded static model config"
    );
    Ok(config)
}

/// Cache of loaded static configs keyed by path.
#[derive(Debug, Default)]
pub struct StaticConfigStore {
    loaded: Mutex<HashMap<PathBuf, Arc<StaticConfig>>>,
}

impl StaticConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached config for `path`, loading it on first use.
    /// Failed loads are not cached.
    pub fn load(&self, path: &Path) -> Result<Arc<StaticConfig>, StaticConfigLoadError> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(config) = loaded.get(path) {
            return Ok(Arc::clone(config));
        }

        let config = Arc::new(load_static_config(path)?);
        loaded.insert(path.to_path_buf(), Arc::clone(&config));
        Ok(config)
    }

    pub fn clear(&self) {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pick the static config path: `MODEL_ROLES_CONFIG_PATH` if set, otherwise
/// `conf.toml` in the current directory or its nearest ancestor that has one.
pub fn resolve_config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| find_in_ancestors(DEFAULT_CONFIG_PATH))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
