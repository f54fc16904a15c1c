use std::path::PathBuf;

/// Failure to read or parse the static configuration file.
#[derive(Debug, thiserror::Error)]
pub enum StaticConfigLoadError {
    #[error("failed to read static config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse static config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ModelConfigError {
    #[error("unknown model role: {0}")]
    InvalidRole(String),
    #[error("model role '{role}' is missing required settings: {}", .missing.join(", "))]
    Configuration {
        role: String,
        missing: Vec<&'static str>,
    },
    #[error(transparent)]
    StaticConfigLoad(#[from] StaticConfigLoadError),
    #[error("failed to construct client: {0}")]
    ClientBuild(String),
}

/// Errors raised while talking to the gateway through a constructed client.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("gateway returned no choices")]
    EmptyResponse,
}
