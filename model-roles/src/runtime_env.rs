//! Process environment setup shared by the CLI and live checks.

use std::path::PathBuf;

const ENV_FILE: &str = ".env";

/// Nearest `file_name` in the current directory or one of its ancestors.
pub fn find_in_ancestors(file_name: &str) -> Option<PathBuf> {
    let mut current = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::warn!(error = %e, file = %file_name, "Could not determine current directory");
            return None;
        }
    };
    loop {
        let candidate = current.join(file_name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Load the nearest `.env` from the current directory or its ancestors.
///
/// Values already present in the process environment are kept. Returns the
/// file that was loaded, if any.
pub fn load_env_file() -> Option<PathBuf> {
    let Some(path) = find_in_ancestors(ENV_FILE) else {
        tracing::debug!("No .env file found; using process environment only");
        return None;
    };

    match dotenvy::from_path(&path) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "Loaded environment from .env");
            Some(path)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to load .env file");
            None
        }
    }
}

/// Environment variables that influence role resolution, sorted by name.
pub fn relevant_env_vars() -> Vec<(String, String)> {
    let prefixes: Vec<String> = crate::role::Role::ALL
        .iter()
        .map(|role| role.env_prefix())
        .collect();

    let mut vars: Vec<(String, String)> = std::env::vars_os()
        .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
        .filter(|(name, _)| {
            name == crate::config::GATEWAY_API_KEY_ENV
                || name == crate::config::CONFIG_PATH_ENV
                || prefixes.iter().any(|prefix| name.starts_with(prefix.as_str()))
        })
        .collect();
    vars.sort();
    vars
}
