use model_roles::config::{GATEWAY_BASE_URL, GATEWAY_DEFAULT_MODEL};
use model_roles::{
    read_env_overrides, resolve, resolve_role_name, ClientCache, ModelConfigError,
    OpenAiCompatibleFactory, Role, StaticConfig,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static ENV_MUTEX: Mutex<()> = Mutex::new(());

const EXAMPLE_CONFIG: &str = include_str!("../config/conf.example.toml");

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Takes the env lock and clears every variable that feeds role resolution.
    fn isolated() -> Self {
        let lock = ENV_MUTEX.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names = vec!["OPENROUTER_API_KEY".to_string()];
        for role in Role::ALL {
            for key in ["MODEL", "API_KEY", "OPENAI_API_KEY", "BASE_URL", "TEMPERATURE"] {
                names.push(format!("{}{key}", role.env_prefix()));
            }
        }
        let saved = names
            .into_iter()
            .map(|name| {
                let previous = std::env::var(&name).ok();
                std::env::remove_var(&name);
                (name, previous)
            })
            .collect();
        Self { saved, _lock: lock }
    }

    fn set(&mut self, key: &str, value: &str) {
        if !self.saved.iter().any(|(name, _)| name == key) {
            self.saved.push((key.to_string(), std::env::var(key).ok()));
        }
        std::env::set_var(key, value);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (name, previous) in self.saved.drain(..) {
            match previous {
                Some(value) => std::env::set_var(&name, value),
                None => std::env::remove_var(&name),
            }
        }
    }
}

#[test]
fn example_config_resolves_every_role_through_gateway_key() {
    let mut env = EnvGuard::isolated();
    env.set("OPENROUTER_API_KEY", "sk-or-v1-integration-test-key");

    let static_config = StaticConfig::from_toml_str(EXAMPLE_CONFIG).expect("parse example config");
    for role in Role::ALL {
        let resolved = resolve(role, &static_config).expect("resolve example role");
        assert_eq!(resolved.base_url.as_deref(), Some(GATEWAY_BASE_URL));
        assert_eq!(resolved.masked_api_key(), "sk-or-v1...-key");
        assert!(resolved.default_headers.contains_key("HTTP-Referer"));
    }

    let vision = resolve(Role::Vision, &static_config).expect("resolve vision");
    assert_eq!(
        vision.default_headers.get("X-Title").map(String::as_str),
        Some("CryptoSearch Vision")
    );
    assert_eq!(vision.extra.get("temperature").map(String::as_str), Some("0.2"));
}

#[test]
fn env_override_beats_static_setting() {
    let mut env = EnvGuard::isolated();
    env.set("OPENROUTER_API_KEY", "sk-or-v1-integration-test-key");
    env.set("BASIC_MODEL__MODEL", "meta-llama/llama-3.2-1b-instruct:free");

    let overrides = read_env_overrides(Role::Basic);
    assert_eq!(
        overrides.get("model").map(String::as_str),
        Some("meta-llama/llama-3.2-1b-instruct:free")
    );

    let static_config = StaticConfig::from_toml_str(EXAMPLE_CONFIG).expect("parse example config");
    let resolved = resolve(Role::Basic, &static_config).expect("resolve basic");
    assert_eq!(resolved.model, "meta-llama/llama-3.2-1b-instruct:free");
    assert_eq!(resolved.base_url.as_deref(), Some(GATEWAY_BASE_URL));
}

#[test]
fn gateway_fallback_with_no_static_config() {
    let mut env = EnvGuard::isolated();
    env.set("OPENROUTER_API_KEY", "Z");

    let resolved = resolve_role_name("vision", &StaticConfig::new()).expect("resolve");
    assert_eq!(resolved.model, GATEWAY_DEFAULT_MODEL);
    assert_eq!(resolved.base_url.as_deref(), Some(GATEWAY_BASE_URL));
    assert_eq!(resolved.masked_api_key(), "***");
}

#[test]
fn example_config_without_gateway_key_reports_missing_api_key() {
    let _env = EnvGuard::isolated();

    let static_config = StaticConfig::from_toml_str(EXAMPLE_CONFIG).expect("parse example config");
    for role in Role::ALL {
        let section = static_config.section(role).expect("example section");
        assert!(!section.settings.contains_key("api_key"));

        match resolve(role, &static_config) {
            Err(ModelConfigError::Configuration { missing, .. }) => {
                assert_eq!(missing, vec!["api_key"]);
            }
            other => panic!("expected missing api_key for {role}, got {other:?}"),
        }
    }
}

#[test]
fn missing_credentials_and_unknown_roles_fail_differently() {
    let _env = EnvGuard::isolated();

    assert!(matches!(
        resolve_role_name("basic", &StaticConfig::new()),
        Err(ModelConfigError::Configuration { .. })
    ));
    assert!(matches!(
        resolve_role_name("unknown_role", &StaticConfig::new()),
        Err(ModelConfigError::InvalidRole(_))
    ));
}

#[test]
fn client_cache_lifecycle_with_real_factory() {
    let mut env = EnvGuard::isolated();
    env.set("OPENROUTER_API_KEY", "sk-or-v1-integration-test-key");

    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config_path = temp_dir.path().join("conf.toml");
    std::fs::write(&config_path, EXAMPLE_CONFIG).expect("write config");

    let cache = ClientCache::new(OpenAiCompatibleFactory, &config_path);
    let basic = cache.get_client(Role::Basic, false).expect("basic client");
    assert_eq!(basic.model(), "google/gemini-2.5-pro-preview");
    assert_eq!(basic.base_url(), GATEWAY_BASE_URL);
    assert!(Arc::ptr_eq(&basic, &cache.get_client(Role::Basic, false).expect("cached")));

    let forced = cache.get_client(Role::Basic, true).expect("forced");
    assert!(!Arc::ptr_eq(&basic, &forced));

    cache.reload_all().expect("reload all");
    assert_eq!(cache.cached_roles(), Role::ALL.to_vec());
    let reasoning = cache.get_client_by_name("REASONING", false).expect("reasoning");
    assert_eq!(reasoning.max_tokens(), Some(8192));

    cache.clear_cache();
    assert!(cache.cached_roles().is_empty());
    let rebuilt = cache.get_client(Role::Basic, false).expect("rebuilt");
    assert!(!Arc::ptr_eq(&forced, &rebuilt));
}
