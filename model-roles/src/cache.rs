use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::ClientFactory;
use crate::config::{resolve, StaticConfigStore};
use crate::error::ModelConfigError;
use crate::role::Role;

/// Per-role client cache.
///
/// Entries are built lazily on first lookup and only ever dropped all at once
/// by [`ClientCache::clear_cache`]. The lookup-build-insert sequence runs under
/// one lock, so concurrent first requests for a role build a single client.
pub struct ClientCache<F: ClientFactory> {
    factory: F,
    config_path: PathBuf,
    static_configs: StaticConfigStore,
    clients: Mutex<HashMap<Role, Arc<F::Client>>>,
}

impl<F: ClientFactory> ClientCache<F> {
    pub fn new(factory: F, config_path: impl Into<PathBuf>) -> Self {
        Self {
            factory,
            config_path: config_path.into(),
            static_configs: StaticConfigStore::new(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Return the cached client for `role`, building it when absent or when
    /// `force_reload` is set.
    pub fn get_client(
        &self,
        role: Role,
        force_reload: bool,
    ) -> Result<Arc<F::Client>, ModelConfigError> {
        let mut clients = self.lock_clients();
        if !force_reload {
            if let Some(client) = clients.get(&role) {
                return Ok(Arc::clone(client));
            }
        }

        let client = Arc::new(self.build_client(role)?);
        clients.insert(role, Arc::clone(&client));
        Ok(client)
    }

    pub fn get_client_by_name(
        &self,
        role: &str,
        force_reload: bool,
    ) -> Result<Arc<F::Client>, ModelConfigError> {
        self.get_client(role.parse()?, force_reload)
    }

    /// Drop every cached client and the cached static config.
    pub fn clear_cache(&self) {
        self.lock_clients().clear();
        self.static_configs.clear();
        tracing::debug!("Cleared model client cache");
    }

    /// Clear, then rebuild a client for every role. Stops at the first role
    /// that fails to resolve.
    pub fn reload_all(&self) -> Result<(), ModelConfigError> {
        self.clear_cache();
        for role in Role::ALL {
            self.get_client(role, true)?;
        }
        tracing::info!(roles = Role::ALL.len(), "Reloaded all model clients");
        Ok(())
    }

    pub fn is_cached(&self, role: Role) -> bool {
        self.lock_clients().contains_key(&role)
    }

    pub fn cached_roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.lock_clients().keys().copied().collect();
        roles.sort();
        roles
    }

    fn build_client(&self, role: Role) -> Result<F::Client, ModelConfigError> {
        let static_config = self.static_configs.load(&self.config_path)?;
        let resolved = resolve(role, &static_config)?;
        tracing::info!(
            role = %role,
            model = %resolved.model,
            base_url = resolved.base_url.as_deref().unwrap_or("<default>"),
            "Building model client"
        );
        self.factory.build(&resolved)
    }

    fn lock_clients(&self) -> MutexGuard<'_, HashMap<Role, Arc<F::Client>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
