//! StumpsHost - registry of server instances backed by the storage collaborator.

use super::data_access::{DataAccess, ServerEntity};
use super::identifier::generate_identifier;
use super::instance::StumpsServerInstance;
use super::HostError;
use crate::config::{Config, ProxyClientConfig, TlsConfig};
use crate::pipeline::FallbackResponse;
use crate::proxy::is_port_available;
use crate::recording::DEFAULT_MAX_RECORDINGS;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Settings shared by every instance of a host.
#[derive(Debug, Clone)]
pub struct HostSettings {
    pub fallback_response: FallbackResponse,
    pub proxy: ProxyClientConfig,
    pub tls: Option<TlsConfig>,
    pub max_recordings: usize,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            fallback_response: FallbackResponse::default(),
            proxy: ProxyClientConfig::default(),
            tls: None,
            max_recordings: DEFAULT_MAX_RECORDINGS,
        }
    }
}

impl From<&Config> for HostSettings {
    fn from(config: &Config) -> Self {
        Self {
            fallback_response: config.fallback_response,
            proxy: config.proxy.clone(),
            tls: config.tls.clone(),
            max_recordings: config.recording.max_recordings,
        }
    }
}

/// Split a remote host argument into host name and SSL flag.
///
/// A leading `https://` forces SSL, `http://` is dropped. Trailing slashes
/// are removed.
fn normalize_remote_host(remote_host: &str, use_ssl: bool) -> (String, bool) {
    let trimmed = remote_host.trim();
    let lower = trimmed.to_ascii_lowercase();
    let (host, use_ssl) = if lower.starts_with("https://") {
        (&trimmed["https://".len()..], true)
    } else if lower.starts_with("http://") {
        (&trimmed["http://".len()..], use_ssl)
    } else {
        (trimmed, use_ssl)
    };
    (host.trim_end_matches('/').to_string(), use_ssl)
}

pub struct StumpsHost {
    /// Keyed by lowercase server id.
    instances: RwLock<HashMap<String, Arc<StumpsServerInstance>>>,
    /// Ids and ports of instances being persisted but not yet registered.
    /// Always locked after `instances` when both are held.
    reserved: Mutex<Vec<(String, u16)>>,
    data_access: Arc<dyn DataAccess>,
    settings: HostSettings,
}

/// Holds an id and port while an instance is persisted. Released on drop.
struct Reservation<'a> {
    reserved: &'a Mutex<Vec<(String, u16)>>,
    key: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.reserved.lock().retain(|(key, _)| key != &self.key);
    }
}

impl StumpsHost {
    pub fn new(data_access: Arc<dyn DataAccess>, settings: HostSettings) -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            reserved: Mutex::new(Vec::new()),
            data_access,
            settings,
        }
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    /// Create, persist and register a new instance, starting it when
    /// `auto_start` is set.
    ///
    /// A port already used by a registered instance or by another process is
    /// rejected and the registry is left unchanged. If the automatic start
    /// fails the instance is unregistered and its stored data removed.
    pub async fn create_instance(
        &self,
        remote_host: &str,
        port: u16,
        use_ssl: bool,
        auto_start: bool,
    ) -> Result<Arc<StumpsServerInstance>, HostError> {
        let (remote_host, use_ssl) = normalize_remote_host(remote_host, use_ssl);
        if remote_host.is_empty() {
            return Err(HostError::EmptyRemoteHost);
        }
        if port == 0 {
            return Err(HostError::InvalidPort(port));
        }

        let entity = ServerEntity {
            server_id: generate_identifier(),
            remote_server_host_name: remote_host,
            port,
            use_ssl,
            auto_start,
            use_https_for_incoming_connections: false,
        };
        let instance = Arc::new(StumpsServerInstance::new(
            &entity,
            &self.settings,
            Arc::clone(&self.data_access),
        )?);

        if !is_port_available(port) {
            return Err(HostError::PortInUse(port));
        }
        let key = entity.server_id.to_ascii_lowercase();
        let reservation = self.reserve(&key, &entity)?;
        self.data_access.server_create(&entity)?;
        self.instances.write().insert(key, Arc::clone(&instance));
        drop(reservation);
        info!(
            "Created server {} on port {port} for {}",
            entity.server_id, entity.remote_server_host_name
        );

        if auto_start {
            if let Err(e) = instance.start().await {
                error!("Server {} failed to start: {e}", entity.server_id);
                self.instances
                    .write()
                    .remove(&entity.server_id.to_ascii_lowercase());
                if let Err(cleanup) = self.data_access.server_delete(&entity.server_id) {
                    warn!(
                        "Failed to remove stored server {}: {cleanup}",
                        entity.server_id
                    );
                }
                return Err(e);
            }
        }

        Ok(instance)
    }

    /// Claim the id and port of a new instance against both registered and
    /// in-progress instances.
    fn reserve(&self, key: &str, entity: &ServerEntity) -> Result<Reservation<'_>, HostError> {
        let instances = self.instances.read();
        let mut reserved = self.reserved.lock();
        if instances.values().any(|existing| existing.port() == entity.port)
            || reserved.iter().any(|(_, port)| *port == entity.port)
        {
            return Err(HostError::PortInUse(entity.port));
        }
        if instances.contains_key(key) || reserved.iter().any(|(id, _)| id == key) {
            return Err(HostError::DuplicateId(entity.server_id.clone()));
        }
        reserved.push((key.to_string(), entity.port));
        Ok(Reservation {
            reserved: &self.reserved,
            key: key.to_string(),
        })
    }

    /// Stop, unregister and remove the stored data of an instance.
    /// Unknown ids are ignored.
    pub async fn delete_instance(&self, server_id: &str) -> Result<(), HostError> {
        let removed = self
            .instances
            .write()
            .remove(&server_id.to_ascii_lowercase());
        let Some(instance) = removed else {
            debug!("No server {server_id} to delete");
            return Ok(());
        };

        instance.shutdown().await;
        self.data_access.server_delete(instance.server_id())?;
        info!("Deleted server {}", instance.server_id());
        Ok(())
    }

    pub fn find_instance(&self, server_id: &str) -> Option<Arc<StumpsServerInstance>> {
        self.instances
            .read()
            .get(&server_id.to_ascii_lowercase())
            .cloned()
    }

    /// Snapshot of all instances ordered by server id.
    pub fn find_all(&self) -> Vec<Arc<StumpsServerInstance>> {
        let mut instances: Vec<_> = self.instances.read().values().cloned().collect();
        instances.sort_by(|a, b| a.server_id().cmp(b.server_id()));
        instances
    }

    pub fn count(&self) -> usize {
        self.instances.read().len()
    }

    /// Register every stored instance together with its stumps.
    /// Instances already registered are left alone. Nothing is started.
    pub fn load(&self) -> Result<(), HostError> {
        for entity in self.data_access.server_find_all()? {
            let key = entity.server_id.to_ascii_lowercase();
            if self.instances.read().contains_key(&key) {
                continue;
            }
            let instance = StumpsServerInstance::new(
                &entity,
                &self.settings,
                Arc::clone(&self.data_access),
            )?;
            instance.load_stumps()?;
            self.instances.write().insert(key, Arc::new(instance));
        }
        info!("Loaded {} servers", self.count());
        Ok(())
    }

    /// Start every instance flagged for automatic start.
    ///
    /// All instances are attempted; the first failure is returned.
    pub async fn start_all(&self) -> Result<(), HostError> {
        let instances: Vec<_> = self
            .find_all()
            .into_iter()
            .filter(|instance| instance.auto_start())
            .collect();

        let results = join_all(instances.iter().map(|instance| instance.start())).await;
        let mut first_error = None;
        for (instance, result) in instances.iter().zip(results) {
            if let Err(e) = result {
                error!("Server {} failed to start: {e}", instance.server_id());
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub async fn shutdown_all(&self) {
        let instances = self.find_all();
        join_all(instances.iter().map(|instance| instance.shutdown())).await;
    }

    /// Start one instance. Unknown ids are ignored.
    pub async fn start(&self, server_id: &str) -> Result<(), HostError> {
        match self.find_instance(server_id) {
            Some(instance) => instance.start().await,
            None => {
                debug!("No server {server_id} to start");
                Ok(())
            }
        }
    }

    /// Stop one instance. Unknown ids are ignored.
    pub async fn shutdown(&self, server_id: &str) {
        if let Some(instance) = self.find_instance(server_id) {
            instance.shutdown().await;
        }
    }
}
