//! StumpsServer - one listening socket, one pipeline, one set of stumps.

use super::handler::{accept_loop, RequestProcessor};
use super::remote::parse_remote_server;
use super::{RequestListener, ServerError, ServerState};
use crate::config::{ProxyClientConfig, TlsConfig};
use crate::http::ResponseOrigin;
use crate::pipeline::{FallbackHandler, FallbackResponse, HttpPipeline, ProxyHandler, StumpsHandler};
use crate::proxy::{create_http_client, create_listener, create_tls_acceptor};
use crate::stump::StumpsManager;
use parking_lot::{Mutex, RwLock};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Per-instance request counters.
#[derive(Debug, Default)]
pub struct RequestCounters {
    total: AtomicU64,
    remote: AtomicU64,
    stumps: AtomicU64,
}

impl RequestCounters {
    pub fn record(&self, origin: ResponseOrigin) {
        self.total.fetch_add(1, Ordering::SeqCst);
        match origin {
            ResponseOrigin::RemoteServer => {
                self.remote.fetch_add(1, Ordering::SeqCst);
            }
            ResponseOrigin::Stump => {
                self.stumps.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn remote_served(&self) -> u64 {
        self.remote.load(Ordering::SeqCst)
    }

    pub fn stumps_served(&self) -> u64 {
        self.stumps.load(Ordering::SeqCst)
    }
}

/// Settings fixed for the lifetime of a running instance.
#[derive(Debug, Clone)]
struct ServerSettings {
    port: u16,
    /// Validated `scheme://authority`.
    remote_http_server: Option<String>,
    use_https_for_incoming_connections: bool,
    default_response: FallbackResponse,
}

struct RunningServer {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// A single mock/proxy server instance.
pub struct StumpsServer {
    settings: RwLock<ServerSettings>,
    proxy_config: ProxyClientConfig,
    tls: Option<TlsConfig>,
    stumps: Arc<StumpsManager>,
    stumps_enabled: Arc<AtomicBool>,
    counters: Arc<RequestCounters>,
    listeners: RwLock<Vec<RequestListener>>,
    /// Serializes start and shutdown; `Some` while a listener is running.
    lifecycle: tokio::sync::Mutex<Option<RunningServer>>,
    state: Mutex<ServerState>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl StumpsServer {
    /// Create a stopped instance listening on `port` once started.
    pub fn new(port: u16) -> Result<Self, ServerError> {
        if port == 0 {
            return Err(ServerError::InvalidPort(port));
        }
        Ok(Self {
            settings: RwLock::new(ServerSettings {
                port,
                remote_http_server: None,
                use_https_for_incoming_connections: false,
                default_response: FallbackResponse::default(),
            }),
            proxy_config: ProxyClientConfig::default(),
            tls: None,
            stumps: Arc::new(StumpsManager::new()),
            stumps_enabled: Arc::new(AtomicBool::new(true)),
            counters: Arc::new(RequestCounters::default()),
            listeners: RwLock::new(Vec::new()),
            lifecycle: tokio::sync::Mutex::new(None),
            state: Mutex::new(ServerState::Stopped),
            local_addr: Mutex::new(None),
        })
    }

    /// Outbound client settings used by the proxy handler.
    pub fn with_proxy_config(mut self, config: ProxyClientConfig) -> Self {
        self.proxy_config = config;
        self
    }

    /// Certificate and key used when HTTPS is enabled for incoming connections.
    pub fn with_tls(mut self, tls: Option<TlsConfig>) -> Self {
        self.tls = tls;
        self
    }

    /// Hold the lifecycle lock while the instance is stopped.
    fn ensure_stopped(
        &self,
    ) -> Result<tokio::sync::MutexGuard<'_, Option<RunningServer>>, ServerError> {
        let guard = self
            .lifecycle
            .try_lock()
            .map_err(|_| ServerError::Running)?;
        if guard.is_some() {
            return Err(ServerError::Running);
        }
        Ok(guard)
    }

    pub fn port(&self) -> u16 {
        self.settings.read().port
    }

    pub fn set_port(&self, port: u16) -> Result<(), ServerError> {
        if port == 0 {
            return Err(ServerError::InvalidPort(port));
        }
        let _guard = self.ensure_stopped()?;
        self.settings.write().port = port;
        Ok(())
    }

    /// Remote server base as `scheme://authority`, if proxying is enabled.
    pub fn remote_http_server(&self) -> Option<String> {
        self.settings.read().remote_http_server.clone()
    }

    /// Set or clear the remote server. Requests that no stump answers are
    /// proxied there; without one the fallback response is returned.
    pub fn set_remote_http_server(&self, uri: Option<&str>) -> Result<(), ServerError> {
        let remote = uri.map(parse_remote_server).transpose()?;
        let _guard = self.ensure_stopped()?;
        self.settings.write().remote_http_server = remote;
        Ok(())
    }

    pub fn use_https_for_incoming_connections(&self) -> bool {
        self.settings.read().use_https_for_incoming_connections
    }

    pub fn set_use_https_for_incoming_connections(&self, value: bool) -> Result<(), ServerError> {
        let _guard = self.ensure_stopped()?;
        self.settings.write().use_https_for_incoming_connections = value;
        Ok(())
    }

    pub fn default_response(&self) -> FallbackResponse {
        self.settings.read().default_response
    }

    pub fn set_default_response(&self, response: FallbackResponse) -> Result<(), ServerError> {
        let _guard = self.ensure_stopped()?;
        self.settings.write().default_response = response;
        Ok(())
    }

    pub fn stumps_enabled(&self) -> bool {
        self.stumps_enabled.load(Ordering::SeqCst)
    }

    /// Toggle stump matching. Takes effect immediately, even while running.
    pub fn set_stumps_enabled(&self, enabled: bool) {
        self.stumps_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn stumps(&self) -> &Arc<StumpsManager> {
        &self.stumps
    }

    pub fn counters(&self) -> &RequestCounters {
        &self.counters
    }

    pub fn total_requests(&self) -> u64 {
        self.counters.total_requests()
    }

    pub fn remote_served(&self) -> u64 {
        self.counters.remote_served()
    }

    pub fn stumps_served(&self) -> u64 {
        self.counters.stumps_served()
    }

    /// Register a request listener. Listeners are captured at start, so
    /// subscribe before calling [`StumpsServer::start`].
    pub fn subscribe(&self, listener: RequestListener) {
        self.listeners.write().push(listener);
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    /// Address the listener is bound to while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    fn set_state(&self, state: ServerState) {
        *self.state.lock() = state;
    }

    fn build_pipeline(&self, settings: &ServerSettings) -> HttpPipeline {
        let mut pipeline = HttpPipeline::new();
        pipeline.add(Arc::new(StumpsHandler::new(
            Arc::clone(&self.stumps),
            Arc::clone(&self.stumps_enabled),
        )));

        match settings.remote_http_server {
            Some(ref remote) => pipeline.add(Arc::new(ProxyHandler::new(
                create_http_client(&self.proxy_config),
                remote,
                self.proxy_config.request_timeout(),
            ))),
            None => pipeline.add(Arc::new(FallbackHandler::new(settings.default_response))),
        }
        pipeline
    }

    /// Bind the socket and begin accepting. No-op if already running.
    pub async fn start(&self) -> Result<(), ServerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            debug!("Server on port {} is already running", self.port());
            return Ok(());
        }

        self.set_state(ServerState::Starting);
        match self.bind() {
            Ok((running, local_addr)) => {
                *lifecycle = Some(running);
                *self.local_addr.lock() = Some(local_addr);
                self.set_state(ServerState::Running);
                Ok(())
            }
            Err(e) => {
                self.set_state(ServerState::Stopped);
                Err(e)
            }
        }
    }

    fn bind(&self) -> Result<(RunningServer, SocketAddr), ServerError> {
        let settings = self.settings.read().clone();
        let port = settings.port;

        let tls_acceptor = if settings.use_https_for_incoming_connections {
            let tls = self.tls.as_ref().ok_or_else(|| {
                ServerError::Tls("no certificate configured for HTTPS connections".to_string())
            })?;
            Some(
                create_tls_acceptor(&tls.cert_path, &tls.key_path)
                    .map_err(|e| ServerError::Tls(e.to_string()))?,
            )
        } else {
            None
        };

        let listener = create_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::AddrInUse => ServerError::PortInUse(port),
                _ => ServerError::Bind { port, source },
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { port, source })?;

        let pipeline = self.build_pipeline(&settings);
        info!(
            "Server listening on {}://{} with handlers {:?}",
            if tls_acceptor.is_some() { "https" } else { "http" },
            local_addr,
            pipeline.handler_names()
        );

        let processor = Arc::new(RequestProcessor::new(
            pipeline,
            Arc::clone(&self.counters),
            self.listeners.read().clone(),
        ));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(accept_loop(
            listener,
            tls_acceptor,
            processor,
            shutdown_rx,
            port,
        ));

        Ok((RunningServer { shutdown_tx, handle }, local_addr))
    }

    /// Stop accepting and release the socket. No-op if not running.
    /// Open connections finish their in-flight request and are closed before
    /// this returns; kept-alive connections serve nothing further.
    pub async fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            return;
        };

        self.set_state(ServerState::Stopping);
        let _ = running.shutdown_tx.send(());
        if let Err(e) = running.handle.await {
            warn!("Accept loop on port {} ended abnormally: {}", self.port(), e);
        }
        *self.local_addr.lock() = None;
        self.set_state(ServerState::Stopped);
        info!("Server on port {} stopped", self.port());
    }
}

impl Drop for StumpsServer {
    fn drop(&mut self) {
        if let Some(running) = self.lifecycle.get_mut().take() {
            let _ = running.shutdown_tx.send(());
        }
    }
}
