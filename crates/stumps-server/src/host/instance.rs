//! One hosted server instance: a `StumpsServer` with its stored stumps and recordings.

use super::core::HostSettings;
use super::data_access::{
    DataAccess, HeaderEntity, RequestEntity, ResponseEntity, RuleEntity, ServerEntity,
    StumpBodies, StumpEntity,
};
use super::identifier::generate_identifier;
use super::HostError;
use crate::http::{HttpHeaders, StumpsHttpContext};
use crate::predicate::Rule;
use crate::recording::{BodyClassification, RecordedRequest, RecordedResponse, Recordings};
use crate::server::{RequestStage, ServerState, StumpsServer};
use crate::stump::{Stump, StumpError, StumpResponse};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct StumpsServerInstance {
    server_id: String,
    /// Host name (and optional port) without scheme; empty when not proxying.
    remote_server_host_name: String,
    use_ssl: bool,
    auto_start: bool,
    server: StumpsServer,
    recordings: Arc<Recordings>,
    record_traffic: Arc<AtomicBool>,
    data_access: Arc<dyn DataAccess>,
}

impl std::fmt::Debug for StumpsServerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StumpsServerInstance")
            .field("server_id", &self.server_id)
            .field("remote_server_host_name", &self.remote_server_host_name)
            .field("port", &self.server.port())
            .field("use_ssl", &self.use_ssl)
            .field("auto_start", &self.auto_start)
            .finish()
    }
}

impl StumpsServerInstance {
    /// Build a stopped instance from its stored descriptor.
    pub(crate) fn new(
        entity: &ServerEntity,
        settings: &HostSettings,
        data_access: Arc<dyn DataAccess>,
    ) -> Result<Self, HostError> {
        let server = StumpsServer::new(entity.port)?
            .with_proxy_config(settings.proxy.clone())
            .with_tls(settings.tls.clone());

        if !entity.remote_server_host_name.is_empty() {
            let scheme = if entity.use_ssl { "https" } else { "http" };
            server.set_remote_http_server(Some(&format!(
                "{scheme}://{}",
                entity.remote_server_host_name
            )))?;
        }
        server.set_use_https_for_incoming_connections(entity.use_https_for_incoming_connections)?;
        server.set_default_response(settings.fallback_response)?;

        let recordings = Arc::new(Recordings::new(settings.max_recordings));
        let record_traffic = Arc::new(AtomicBool::new(false));
        {
            let recordings = Arc::clone(&recordings);
            let record_traffic = Arc::clone(&record_traffic);
            server.subscribe(Arc::new(
                move |stage: RequestStage, context: &StumpsHttpContext| {
                    if stage == RequestStage::Finished && record_traffic.load(Ordering::SeqCst) {
                        recordings.add(context);
                    }
                },
            ));
        }

        Ok(Self {
            server_id: entity.server_id.clone(),
            remote_server_host_name: entity.remote_server_host_name.clone(),
            use_ssl: entity.use_ssl,
            auto_start: entity.auto_start,
            server,
            recordings,
            record_traffic,
            data_access,
        })
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    pub fn remote_server_host_name(&self) -> &str {
        &self.remote_server_host_name
    }

    pub fn use_ssl(&self) -> bool {
        self.use_ssl
    }

    pub fn auto_start(&self) -> bool {
        self.auto_start
    }

    /// Descriptor as persisted by the storage collaborator.
    pub fn entity(&self) -> ServerEntity {
        ServerEntity {
            server_id: self.server_id.clone(),
            remote_server_host_name: self.remote_server_host_name.clone(),
            port: self.server.port(),
            use_ssl: self.use_ssl,
            auto_start: self.auto_start,
            use_https_for_incoming_connections: self.server.use_https_for_incoming_connections(),
        }
    }

    pub fn server(&self) -> &StumpsServer {
        &self.server
    }

    pub fn recordings(&self) -> &Arc<Recordings> {
        &self.recordings
    }

    pub fn record_traffic(&self) -> bool {
        self.record_traffic.load(Ordering::SeqCst)
    }

    /// Start or stop recording finished exchanges. Takes effect immediately.
    pub fn set_record_traffic(&self, enabled: bool) {
        self.record_traffic.store(enabled, Ordering::SeqCst);
    }

    pub fn stumps_enabled(&self) -> bool {
        self.server.stumps_enabled()
    }

    pub fn set_stumps_enabled(&self, enabled: bool) {
        self.server.set_stumps_enabled(enabled);
    }

    pub fn state(&self) -> ServerState {
        self.server.state()
    }

    pub fn is_running(&self) -> bool {
        self.server.is_running()
    }

    pub fn total_requests(&self) -> u64 {
        self.server.total_requests()
    }

    pub fn remote_served(&self) -> u64 {
        self.server.remote_served()
    }

    pub fn stumps_served(&self) -> u64 {
        self.server.stumps_served()
    }

    pub async fn start(&self) -> Result<(), HostError> {
        self.server.start().await?;
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.server.shutdown().await;
    }

    /// Persist and register a stump. An empty id is replaced by a generated one.
    pub fn create_stump(&self, mut stump: Stump) -> Result<Arc<Stump>, HostError> {
        if stump.stump_id.trim().is_empty() {
            stump.stump_id = generate_identifier();
        }
        if self.server.stumps().find_stump(&stump.stump_id).is_some() {
            return Err(StumpError::DuplicateId(stump.stump_id).into());
        }

        let (entity, bodies) = stump_to_entity(&stump);
        self.data_access
            .stump_create(&self.server_id, entity, bodies.as_bodies())?;

        match self.server.stumps().add(stump) {
            Ok(stump) => {
                info!("Server {}: created stump {}", self.server_id, stump.stump_id);
                Ok(stump)
            }
            Err(e) => {
                if let StumpError::DuplicateId(ref id) = e {
                    // A concurrent create won; put its stored copy back.
                    if let Some(existing) = self.server.stumps().find_stump(id) {
                        let (entity, bodies) = stump_to_entity(&existing);
                        self.data_access
                            .stump_create(&self.server_id, entity, bodies.as_bodies())?;
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Remove a stump from memory and storage. Unknown ids are ignored.
    pub fn delete_stump(&self, stump_id: &str) -> Result<(), HostError> {
        let Some(stump) = self.server.stumps().find_stump(stump_id) else {
            debug!("Server {}: no stump {stump_id} to delete", self.server_id);
            return Ok(());
        };
        self.server.stumps().delete(&stump.stump_id);
        self.data_access
            .stump_delete(&self.server_id, &stump.stump_id)?;
        info!("Server {}: deleted stump {}", self.server_id, stump.stump_id);
        Ok(())
    }

    pub fn find_stump(&self, stump_id: &str) -> Option<Arc<Stump>> {
        self.server.stumps().find_stump(stump_id)
    }

    pub fn find_all_stumps(&self) -> Vec<Arc<Stump>> {
        self.server.stumps().find_all()
    }

    pub fn stump_count(&self) -> usize {
        self.server.stumps().count()
    }

    /// Register every stump stored for this server.
    pub(crate) fn load_stumps(&self) -> Result<(), HostError> {
        for entity in self.data_access.stump_find_all(&self.server_id)? {
            let stump = self.stump_from_entity(&entity)?;
            if let Err(e) = self.server.stumps().add(stump) {
                warn!("Server {}: skipping stored stump: {e}", self.server_id);
            }
        }
        debug!(
            "Server {}: loaded {} stumps",
            self.server_id,
            self.stump_count()
        );
        Ok(())
    }

    fn read_body(&self, resource_name: Option<&str>) -> Result<Bytes, HostError> {
        let Some(name) = resource_name else {
            return Ok(Bytes::new());
        };
        Ok(self
            .data_access
            .server_read_resource(&self.server_id, name)?
            .map(Bytes::from)
            .unwrap_or_default())
    }

    fn stump_from_entity(&self, entity: &StumpEntity) -> Result<Stump, HostError> {
        let rules = entity
            .rules
            .iter()
            .map(|rule| Rule::from_entity(&rule.rule_name, &rule.settings))
            .collect::<Result<Vec<_>, _>>()?;

        let response = StumpResponse {
            status_code: entity.response.status_code,
            status_description: entity.response.status_description.clone(),
            headers: headers_from_entities(&entity.response.headers),
            body: self.read_body(entity.response.body_resource_name.as_deref())?,
            body_is_text: entity.response.body_is_text,
            body_is_image: entity.response.body_is_image,
        };

        let original_request = match entity.original_request {
            Some(ref request) => Some(RecordedRequest::new(
                request.http_method.clone(),
                request.raw_url.clone(),
                headers_from_entities(&request.headers),
                &self.read_body(request.body_resource_name.as_deref())?,
                false,
            )),
            None => None,
        };

        let original_response = match entity.original_response {
            Some(ref response) => Some(RecordedResponse::new(
                response.status_code,
                response.status_description.clone(),
                headers_from_entities(&response.headers),
                &self.read_body(response.body_resource_name.as_deref())?,
                false,
            )),
            None => None,
        };

        Ok(Stump {
            stump_id: entity.stump_id.clone(),
            stump_name: entity.stump_name.clone(),
            rules,
            response,
            original_request,
            original_response,
        })
    }
}

/// Owned body blobs extracted from a stump.
struct OwnedBodies {
    original_request: Bytes,
    original_response: Bytes,
    response: Bytes,
}

impl OwnedBodies {
    fn as_bodies(&self) -> StumpBodies<'_> {
        StumpBodies {
            original_request: &self.original_request,
            original_response: &self.original_response,
            response: &self.response,
        }
    }
}

fn headers_to_entities(headers: &HttpHeaders) -> Vec<HeaderEntity> {
    headers
        .iter()
        .map(|(name, value)| HeaderEntity {
            name: name.to_string(),
            value: value.to_string(),
        })
        .collect()
}

fn headers_from_entities(entities: &[HeaderEntity]) -> HttpHeaders {
    entities
        .iter()
        .map(|header| (header.name.as_str(), header.value.clone()))
        .collect()
}

fn stump_to_entity(stump: &Stump) -> (StumpEntity, OwnedBodies) {
    let entity = StumpEntity {
        stump_id: stump.stump_id.clone(),
        sequence: 0,
        stump_name: stump.stump_name.clone(),
        rules: stump
            .rules
            .iter()
            .map(|rule| RuleEntity {
                rule_name: rule.kind().name().to_string(),
                settings: rule.settings(),
            })
            .collect(),
        response: ResponseEntity {
            status_code: stump.response.status_code,
            status_description: stump.response.status_description.clone(),
            headers: headers_to_entities(&stump.response.headers),
            body_resource_name: None,
            body_is_text: stump.response.body_is_text,
            body_is_image: stump.response.body_is_image,
        },
        original_request: stump.original_request.as_ref().map(|request| RequestEntity {
            http_method: request.method.clone(),
            raw_url: request.raw_url.clone(),
            headers: headers_to_entities(&request.headers),
            body_resource_name: None,
        }),
        original_response: stump
            .original_response
            .as_ref()
            .map(|response| ResponseEntity {
                status_code: response.status_code,
                status_description: response.status_description.clone(),
                headers: headers_to_entities(&response.headers),
                body_resource_name: None,
                body_is_text: response.body.classification == BodyClassification::Text,
                body_is_image: response.body.classification == BodyClassification::Image,
            }),
    };

    let bodies = OwnedBodies {
        original_request: stump
            .original_request
            .as_ref()
            .map(|request| request.body.bytes.clone())
            .unwrap_or_default(),
        original_response: stump
            .original_response
            .as_ref()
            .map(|response| response.body.bytes.clone())
            .unwrap_or_default(),
        response: stump.response.body.clone(),
    };

    (entity, bodies)
}
