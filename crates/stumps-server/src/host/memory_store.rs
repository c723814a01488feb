//! In-memory storage for tests and ephemeral hosts.

use super::data_access::{
    assign_resource_names, next_sequence, original_request_resource, original_response_resource,
    response_resource, validate_name, DataAccess, DataAccessError, ServerEntity, StumpBodies,
    StumpEntity,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Default)]
struct Stored {
    servers: BTreeMap<String, ServerEntity>,
    /// Stumps keyed by server id, in creation order.
    stumps: BTreeMap<String, Vec<StumpEntity>>,
    /// Resources keyed by server id, then resource name.
    resources: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
}

#[derive(Default)]
pub struct InMemoryDataAccess {
    stored: RwLock<Stored>,
}

impl InMemoryDataAccess {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataAccess for InMemoryDataAccess {
    fn server_create(&self, server: &ServerEntity) -> Result<(), DataAccessError> {
        let id = validate_name(&server.server_id)?;
        self.stored
            .write()
            .servers
            .insert(id.to_string(), server.clone());
        Ok(())
    }

    fn server_delete(&self, server_id: &str) -> Result<(), DataAccessError> {
        let mut stored = self.stored.write();
        stored.servers.remove(server_id);
        stored.stumps.remove(server_id);
        stored.resources.remove(server_id);
        Ok(())
    }

    fn server_find(&self, server_id: &str) -> Result<Option<ServerEntity>, DataAccessError> {
        Ok(self.stored.read().servers.get(server_id).cloned())
    }

    fn server_find_all(&self) -> Result<Vec<ServerEntity>, DataAccessError> {
        Ok(self.stored.read().servers.values().cloned().collect())
    }

    fn server_read_resource(
        &self,
        server_id: &str,
        resource_name: &str,
    ) -> Result<Option<Vec<u8>>, DataAccessError> {
        Ok(self
            .stored
            .read()
            .resources
            .get(server_id)
            .and_then(|resources| resources.get(resource_name))
            .cloned())
    }

    fn stump_create(
        &self,
        server_id: &str,
        mut stump: StumpEntity,
        bodies: StumpBodies<'_>,
    ) -> Result<StumpEntity, DataAccessError> {
        let server_id = validate_name(server_id)?;
        let stump_id = validate_name(&stump.stump_id)?.to_string();
        assign_resource_names(&mut stump, &bodies);

        let mut stored = self.stored.write();
        let resources = stored.resources.entry(server_id.to_string()).or_default();
        for (name, bytes) in [
            (original_request_resource(&stump_id), bodies.original_request),
            (original_response_resource(&stump_id), bodies.original_response),
            (response_resource(&stump_id), bodies.response),
        ] {
            if bytes.is_empty() {
                resources.remove(&name);
            } else {
                resources.insert(name, bytes.to_vec());
            }
        }
        let stumps = stored.stumps.entry(server_id.to_string()).or_default();
        stump.sequence = next_sequence(stumps, &stump_id);
        match stumps.iter_mut().find(|existing| existing.stump_id == stump_id) {
            Some(existing) => *existing = stump.clone(),
            None => stumps.push(stump.clone()),
        }
        Ok(stump)
    }

    fn stump_delete(&self, server_id: &str, stump_id: &str) -> Result<(), DataAccessError> {
        let mut stored = self.stored.write();
        if let Some(stumps) = stored.stumps.get_mut(server_id) {
            stumps.retain(|stump| stump.stump_id != stump_id);
        }
        if let Some(resources) = stored.resources.get_mut(server_id) {
            resources.remove(&original_request_resource(stump_id));
            resources.remove(&original_response_resource(stump_id));
            resources.remove(&response_resource(stump_id));
        }
        Ok(())
    }

    fn stump_find_all(&self, server_id: &str) -> Result<Vec<StumpEntity>, DataAccessError> {
        Ok(self
            .stored
            .read()
            .stumps
            .get(server_id)
            .cloned()
            .unwrap_or_default())
    }
}
