//! StumpsManager - registry of stumps for one server instance.
//!
//! Lookups take a read lock over the whole collection, so they never observe
//! a half-applied add, delete or clear.

use super::types::Stump;
use super::StumpError;
use crate::http::StumpsHttpRequest;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Stumps in registration order.
#[derive(Debug, Default)]
pub struct StumpsManager {
    stumps: RwLock<Vec<Arc<Stump>>>,
}

impl StumpsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stump. Fails if its id is empty or already registered.
    pub fn add(&self, stump: Stump) -> Result<Arc<Stump>, StumpError> {
        if stump.stump_id.trim().is_empty() {
            return Err(StumpError::EmptyId);
        }
        let stump = Arc::new(stump);
        let mut stumps = self.stumps.write();
        if stumps
            .iter()
            .any(|s| s.stump_id.eq_ignore_ascii_case(&stump.stump_id))
        {
            return Err(StumpError::DuplicateId(stump.stump_id.clone()));
        }
        stumps.push(Arc::clone(&stump));
        debug!("Stump '{}' added", stump.stump_id);
        Ok(stump)
    }

    pub fn find_stump(&self, stump_id: &str) -> Option<Arc<Stump>> {
        self.stumps
            .read()
            .iter()
            .find(|s| s.stump_id.eq_ignore_ascii_case(stump_id))
            .cloned()
    }

    /// First registered stump whose rules all match the request.
    pub fn find_match(&self, request: &StumpsHttpRequest) -> Option<Arc<Stump>> {
        self.stumps
            .read()
            .iter()
            .find(|s| s.is_match(request))
            .cloned()
    }

    /// Remove a stump. Unknown ids are ignored.
    pub fn delete(&self, stump_id: &str) -> bool {
        let mut stumps = self.stumps.write();
        let before = stumps.len();
        stumps.retain(|s| !s.stump_id.eq_ignore_ascii_case(stump_id));
        let removed = before != stumps.len();
        if removed {
            debug!("Stump '{}' deleted", stump_id);
        }
        removed
    }

    pub fn delete_all(&self) {
        self.stumps.write().clear();
    }

    pub fn count(&self) -> usize {
        self.stumps.read().len()
    }

    /// Point-in-time copy of the registry.
    pub fn find_all(&self) -> Vec<Arc<Stump>> {
        self.stumps.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{Rule, UrlRule};
    use crate::stump::StumpResponse;

    fn url_stump(id: &str, url: &str) -> Stump {
        Stump::new(id).with_rule(Rule::Url(UrlRule::new(url).unwrap()))
    }

    #[test]
    fn test_add_rejects_duplicate_id() {
        let manager = StumpsManager::new();
        manager.add(Stump::new("a")).unwrap();
        assert!(matches!(
            manager.add(Stump::new("A")),
            Err(StumpError::DuplicateId(id)) if id == "A"
        ));
        assert!(matches!(manager.add(Stump::new(" ")), Err(StumpError::EmptyId)));
        assert_eq!(manager.count(), 1);
    }

    #[test]
    fn test_first_registered_match_wins() {
        let manager = StumpsManager::new();
        manager
            .add(url_stump("first", "/items/*").with_response(StumpResponse::new(200, "OK")))
            .unwrap();
        manager
            .add(url_stump("second", "/items/1").with_response(StumpResponse::new(201, "Created")))
            .unwrap();

        let found = manager
            .find_match(&StumpsHttpRequest::new("GET", "/items/1"))
            .unwrap();
        assert_eq!(found.stump_id, "first");

        manager.delete("first");
        let found = manager
            .find_match(&StumpsHttpRequest::new("GET", "/items/1"))
            .unwrap();
        assert_eq!(found.stump_id, "second");
    }

    #[test]
    fn test_no_match() {
        let manager = StumpsManager::new();
        manager.add(url_stump("a", "/a")).unwrap();
        assert!(manager
            .find_match(&StumpsHttpRequest::new("GET", "/b"))
            .is_none());
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let manager = StumpsManager::new();
        manager.add(Stump::new("a")).unwrap();
        assert!(!manager.delete("missing"));
        assert_eq!(manager.count(), 1);
    }

    #[test]
    fn test_find_and_delete_all() {
        let manager = StumpsManager::new();
        manager.add(Stump::new("a")).unwrap();
        manager.add(Stump::new("b")).unwrap();
        assert_eq!(manager.find_stump("B").unwrap().stump_id, "b");
        assert!(manager.find_stump("c").is_none());

        let snapshot = manager.find_all();
        manager.delete_all();
        assert_eq!(manager.count(), 0);
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_concurrent_lookups_during_mutation() {
        let manager = Arc::new(StumpsManager::new());
        let writer = {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || {
                for i in 0..200 {
                    manager.add(Stump::new(format!("s{i}"))).unwrap();
                    if i % 3 == 0 {
                        manager.delete(&format!("s{i}"));
                    }
                }
            })
        };
        let reader = {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let _ = manager.find_match(&StumpsHttpRequest::new("GET", "/"));
                }
            })
        };
        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(manager.count(), 200 - 67);
    }
}
