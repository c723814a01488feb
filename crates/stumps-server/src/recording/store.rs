//! Bounded, thread-safe list of recordings.

use super::types::RecordedContext;
use crate::http::StumpsHttpContext;
use parking_lot::Mutex;
use std::sync::Arc;

pub const DEFAULT_MAX_RECORDINGS: usize = 1000;

/// Recordings for one server instance, oldest first.
///
/// When full, the oldest recording is evicted, which shifts the index of
/// every remaining one down by one.
#[derive(Debug)]
pub struct Recordings {
    contexts: Mutex<Vec<Arc<RecordedContext>>>,
    max_recordings: usize,
}

impl Recordings {
    pub fn new(max_recordings: usize) -> Self {
        Self {
            contexts: Mutex::new(Vec::new()),
            max_recordings: max_recordings.max(1),
        }
    }

    /// Snapshot `context` and append it.
    pub fn add(&self, context: &StumpsHttpContext) -> Arc<RecordedContext> {
        let recorded = Arc::new(RecordedContext::from_context(context));
        let mut contexts = self.contexts.lock();
        if contexts.len() >= self.max_recordings {
            let overflow = contexts.len() + 1 - self.max_recordings;
            contexts.drain(..overflow);
        }
        contexts.push(Arc::clone(&recorded));
        recorded
    }

    /// Recordings strictly after `after_index`, in insertion order.
    /// `-1` returns everything.
    pub fn find(&self, after_index: i64) -> Vec<Arc<RecordedContext>> {
        let start = after_index.saturating_add(1).max(0);
        let contexts = self.contexts.lock();
        match usize::try_from(start) {
            Ok(start) if start < contexts.len() => contexts[start..].to_vec(),
            _ => Vec::new(),
        }
    }

    pub fn find_at(&self, index: usize) -> Option<Arc<RecordedContext>> {
        self.contexts.lock().get(index).cloned()
    }

    pub fn count(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn clear(&self) {
        self.contexts.lock().clear();
    }
}

impl Default for Recordings {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDINGS)
    }
}
