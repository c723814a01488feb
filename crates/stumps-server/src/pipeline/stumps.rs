use super::{HttpHandler, ProcessHandlerResult};
use crate::http::{ResponseOrigin, StumpsHttpContext};
use crate::stump::StumpsManager;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Answers requests from the first matching stump.
pub struct StumpsHandler {
    manager: Arc<StumpsManager>,
    /// Shared with the server so matching can be toggled while running.
    enabled: Arc<AtomicBool>,
}

impl StumpsHandler {
    pub fn new(manager: Arc<StumpsManager>, enabled: Arc<AtomicBool>) -> Self {
        Self { manager, enabled }
    }
}

#[async_trait]
impl HttpHandler for StumpsHandler {
    fn name(&self) -> &'static str {
        "stumps"
    }

    async fn process_request(&self, context: &mut StumpsHttpContext) -> ProcessHandlerResult {
        if !self.enabled.load(Ordering::SeqCst) {
            return ProcessHandlerResult::Continue;
        }

        let Some(stump) = self.manager.find_match(&context.request) else {
            return ProcessHandlerResult::Continue;
        };

        debug!(
            "Request {} {} served by stump '{}'",
            context.request.method, context.request.raw_url, stump.stump_id
        );
        stump.response.apply_to(&mut context.response);
        context.response.origin = ResponseOrigin::Stump;
        context.response.stump_id = Some(stump.stump_id.clone());
        ProcessHandlerResult::Terminate
    }
}
