//! Request-processing pipeline.
//!
//! Module structure:
//! - `stumps` - Answers requests from the first matching stump
//! - `proxy` - Forwards requests to the remote server
//! - `fallback` - Fixed 404/503 response when no remote server is set
//!
//! Handlers run in order until one returns [`ProcessHandlerResult::Terminate`].
//! They are shared by every in-flight request; per-request state lives in
//! the [`StumpsHttpContext`].

mod fallback;
mod proxy;
mod stumps;

pub use fallback::{FallbackHandler, FallbackResponse};
pub use proxy::{ProxyHandler, REQUEST_HEADER_DENY_LIST, RESPONSE_HEADER_STRIP_LIST};
pub use stumps::StumpsHandler;

use crate::http::StumpsHttpContext;
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessHandlerResult {
    /// Let the next handler run.
    Continue,
    /// The response is final.
    Terminate,
}

#[async_trait]
pub trait HttpHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    async fn process_request(&self, context: &mut StumpsHttpContext) -> ProcessHandlerResult;
}

/// Ordered handler chain, fixed at server start.
#[derive(Clone, Default)]
pub struct HttpPipeline {
    handlers: Vec<Arc<dyn HttpHandler>>,
}

impl HttpPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handler: Arc<dyn HttpHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run handlers in order, stopping at the first `Terminate`.
    /// Returns the result of the last handler that ran.
    pub async fn process_request(&self, context: &mut StumpsHttpContext) -> ProcessHandlerResult {
        let mut result = ProcessHandlerResult::Continue;
        for handler in &self.handlers {
            result = handler.process_request(context).await;
            if result == ProcessHandlerResult::Terminate {
                break;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StumpsHttpRequest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        calls: AtomicUsize,
        result: ProcessHandlerResult,
        status: u16,
    }

    impl CountingHandler {
        fn new(result: ProcessHandlerResult, status: u16) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result,
                status,
            })
        }
    }

    #[async_trait]
    impl HttpHandler for CountingHandler {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn process_request(&self, context: &mut StumpsHttpContext) -> ProcessHandlerResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            context.response.status_code = self.status;
            self.result
        }
    }

    fn context() -> StumpsHttpContext {
        StumpsHttpContext::new(StumpsHttpRequest::new("GET", "/"))
    }

    #[tokio::test]
    async fn test_terminate_stops_the_chain() {
        let first = CountingHandler::new(ProcessHandlerResult::Terminate, 201);
        let second = CountingHandler::new(ProcessHandlerResult::Terminate, 202);
        let mut pipeline = HttpPipeline::new();
        pipeline.add(first.clone());
        pipeline.add(second.clone());

        let mut ctx = context();
        let result = pipeline.process_request(&mut ctx).await;

        assert_eq!(result, ProcessHandlerResult::Terminate);
        assert_eq!(ctx.response.status_code, 201);
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_continue_runs_next_handler() {
        let first = CountingHandler::new(ProcessHandlerResult::Continue, 201);
        let second = CountingHandler::new(ProcessHandlerResult::Continue, 202);
        let mut pipeline = HttpPipeline::new();
        pipeline.add(first.clone());
        pipeline.add(second.clone());

        let mut ctx = context();
        let result = pipeline.process_request(&mut ctx).await;

        assert_eq!(result, ProcessHandlerResult::Continue);
        assert_eq!(ctx.response.status_code, 202);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.handler_names(), vec!["counting", "counting"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_continues() {
        let pipeline = HttpPipeline::new();
        let mut ctx = context();
        assert!(pipeline.is_empty());
        assert_eq!(
            pipeline.process_request(&mut ctx).await,
            ProcessHandlerResult::Continue
        );
    }
}
