//! Accept loop and per-request processing for a running instance.

use super::core::RequestCounters;
use super::{RequestListener, RequestStage};
use crate::http::{HttpHeaders, HttpStatus, StumpsHttpContext, StumpsHttpRequest, StumpsHttpResponse};
use crate::pipeline::HttpPipeline;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue, TRANSFER_ENCODING};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Everything a running instance needs to answer one request.
pub(super) struct RequestProcessor {
    pipeline: HttpPipeline,
    counters: Arc<RequestCounters>,
    listeners: Vec<RequestListener>,
}

impl RequestProcessor {
    pub(super) fn new(
        pipeline: HttpPipeline,
        counters: Arc<RequestCounters>,
        listeners: Vec<RequestListener>,
    ) -> Self {
        Self {
            pipeline,
            counters,
            listeners,
        }
    }

    fn notify(&self, stage: RequestStage, context: &StumpsHttpContext) {
        for listener in &self.listeners {
            listener(stage, context);
        }
    }

    /// Run one buffered request through the pipeline and bookkeeping.
    pub(super) async fn process(&self, request: StumpsHttpRequest) -> StumpsHttpContext {
        let mut context = StumpsHttpContext::new(request);
        self.notify(RequestStage::Received, &context);

        self.pipeline.process_request(&mut context).await;
        self.notify(RequestStage::Processed, &context);

        self.counters.record(context.response.origin);
        self.notify(RequestStage::Finished, &context);
        context
    }

    async fn handle(
        &self,
        req: Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("Failed to read request body from {}: {}", remote_addr, e);
                let mut response = StumpsHttpResponse::default();
                response.set_status(HttpStatus::BadRequest);
                return Ok(to_hyper_response(&response));
            }
        };

        let headers: HttpHeaders = parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let request = StumpsHttpRequest {
            method: parts.method.as_str().to_string(),
            raw_url: parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string()),
            headers,
            body,
            remote_addr: Some(remote_addr),
        };

        let context = self.process(request).await;
        Ok(to_hyper_response(&context.response))
    }
}

/// Write a context response as a hyper response. Headers that cannot be
/// represented are logged and skipped.
pub(super) fn to_hyper_response(response: &StumpsHttpResponse) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(response.status_code).unwrap_or_else(|_| {
        warn!("Invalid status code {}, answering 500", response.status_code);
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut out = Response::new(Full::new(response.body.clone()));
    *out.status_mut() = status;

    let headers = out.headers_mut();
    for (name, value) in response.headers.iter() {
        if name.eq_ignore_ascii_case("content-length")
            || name.eq_ignore_ascii_case("transfer-encoding")
        {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!("Skipping response header '{}' that cannot be written", name),
        }
    }
    if response.send_chunked {
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    }

    let description = response.status_description.as_str();
    if !description.is_empty() && Some(description) != status.canonical_reason() {
        match hyper::ext::ReasonPhrase::try_from(description.as_bytes()) {
            Ok(reason) => {
                out.extensions_mut().insert(reason);
            }
            Err(_) => debug!("Ignoring status description '{}'", description),
        }
    }

    out
}

/// Accept connections until the shutdown signal fires.
///
/// On shutdown the listener is closed first, then every open connection is
/// told to finish its in-flight request and close. Returns once all
/// connections are gone.
pub(super) async fn accept_loop(
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
    processor: Arc<RequestProcessor>,
    mut shutdown_rx: broadcast::Receiver<()>,
    port: u16,
) {
    let (closing_tx, closing_rx) = watch::channel(false);
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let processor = Arc::clone(&processor);
                        let tls_acceptor = tls_acceptor.clone();
                        let mut closing = closing_rx.clone();
                        connections.spawn(async move {
                            let Some(acceptor) = tls_acceptor else {
                                serve_connection(stream, processor, addr, port, closing).await;
                                return;
                            };
                            let handshake = tokio::select! {
                                result = acceptor.accept(stream) => Some(result),
                                _ = closing.wait_for(|closing| *closing) => None,
                            };
                            match handshake {
                                Some(Ok(stream)) => {
                                    serve_connection(stream, processor, addr, port, closing).await
                                }
                                Some(Err(e)) => {
                                    debug!("TLS handshake with {} failed on port {}: {}", addr, port, e)
                                }
                                None => {}
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error on port {}: {}", port, e);
                    }
                }
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown_rx.recv() => {
                info!("Server on port {} shutting down", port);
                break;
            }
        }
    }

    drop(listener);
    closing_tx.send_replace(true);
    let open = connections.len();
    if open > 0 {
        debug!("Draining {} connections on port {}", open, port);
    }
    while connections.join_next().await.is_some() {}
}

/// Serve one connection until the client closes it or `closing` turns true.
/// Once closing, no new request is read from the connection.
async fn serve_connection<S>(
    stream: S,
    processor: Arc<RequestProcessor>,
    addr: SocketAddr,
    port: u16,
    mut closing: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let processor = Arc::clone(&processor);
        async move { processor.handle(req, addr).await }
    });
    let connection = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(connection);

    let mut draining = false;
    let result = loop {
        tokio::select! {
            result = connection.as_mut() => break result,
            _ = closing.wait_for(|closing| *closing), if !draining => {
                draining = true;
                connection.as_mut().graceful_shutdown();
            }
        }
    };
    if let Err(e) = result {
        debug!("Connection error on port {}: {}", port, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ResponseOrigin;
    use crate::pipeline::{FallbackHandler, FallbackResponse, StumpsHandler};
    use crate::predicate::{Rule, UrlRule};
    use crate::stump::{Stump, StumpResponse, StumpsManager};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;

    fn processor(listeners: Vec<RequestListener>) -> (RequestProcessor, Arc<RequestCounters>) {
        let manager = Arc::new(StumpsManager::new());
        manager
            .add(
                Stump::new("hello")
                    .with_rule(Rule::Url(UrlRule::new("/hello").unwrap()))
                    .with_response(StumpResponse::new(200, "OK").with_body("hi")),
            )
            .unwrap();

        let mut pipeline = HttpPipeline::new();
        pipeline.add(Arc::new(StumpsHandler::new(
            manager,
            Arc::new(AtomicBool::new(true)),
        )));
        pipeline.add(Arc::new(FallbackHandler::new(
            FallbackResponse::Http404NotFound,
        )));
        let counters = Arc::new(RequestCounters::default());
        (
            RequestProcessor::new(pipeline, Arc::clone(&counters), listeners),
            counters,
        )
    }

    #[tokio::test]
    async fn test_listeners_see_stages_in_order() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&stages);
        let listener: RequestListener = Arc::new(move |stage: RequestStage, context: &StumpsHttpContext| {
            seen.lock().push((stage, context.response.origin));
        });
        let (processor, counters) = processor(vec![listener]);

        let context = processor
            .process(StumpsHttpRequest::new("GET", "/hello"))
            .await;

        assert_eq!(context.response.origin, ResponseOrigin::Stump);
        assert_eq!(
            *stages.lock(),
            vec![
                (RequestStage::Received, ResponseOrigin::Unprocessed),
                (RequestStage::Processed, ResponseOrigin::Stump),
                (RequestStage::Finished, ResponseOrigin::Stump),
            ]
        );
        assert_eq!(counters.total_requests(), 1);
        assert_eq!(counters.stumps_served(), 1);
    }

    #[tokio::test]
    async fn test_counters_track_origins() {
        let (processor, counters) = processor(Vec::new());
        for url in ["/hello", "/missing", "/hello", "/other"] {
            processor.process(StumpsHttpRequest::new("GET", url)).await;
        }
        assert_eq!(counters.total_requests(), 4);
        assert_eq!(counters.stumps_served(), 2);
        assert_eq!(counters.remote_served(), 0);
    }

    #[test]
    fn test_to_hyper_response() {
        let mut response = StumpsHttpResponse::default();
        response.status_code = 299;
        response.status_description = "Mostly Fine".to_string();
        response.headers.set("X-Ok", "1");
        response.headers.set("Content-Length", "999");
        response.headers.set("X-Bad", "a\nb");
        response.send_chunked = true;

        let out = to_hyper_response(&response);
        assert_eq!(out.status().as_u16(), 299);
        assert_eq!(out.headers()["x-ok"], "1");
        assert!(out.headers().get("content-length").is_none());
        assert!(out.headers().get("x-bad").is_none());
        assert_eq!(out.headers()["transfer-encoding"], "chunked");
        let reason = out.extensions().get::<hyper::ext::ReasonPhrase>().unwrap();
        assert_eq!(reason.as_bytes(), b"Mostly Fine");
    }

    #[test]
    fn test_invalid_status_code_becomes_500() {
        let mut response = StumpsHttpResponse::default();
        response.status_code = 42;
        assert_eq!(to_hyper_response(&response).status().as_u16(), 500);
    }
}
