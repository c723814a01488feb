//! End-to-end request flow through a hosted instance.

mod common;

use std::sync::Arc;
use stumps_server::config::ProxyClientConfig;
use stumps_server::host::{DataAccess, HostSettings, InMemoryDataAccess, StumpsHost};
use stumps_server::http::ResponseOrigin;
use stumps_server::pipeline::FallbackResponse;
use stumps_server::predicate::{HttpMethodRule, Rule, UrlRule};
use stumps_server::server::StumpsServer;
use stumps_server::stump::{Stump, StumpResponse};

fn host() -> StumpsHost {
    let data_access: Arc<dyn DataAccess> = Arc::new(InMemoryDataAccess::new());
    StumpsHost::new(
        data_access,
        HostSettings {
            proxy: ProxyClientConfig {
                request_timeout_secs: 5,
                ..ProxyClientConfig::default()
            },
            ..HostSettings::default()
        },
    )
}

fn greeting_stump() -> Stump {
    Stump::new("greeting")
        .with_rule(Rule::HttpMethod(HttpMethodRule::new("GET").unwrap()))
        .with_rule(Rule::Url(UrlRule::new("/hello*").unwrap()))
        .with_response(
            StumpResponse::new(200, "OK")
                .with_header("Content-Type", "text/plain")
                .with_body("from stump"),
        )
}

#[tokio::test]
async fn test_stumps_then_remote_with_counters_and_recordings() {
    let upstream = common::spawn_upstream("from upstream").await;
    let host = host();
    let port = common::unused_port();
    let instance = host
        .create_instance(&format!("http://{upstream}"), port, false, true)
        .await
        .unwrap();
    instance.create_stump(greeting_stump()).unwrap();
    instance.set_record_traffic(true);

    let client = common::client();
    let base = format!("http://127.0.0.1:{port}");

    let stumped = client.get(format!("{base}/hello/world")).send().await.unwrap();
    assert_eq!(stumped.status(), 200);
    assert_eq!(stumped.text().await.unwrap(), "from stump");

    let proxied = client.get(format!("{base}/other?x=1")).send().await.unwrap();
    assert_eq!(proxied.status(), 200);
    assert_eq!(
        proxied.headers().get("x-upstream-path").unwrap(),
        "/other"
    );
    assert_eq!(proxied.text().await.unwrap(), "from upstream");

    assert_eq!(instance.total_requests(), 2);
    assert_eq!(instance.stumps_served(), 1);
    assert_eq!(instance.remote_served(), 1);

    let recordings = instance.recordings().find(-1);
    assert_eq!(recordings.len(), 2);
    assert_eq!(recordings[0].request.raw_url, "/hello/world");
    assert_eq!(recordings[0].response.origin, ResponseOrigin::Stump);
    assert_eq!(recordings[0].response.stump_id.as_deref(), Some("greeting"));
    assert_eq!(recordings[1].request.raw_url, "/other?x=1");
    assert_eq!(recordings[1].response.origin, ResponseOrigin::RemoteServer);
    assert_eq!(recordings[1].response.body.bytes.as_ref(), b"from upstream");

    instance.set_record_traffic(false);
    instance.set_stumps_enabled(false);
    let bypassed = client.get(format!("{base}/hello/world")).send().await.unwrap();
    assert_eq!(bypassed.text().await.unwrap(), "from upstream");
    assert_eq!(instance.total_requests(), 3);
    assert_eq!(instance.remote_served(), 2);
    assert_eq!(instance.recordings().count(), 2);

    host.shutdown_all().await;
}

#[tokio::test]
async fn test_unreachable_remote_yields_service_unavailable() {
    let host = host();
    let port = common::unused_port();
    let dead = common::unused_port();
    let instance = host
        .create_instance(&format!("127.0.0.1:{dead}"), port, false, true)
        .await
        .unwrap();

    let response = common::client()
        .get(format!("http://127.0.0.1:{port}/anything"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    assert_eq!(instance.total_requests(), 1);
    assert_eq!(instance.remote_served(), 0);
    assert_eq!(instance.stumps_served(), 0);

    host.shutdown_all().await;
}

#[tokio::test]
async fn test_standalone_server_serves_stumps_and_fallback() {
    let server = StumpsServer::new(common::unused_port()).unwrap();
    server
        .set_default_response(FallbackResponse::Http404NotFound)
        .unwrap();
    server.stumps().add(greeting_stump()).unwrap();
    server.start().await.unwrap();
    let base = format!("http://127.0.0.1:{}", server.port());

    let client = common::client();
    let hit = client.get(format!("{base}/hello")).send().await.unwrap();
    assert_eq!(hit.status(), 200);
    assert_eq!(
        hit.headers().get("content-type").unwrap(),
        "text/plain"
    );
    assert_eq!(hit.text().await.unwrap(), "from stump");

    let miss = client.post(format!("{base}/hello")).send().await.unwrap();
    assert_eq!(miss.status(), 404);

    assert_eq!(server.total_requests(), 2);
    assert_eq!(server.stumps_served(), 1);
    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_kept_alive_connections() {
    let server = StumpsServer::new(common::unused_port()).unwrap();
    server
        .set_default_response(FallbackResponse::Http404NotFound)
        .unwrap();
    server.start().await.unwrap();
    let url = format!("http://127.0.0.1:{}/anything", server.port());

    let client = common::client();
    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), 404);
    first.bytes().await.unwrap();

    server.shutdown().await;
    assert!(!server.is_running());

    let after = client.get(&url).send().await;
    assert!(after.is_err());
    assert_eq!(server.total_requests(), 1);
}

#[tokio::test]
async fn test_restart_serves_new_settings_to_same_client() {
    let server = StumpsServer::new(common::unused_port()).unwrap();
    server
        .set_default_response(FallbackResponse::Http404NotFound)
        .unwrap();
    server.start().await.unwrap();
    let url = format!("http://127.0.0.1:{}/anything", server.port());

    let client = common::client();
    let before = client.get(&url).send().await.unwrap();
    assert_eq!(before.status(), 404);
    before.bytes().await.unwrap();

    server.shutdown().await;
    server
        .set_default_response(FallbackResponse::Http503ServiceUnavailable)
        .unwrap();
    server.start().await.unwrap();

    let after = client.get(&url).send().await.unwrap();
    assert_eq!(after.status(), 503);
    assert_eq!(server.total_requests(), 2);
    server.shutdown().await;
}
