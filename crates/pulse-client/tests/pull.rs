//! `HttpPullSource` against a wiremock upstream.

use std::collections::BTreeMap;

use assert_matches::assert_matches;
use pulse_client::HttpPullSource;
use pulse_core::{PullSource, Topic, UpstreamError};
use pulse_settings::UpstreamSettings;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer, timeout_ms: u64) -> UpstreamSettings {
    UpstreamSettings {
        base_url: server.uri(),
        timeout_ms,
        paths: BTreeMap::from([
            ("metrics".to_string(), "/metrics".to_string()),
            ("sessions".to_string(), "/sessions/count".to_string()),
        ]),
    }
}

#[tokio::test]
async fn returns_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sessions/count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"active_sessions": 4})))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpPullSource::new(&settings(&server, 2_000)).unwrap();
    let value = source.get(Topic::Sessions).await.unwrap();
    assert_eq!(value["active_sessions"], 4);
}

#[tokio::test]
async fn non_success_status_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let source = HttpPullSource::new(&settings(&server, 2_000)).unwrap();
    let err = source.get(Topic::Metrics).await.unwrap_err();
    assert_matches!(&err, UpstreamError::Unavailable { topic: Topic::Metrics, reason } if reason.contains("503"));
}

#[tokio::test]
async fn non_json_body_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let source = HttpPullSource::new(&settings(&server, 2_000)).unwrap();
    assert_matches!(
        source.get(Topic::Metrics).await,
        Err(UpstreamError::Unavailable { .. })
    );
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metrics"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(std::time::Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let source = HttpPullSource::new(&settings(&server, 50)).unwrap();
    assert_matches!(
        source.get(Topic::Metrics).await,
        Err(UpstreamError::Timeout(Topic::Metrics))
    );
}

#[tokio::test]
async fn unmapped_topic_is_unsupported() {
    let server = MockServer::start().await;
    let source = HttpPullSource::new(&settings(&server, 2_000)).unwrap();
    assert_matches!(
        source.get(Topic::Containers).await,
        Err(UpstreamError::Unsupported(Topic::Containers))
    );
}
