//! HTTP-level tests for the gateway client against a mock server: header
//! wiring, response-shape tolerance, and failure diagnostics.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storefront_api::{
    config::GatewayConfig,
    errors::ServiceError,
    gateway::{PaymentGateway, PortOneClient},
};

fn client_for(server: &MockServer, timeout_secs: u64) -> PortOneClient {
    PortOneClient::new(&GatewayConfig {
        base_url: server.uri(),
        api_secret: "sk-test".into(),
        timeout_secs,
    })
    .expect("client builds")
}

#[tokio::test]
async fn fetch_sends_gateway_auth_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payments/pay-1"))
        .and(header("Authorization", "PortOne sk-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "PAID", "method": {"type": "Card"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let payment = client_for(&server, 5).fetch_payment("pay-1").await.unwrap();
    assert_eq!(payment["status"], "PAID");
}

#[tokio::test]
async fn fetch_failure_carries_upstream_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payments/pay-missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("payment not registered"))
        .mount(&server)
        .await;

    let err = client_for(&server, 5)
        .fetch_payment("pay-missing")
        .await
        .unwrap_err();

    match err {
        ServiceError::VerificationFailed { status, detail } => {
            assert_eq!(status, Some(404));
            assert!(detail.contains("payment not registered"));
        }
        other => panic!("expected VerificationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn fetch_timeout_is_verification_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payments/pay-slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "PAID"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let err = client_for(&server, 1)
        .fetch_payment("pay-slow")
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::VerificationFailed { .. }));
}

#[tokio::test]
async fn search_tolerates_bare_array_shape() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payments"))
        .and(query_param("merchant_uid[]", "ORD-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "pay-1", "status": "PAID"}])),
        )
        .mount(&server)
        .await;

    let results = client_for(&server, 5)
        .search_by_merchant_id("ORD-1")
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], "pay-1");
}

#[tokio::test]
async fn search_tolerates_wrapped_data_shape() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payments"))
        .and(query_param("merchant_uid[]", "ORD-2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": [{"id": "pay-2"}, {"id": "pay-3"}]})),
        )
        .mount(&server)
        .await;

    let results = client_for(&server, 5)
        .search_by_merchant_id("ORD-2")
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["id"], "pay-2");
}

#[tokio::test]
async fn search_rejects_unrecognized_shape() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payments": 3})))
        .mount(&server)
        .await;

    let err = client_for(&server, 5)
        .search_by_merchant_id("ORD-3")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::GatewayLookupFailed(_)));
}

#[tokio::test]
async fn search_http_error_is_lookup_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/payments"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let err = client_for(&server, 5)
        .search_by_merchant_id("ORD-4")
        .await
        .unwrap_err();

    match err {
        ServiceError::GatewayLookupFailed(detail) => {
            assert!(detail.contains("500"));
            assert!(detail.contains("upstream exploded"));
        }
        other => panic!("expected GatewayLookupFailed, got {other:?}"),
    }
}
