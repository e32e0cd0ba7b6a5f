//! HTTP fetch layer against a local mock server.

use compliance_runtime::acquisition::{
    fetch_document_text, fetch_page_text, fetch_text_with_retry, FetchError, Fetcher, HttpClient,
    RetryPolicy,
};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> HttpClient {
    HttpClient::new(Duration::from_secs(5))
}

fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        attempts,
        base_delay: Duration::from_millis(1),
    }
}

#[tokio::test]
async fn test_fetch_text_ok() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Name,Category\n"))
        .mount(&server)
        .await;

    let body = client()
        .fetch_text(&format!("{}/products.csv", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, "Name,Category\n");
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client()
        .fetch_bytes(&format!("{}/missing", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_retry_recovers_from_transient_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vendors"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vendors"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client();
    let body = fetch_text_with_retry(&client, &format!("{}/vendors", server.uri()), fast_retry(3))
        .await
        .unwrap();
    assert_eq!(body, "[]");
}

#[tokio::test]
async fn test_retry_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(410))
        .expect(1)
        .mount(&server)
        .await;

    let client = client();
    let err = fetch_text_with_retry(&client, &format!("{}/down", server.uri()), fast_retry(2))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 502, .. }));

    // Client errors are not retried.
    let err = fetch_text_with_retry(&client, &format!("{}/gone", server.uri()), fast_retry(5))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 410, .. }));
}

#[tokio::test]
async fn test_page_and_document_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/detail"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<html><head><title>x</title></head><body><h1>Module</h1><p>ML-KEM</p></body></html>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/target.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"plain security target".to_vec()))
        .mount(&server)
        .await;

    let client = client();
    let page = fetch_page_text(&client, &format!("{}/detail", server.uri()))
        .await
        .unwrap();
    assert_eq!(page, "Module\nML-KEM");

    let doc = fetch_document_text(&client, &format!("{}/target.txt", server.uri()))
        .await
        .unwrap();
    assert_eq!(doc, "plain security target");
}
