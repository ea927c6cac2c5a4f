// tests/http_transport.rs
// Shared HTTP client retries and the Telegram transport, against a local mock server.

use std::time::Duration;

use listing_watch::http::HttpClient;
use listing_watch::notify::telegram::TelegramTransport;
use listing_watch::notify::{Transport, TransportError};
use listing_watch::Settings;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> HttpClient {
    HttpClient::from_settings(&Settings::default().without_delays()).unwrap()
}

#[tokio::test]
async fn transient_statuses_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listing"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/listing"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let body = client()
        .get_text(&format!("{}/listing", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn retries_give_up_eventually() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .expect(4) // first try + 3 retries
        .mount(&server)
        .await;

    let f = client().get(&server.uri(), &[]).await.unwrap();
    assert_eq!(f.status.as_u16(), 502);
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let c = client();
    assert_eq!(c.get_optional(&format!("{}/annonce/9", server.uri())).await.unwrap(), None);
}

#[tokio::test]
async fn telegram_sends_message_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botT0KEN/sendMessage"))
        .and(body_partial_json(json!({
            "chat_id": "-100",
            "text": "[COFIM] Bar",
            "disable_web_page_preview": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let t = TelegramTransport::new(reqwest::Client::new(), "T0KEN".into()).with_api_base(server.uri());
    t.send("-100", "[COFIM] Bar").await.unwrap();
}

#[tokio::test]
async fn telegram_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 7",
            "parameters": {"retry_after": 7}
        })))
        .mount(&server)
        .await;

    let t = TelegramTransport::new(reqwest::Client::new(), "T0KEN".into()).with_api_base(server.uri());
    match t.send("-100", "hi").await {
        Err(TransportError::RateLimited { retry_after }) => {
            assert_eq!(retry_after, Duration::from_secs(7))
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
}

#[tokio::test]
async fn telegram_hard_failure_hides_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request: chat not found"))
        .mount(&server)
        .await;

    let t = TelegramTransport::new(reqwest::Client::new(), "S3CRET".into()).with_api_base(server.uri());
    let err = t.send("-1", "hi").await.unwrap_err();
    let msg = err.to_string();
    assert!(matches!(err, TransportError::Failed(_)));
    assert!(msg.contains("chat not found"));
    assert!(!msg.contains("S3CRET"));
}
