//! Integration tests for the storefront client against a mock server

mod common;

use std::time::{Duration, Instant};

use hb_fetcher::app::{
    ClientConfig, Credential, HashAlgorithm, OrderKey, Platform, StorefrontClient,
};
use hb_fetcher::errors::{ApiError, AuthError};
use httpmock::prelude::*;
use serde_json::json;

use common::fast_retry;

const ORDER_LIST: &str = "/api/v1/user/order";

fn client(server: &MockServer, max_attempts: u32) -> StorefrontClient {
    let config = ClientConfig::default()
        .with_base_url(server.base_url())
        .with_rate_limit(100)
        .with_retry(fast_retry(max_attempts));
    StorefrontClient::new(config).unwrap()
}

fn order_json(server: &MockServer) -> serde_json::Value {
    json!({
        "gamekey": "abc123",
        "created": "2016-03-15T19:17:08.135640",
        "product": {"human_name": "abc123-order-name"},
        "subproducts": [{
            "human_name": "Game",
            "downloads": [
                {
                    "platform": "windows",
                    "download_struct": [{
                        "name": "Download",
                        "url": {"web": server.url("/files/game.zip")},
                        "file_size": 1000,
                        "md5": "0123456789abcdef0123456789abcdef"
                    }]
                },
                {
                    "platform": "ebook",
                    "download_struct": [{
                        "name": "PDF",
                        "url": {"web": server.url("/files/My%20Book.pdf")}
                    }]
                }
            ]
        }]
    })
}

async fn mock_order_list<'a>(server: &'a MockServer, keys: &[&str]) -> httpmock::Mock<'a> {
    let body: Vec<_> = keys.iter().map(|k| json!({ "gamekey": k })).collect();
    server
        .mock_async(|when, then| {
            when.method(GET).path(ORDER_LIST);
            then.status(200).json_body(json!(body));
        })
        .await
}

#[tokio::test]
async fn test_authenticate_and_list_orders() {
    let server = MockServer::start_async().await;
    let list = mock_order_list(&server, &["abc123", "def456"]).await;
    let client = client(&server, 3);

    let session = client
        .authenticate(&Credential::new("good-cookie"))
        .await
        .unwrap();
    let keys = client.list_order_keys(&session).await.unwrap();

    assert_eq!(keys, vec![OrderKey::new("abc123"), OrderKey::new("def456")]);
    list.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_session_cookie_is_sent() {
    let server = MockServer::start_async().await;
    let list = server
        .mock_async(|when, then| {
            when.method(GET)
                .path(ORDER_LIST)
                .header("cookie", "_simple_auth=good-cookie");
            then.status(200).json_body(json!([]));
        })
        .await;

    client(&server, 1)
        .authenticate(&Credential::new("good-cookie"))
        .await
        .unwrap();
    list.assert_async().await;
}

#[tokio::test]
async fn test_rejected_cookie_is_invalid() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(ORDER_LIST);
            then.status(401);
        })
        .await;

    let err = client(&server, 3)
        .authenticate(&Credential::new("bad-cookie"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Invalid));
}

#[tokio::test]
async fn test_login_page_response_is_invalid() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(ORDER_LIST);
            then.status(200)
                .header("content-type", "text/html")
                .body("<html>Please log in</html>");
        })
        .await;

    let err = client(&server, 3)
        .authenticate(&Credential::new("expired"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Invalid));
}

#[tokio::test]
async fn test_unreachable_storefront_is_network_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = ClientConfig::default()
        .with_base_url(format!("http://127.0.0.1:{}", port))
        .with_retry(fast_retry(2));
    let client = StorefrontClient::new(config).unwrap();

    let err = client
        .authenticate(&Credential::new("cookie"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NetworkError { .. }));
}

#[tokio::test]
async fn test_missing_credential() {
    let server = MockServer::start_async().await;
    let err = client(&server, 1)
        .authenticate(&Credential::new("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::MissingCredential));
}

#[tokio::test]
async fn test_fetch_order_detail() {
    let server = MockServer::start_async().await;
    mock_order_list(&server, &["abc123"]).await;
    let detail = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/order/abc123")
                .query_param("all_tpkds", "true");
            then.status(200).json_body(order_json(&server));
        })
        .await;

    let client = client(&server, 3);
    let session = client.authenticate(&Credential::new("cookie")).await.unwrap();
    let order = client
        .fetch_order_detail(&session, &OrderKey::new("abc123"))
        .await
        .unwrap();

    detail.assert_async().await;
    assert_eq!(order.human_name, "abc123-order-name");
    assert!(order.created.is_some());
    assert_eq!(order.files.len(), 2);

    let game = &order.files[0];
    assert_eq!(game.display_name, "game.zip");
    assert_eq!(game.platform, Platform::Windows);
    assert_eq!(game.declared_size, Some(1000));
    assert_eq!(
        game.declared_hash.as_ref().map(|h| h.algorithm()),
        Some(HashAlgorithm::Md5)
    );

    let book = &order.files[1];
    assert_eq!(book.display_name, "My Book.pdf");
    assert_eq!(book.platform, Platform::Ebook);
    assert_eq!(book.declared_size, None);
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let server = MockServer::start_async().await;
    mock_order_list(&server, &[]).await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/order/gone");
            then.status(404);
        })
        .await;

    let client = client(&server, 3);
    let session = client.authenticate(&Credential::new("cookie")).await.unwrap();
    let err = client
        .fetch_order_detail(&session, &OrderKey::new("gone"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::NotFound { ref order_key } if order_key == "gone"));
    assert_eq!(err.kind(), "not-found");
}

#[tokio::test]
async fn test_malformed_order_is_parse_error() {
    let server = MockServer::start_async().await;
    mock_order_list(&server, &["abc123"]).await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/order/abc123");
            then.status(200).json_body(json!({"subproducts": "nope"}));
        })
        .await;

    let client = client(&server, 3);
    let session = client.authenticate(&Credential::new("cookie")).await.unwrap();
    let err = client
        .fetch_order_detail(&session, &OrderKey::new("abc123"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ParseError { .. }));
}

#[tokio::test]
async fn test_rate_limit_waits_for_retry_after() {
    let server = MockServer::start_async().await;
    mock_order_list(&server, &["abc123"]).await;
    let limited = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/order/abc123");
            then.status(429).header("Retry-After", "1");
        })
        .await;

    let client = client(&server, 2);
    let session = client.authenticate(&Credential::new("cookie")).await.unwrap();

    let started = Instant::now();
    let err = client
        .fetch_order_detail(&session, &OrderKey::new("abc123"))
        .await
        .unwrap_err();

    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(matches!(err, ApiError::RateLimited { retry_after } if retry_after == Duration::from_secs(1)));
    limited.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_rate_limit_recovers() {
    let server = MockServer::start_async().await;
    mock_order_list(&server, &["abc123"]).await;
    let mut limited = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/order/abc123");
            then.status(429).header("Retry-After", "1");
        })
        .await;

    let client = client(&server, 3);
    let session = client.authenticate(&Credential::new("cookie")).await.unwrap();

    let key = OrderKey::new("abc123");
    let fetch = client.fetch_order_detail(&session, &key);
    let swap = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        limited.delete_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v1/order/abc123");
                then.status(200).json_body(order_json(&server));
            })
            .await
    };
    let (order, _ok) = tokio::join!(fetch, swap);

    assert_eq!(order.unwrap().human_name, "abc123-order-name");
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start_async().await;
    mock_order_list(&server, &["abc123"]).await;
    let failing = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/order/abc123");
            then.status(503);
        })
        .await;

    let client = client(&server, 3);
    let session = client.authenticate(&Credential::new("cookie")).await.unwrap();
    let err = client
        .fetch_order_detail(&session, &OrderKey::new("abc123"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Server { status: 503, .. }));
    failing.assert_hits_async(3).await;
}
