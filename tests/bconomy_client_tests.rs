mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use chrono::DateTime;
use serde_json::json;

use market_tracker::error::{ConfigError, FetchError};
use market_tracker::services::bconomy::{BconomyClient, MarketApi, MarketListing};
use market_tracker::services::rate_limiter::RateLimiter;

use crate::common::{bconomy_config, StubApi};

fn client_for(base_url: &str) -> BconomyClient {
    let config = bconomy_config(base_url);
    let limiter = Arc::new(RateLimiter::new(config.rate_limit_per_sec));
    BconomyClient::new(&config, limiter).unwrap()
}

#[tokio::test]
async fn test_market_preview_sends_key_and_parses_snapshot() {
    let stub = StubApi::new(vec![(
        "marketPreview",
        StatusCode::OK,
        r#"{"lastUpdated": 1750000000765, "data": {"item0": 120, "item1": 35.0, "item7": null}}"#,
    )]);
    let base_url = stub.spawn().await;

    let preview = client_for(&base_url).market_preview().await.unwrap();

    assert_eq!(preview.last_updated, DateTime::from_timestamp(1_750_000_000, 0));
    assert_eq!(preview.price(0).unwrap(), Some(120));
    assert_eq!(preview.price(1).unwrap(), Some(35));
    assert_eq!(preview.price(7).unwrap(), None);
    assert_eq!(preview.price(99).unwrap(), None);

    let recorded = stub.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].api_key.as_deref(), Some("test-key"));
    assert_eq!(recorded[0].body, json!({"type": "marketPreview"}));
}

#[tokio::test]
async fn test_market_listings_request_names_the_item() {
    let stub = StubApi::new(vec![(
        "marketListings:7",
        StatusCode::OK,
        r#"[{"id": 7, "price": 40, "amount": 3}, {"id": 7, "price": 38, "amount": 1}]"#,
    )]);
    // Trailing slash on the base URL must not produce a double slash
    let base_url = format!("{}/", stub.spawn().await);

    let listings = client_for(&base_url).market_listings(7).await.unwrap();

    assert_eq!(
        listings,
        vec![
            MarketListing { id: 7, price: 40, amount: 3 },
            MarketListing { id: 7, price: 38, amount: 1 },
        ]
    );
    assert_eq!(stub.recorded()[0].body, json!({"type": "marketListings", "itemId": 7}));
}

#[tokio::test]
async fn test_non_success_status_is_reported_with_body() {
    let stub = StubApi::new(vec![(
        "marketPreview",
        StatusCode::TOO_MANY_REQUESTS,
        "slow down",
    )]);
    let base_url = stub.spawn().await;

    let err = client_for(&base_url).market_preview().await.unwrap_err();

    match err {
        FetchError::Status { status, body } => {
            assert_eq!(status.as_u16(), 429);
            assert_eq!(body, "slow down");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_payloads_fail_closed() {
    let stub = StubApi::new(vec![
        ("marketPreview", StatusCode::OK, r#"{"lastUpdated": 1, "prices": {}}"#),
        ("marketListings:1", StatusCode::OK, "<html>maintenance</html>"),
        ("marketListings:2", StatusCode::OK, r#"[{"id": 2, "price": 10, "amount": -4}]"#),
    ]);
    let base_url = stub.spawn().await;
    let client = client_for(&base_url);

    assert!(matches!(client.market_preview().await, Err(FetchError::Parse(_))));
    assert!(matches!(client.market_listings(1).await, Err(FetchError::Parse(_))));
    assert!(matches!(client.market_listings(2).await, Err(FetchError::Parse(_))));
}

#[tokio::test]
async fn test_client_requires_api_key() {
    let mut config = bconomy_config("http://127.0.0.1:9");
    config.api_key = None;
    let limiter = Arc::new(RateLimiter::new(10));

    let result = BconomyClient::new(&config, limiter);

    assert!(matches!(result, Err(ConfigError::Missing("BCONOMY_API_KEY"))));
}
