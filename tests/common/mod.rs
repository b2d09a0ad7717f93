#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Router};
use sea_orm::{Database, DatabaseConnection, DbErr};
use serde_json::Value;
use std::env;

use market_tracker::config::BconomyConfig;

/// Set up test database connection
/// Uses TEST_DATABASE_URL environment variable or falls back to default
pub async fn setup_test_db() -> Result<DatabaseConnection, DbErr> {
    let database_url = env::var("TEST_DATABASE_URL").unwrap_or_else(|_| {
        "postgresql://market_user@localhost:5432/market_tracker_test".to_string()
    });

    Database::connect(&database_url).await
}

/// One request captured by the stub API
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub api_key: Option<String>,
    pub body: Value,
}

/// Canned `/api/data` responses keyed by request: `marketPreview` or `marketListings:<id>`
#[derive(Clone, Default)]
pub struct StubApi {
    responses: Arc<HashMap<String, (StatusCode, String)>>,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubApi {
    pub fn new(responses: Vec<(&str, StatusCode, &str)>) -> Self {
        Self {
            responses: Arc::new(
                responses
                    .into_iter()
                    .map(|(key, status, body)| (key.to_string(), (status, body.to_string())))
                    .collect(),
            ),
            requests: Arc::default(),
        }
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Serve on an ephemeral local port; returns the base URL.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/api/data", post(handle_data))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }
}

async fn handle_data(
    State(stub): State<StubApi>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let body: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    stub.requests.lock().unwrap().push(RecordedRequest {
        api_key: headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });

    let key = match (body["type"].as_str(), body["itemId"].as_i64()) {
        (Some(kind), Some(item_id)) => format!("{}:{}", kind, item_id),
        (Some(kind), None) => kind.to_string(),
        _ => String::new(),
    };

    stub.responses
        .get(&key)
        .cloned()
        .unwrap_or((StatusCode::NOT_FOUND, "unknown request".to_string()))
}

/// Client settings pointing at `base_url`, fast enough not to slow tests down.
pub fn bconomy_config(base_url: &str) -> BconomyConfig {
    BconomyConfig {
        base_url: base_url.to_string(),
        api_key: Some("test-key".to_string()),
        rate_limit_per_sec: 1000,
        concurrency: 4,
        request_timeout: Duration::from_secs(5),
    }
}
