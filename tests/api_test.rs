//! Read API tests driving the router directly

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use sentiment_pipeline::api::{self, ApiState};
use sentiment_pipeline::config::ServerConfig;
use sentiment_pipeline::metrics::MetricsCollector;
use sentiment_pipeline::models::{Enrichment, NewMessage};
use sentiment_pipeline::{Database, SqliteRepository};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

struct Fixture {
    _dir: TempDir,
    app: Router,
    channel_id: i64,
}

fn server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        default_message_limit: 100,
        max_message_limit: 1000,
    }
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite:{}", dir.path().join("api.db").display());
    let db = Database::new(&url).expect("database opens");

    let user = db.get_or_create_user("u1", "alice").expect("user");
    let channel = db.get_or_create_channel("c1", "alpha").expect("channel");
    db.get_or_create_channel("c2", "empty").expect("channel");

    let rows = [
        ("m1", "Bitcoin", Some(0.8), Some(0.9), 30 * 24 * 60, "old news"),
        ("m2", "Bitcoin", Some(0.2), Some(0.5), 60, "recent take"),
        ("m3", "Bitcoin", None, None, 5, "latest, no score"),
        ("m4", "Ethereum", Some(-0.6), Some(0.7), 10, "eth bearish"),
    ];
    for (id, protocol, score, confidence, minutes_ago, content) in rows {
        db.insert_message_if_absent(NewMessage {
            external_id: id.to_string(),
            user_id: user.id,
            channel_id: channel.id,
            content: content.to_string(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            enrichment: Enrichment {
                protocol_name: Some(protocol.to_string()),
                sentiment_score: score,
                confidence,
                risk_assessment: Some(format!("risk of {id}")),
                ..Enrichment::default()
            },
        })
        .expect("insert");
    }

    let repo = Arc::new(SqliteRepository::new(db, Arc::new(MetricsCollector::new())));
    let app = api::router(ApiState::new(repo, &server_config()));
    Fixture {
        _dir: dir,
        app,
        channel_id: channel.id,
    }
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
        .await
        .expect("response");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let body = serde_json::from_slice(&bytes).expect("json body");
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let f = fixture();
    let (status, body) = get(&f.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["messages"], 4);
}

#[tokio::test]
async fn test_protocols_sorted() {
    let f = fixture();
    let (status, body) = get(&f.app, "/protocols").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!(["Bitcoin", "Ethereum"]));
}

#[tokio::test]
async fn test_protocol_sentiment_all_time() {
    let f = fixture();
    let (status, body) = get(&f.app, "/protocols/Bitcoin/sentiment").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["protocol_name"], "Bitcoin");
    assert_eq!(body["message_count"], 3);
    assert!((body["average_sentiment"].as_f64().expect("number") - 0.5).abs() < 1e-9);
    assert!((body["average_confidence"].as_f64().expect("number") - 0.7).abs() < 1e-9);
    assert_eq!(body["latest_message"], "latest, no score");
    assert_eq!(body["latest_risk_assessment"], "risk of m3");
    assert!(body["window_days"].is_null());
}

#[tokio::test]
async fn test_protocol_sentiment_windowed() {
    let f = fixture();
    let (status, body) = get(&f.app, "/protocols/Bitcoin/sentiment?windowDays=7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message_count"], 2);
    assert!((body["average_sentiment"].as_f64().expect("number") - 0.2).abs() < 1e-9);
    assert_eq!(body["window_days"], 7);
}

#[tokio::test]
async fn test_protocol_sentiment_not_found() {
    let f = fixture();
    let (status, body) = get(&f.app, "/protocols/Solana/sentiment").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().expect("message").contains("Solana"));

    let (status, _) = get(&f.app, "/protocols/bitcoin/sentiment").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_protocol_sentiment_rejects_bad_window() {
    let f = fixture();
    let (status, body) = get(&f.app, "/protocols/Bitcoin/sentiment?windowDays=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = get(&f.app, "/protocols/Bitcoin/sentiment?windowDays=abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_channel_messages_newest_first_with_limit() {
    let f = fixture();
    let uri = format!("/channels/{}/messages?limit=2", f.channel_id);
    let (status, body) = get(&f.app, &uri).await;
    assert_eq!(status, StatusCode::OK);

    let items = body.as_array().expect("array");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["external_id"], "m3");
    assert_eq!(items[1]["external_id"], "m4");
    assert!(items[0]["sentiment_score"].is_null());
}

#[tokio::test]
async fn test_channel_messages_unknown_and_empty() {
    let f = fixture();
    let (status, _) = get(&f.app, "/channels/9999/messages").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, channels) = get(&f.app, "/channels").await;
    let empty_id = channels
        .as_array()
        .expect("array")
        .iter()
        .find(|c| c["external_id"] == "c2")
        .and_then(|c| c["id"].as_i64())
        .expect("empty channel listed");
    let (status, body) = get(&f.app, &format!("/channels/{empty_id}/messages")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!([]));

    let (status, _) = get(&f.app, "/channels/not-a-number/messages").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_limit_bounds() {
    let f = fixture();
    let (status, _) = get(&f.app, "/messages?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&f.app, "/messages?limit=1001").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(&f.app, "/messages?limit=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().expect("array").len(), 3);
}

#[tokio::test]
async fn test_users_listed() {
    let f = fixture();
    let (status, body) = get(&f.app, "/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["display_name"], "alice");
}
