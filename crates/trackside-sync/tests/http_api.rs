//! ApiClient and the HTTP-driven components against an in-process axum server.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures_util::{StreamExt, stream};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use trackside_core::analytics::{Period, TimeRange};
use trackside_core::command::{HintResponse, HintVerdict, SignalStatus, SignalStatusUpdate};
use trackside_sync::event::{HintsOrigin, StreamStatus};
use trackside_sync::http::{AuditSource, HintsSource, MetricsSource};
use trackside_sync::{
    ApiClient, ApiConfig, AuditTailer, PollingCoordinator, SyncError, SyncEvent, TailerConfig,
    event_channel,
};

type Recorded = Arc<Mutex<Vec<(HashMap<String, String>, Option<String>)>>>;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base: &str, api_key: Option<&str>) -> Arc<ApiClient> {
    let mut config = ApiConfig::new(base);
    config.api_key = api_key.map(str::to_string);
    Arc::new(ApiClient::new(config).unwrap())
}

fn api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn next_event(rx: &mut mpsc::Receiver<SyncEvent>) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for sync event")
        .expect("event channel closed")
}

#[tokio::test]
async fn hints_request_carries_recompute_flag_and_api_key() {
    let recorded: Recorded = Arc::default();
    let rec = Arc::clone(&recorded);
    let router = Router::new().route(
        "/api/ai/hints",
        get(move |Query(q): Query<HashMap<String, String>>, headers: HeaderMap| {
            let rec = Arc::clone(&rec);
            async move {
                rec.lock().unwrap().push((q, api_key(&headers)));
                Json(json!({
                    "hints": [{"id": "h1", "type": "CONFLICT", "priority": "LOW", "message": "m"}],
                    "nextUpdate": "2026-10-19T10:00:00Z"
                }))
            }
        }),
    );
    let api = client(&serve(router).await, Some("k1"));

    let payload = api.fetch_hints(true).await.unwrap();
    assert_eq!(payload.hints[0].id, "h1");

    let calls = recorded.lock().unwrap().clone();
    assert_eq!(calls[0].0.get("recompute").map(String::as_str), Some("1"));
    assert_eq!(calls[0].1.as_deref(), Some("k1"));
}

#[tokio::test]
async fn coordinator_falls_back_to_suggestions_on_server_error() {
    let router = Router::new()
        .route(
            "/api/ai/hints",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "engine down") }),
        )
        .route(
            "/api/suggestions",
            get(|| async {
                Json(json!({
                    "items": [{
                        "id": "sg-9",
                        "kind": "hold",
                        "title": "Hold T3",
                        "reason": "conflict at junction",
                        "score": 9,
                        "actions": [{"object": "train:T3", "action": "hold", "params": {}}]
                    }],
                    "generatedAt": "2026-10-19T09:30:00Z"
                }))
            }),
        );
    let api = client(&serve(router).await, None);
    let (events, mut rx) = event_channel(8);
    let poller = PollingCoordinator::new(api, Duration::from_millis(1000), events);

    poller.refresh(false);
    match next_event(&mut rx).await {
        SyncEvent::HintsUpdated(update) => {
            assert_eq!(update.origin, HintsOrigin::Fallback);
            let hint = &update.hints[0];
            assert_eq!(hint.message, "Hold T3");
            assert_eq!(hint.suggested_action["type"], "HOLD");
            assert_eq!(hint.timestamp.as_deref(), Some("2026-10-19T09:30:00Z"));
        }
        other => panic!("expected fallback hints, got {other:?}"),
    }
}

#[tokio::test]
async fn audit_backfill_clamps_limit_and_reads_string_ids() {
    let recorded: Recorded = Arc::default();
    let rec = Arc::clone(&recorded);
    let router = Router::new().route(
        "/api/audit/logs",
        get(move |Query(q): Query<HashMap<String, String>>| {
            let rec = Arc::clone(&rec);
            async move {
                rec.lock().unwrap().push((q, None));
                Json(json!({"items": [{"id": "8", "event": "ROUTE_SET"}, {"id": 9}]}))
            }
        }),
    );
    let api = client(&serve(router).await, None);

    let items = api.fetch_audit_since(7, 5000).await.unwrap();
    let ids: Vec<_> = items.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![Some(8), Some(9)]);

    let query = recorded.lock().unwrap()[0].0.clone();
    assert_eq!(query.get("sinceId").map(String::as_str), Some("7"));
    assert_eq!(query.get("limit").map(String::as_str), Some("1000"));
}

#[tokio::test]
async fn tailer_combines_backfill_and_sse_stream() {
    let accept_headers: Arc<Mutex<Vec<String>>> = Arc::default();
    let seen = Arc::clone(&accept_headers);
    let router = Router::new()
        .route(
            "/api/audit/logs",
            get(|| async { Json(json!({"items": [{"id": 2}, {"id": 1}]})) }),
        )
        .route(
            "/api/audit/stream",
            get(move |headers: HeaderMap| {
                let seen = Arc::clone(&seen);
                async move {
                    if let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) {
                        seen.lock().unwrap().push(accept.to_string());
                    }
                    let chunks = vec![
                        ":ok\n\n".to_string(),
                        "event: audit\ndata: {\"id\":2}\n\n".to_string(),
                        "event: audit\nda".to_string(),
                        "ta: {\"id\":\"3\",\"severity\":\"INFO\"}\n\n".to_string(),
                    ];
                    let body = stream::iter(chunks.into_iter().map(Ok::<_, Infallible>))
                        .chain(stream::pending());
                    (
                        [(header::CONTENT_TYPE, "text/event-stream")],
                        Body::from_stream(body),
                    )
                }
            }),
        );
    let api = client(&serve(router).await, None);
    let (events, mut rx) = event_channel(32);
    let tailer = AuditTailer::new(api, TailerConfig::default(), events);

    tailer.start(0, 500);
    let mut ids = Vec::new();
    let mut connected = false;
    while ids.len() < 3 {
        match next_event(&mut rx).await {
            SyncEvent::AuditBatch(items) => ids.extend(items.iter().filter_map(|i| i.id)),
            SyncEvent::AuditItem(item) => ids.extend(item.id),
            SyncEvent::AuditStream(StreamStatus::Connected) => connected = true,
            _ => {}
        }
    }
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(connected);
    assert_eq!(tailer.cursor(), 3);
    assert_eq!(
        accept_headers.lock().unwrap().as_slice(),
        ["text/event-stream".to_string()]
    );
    tailer.stop();
}

#[tokio::test]
async fn analytics_queries_and_series_parsing() {
    let router = Router::new()
        .route(
            "/api/analytics/kpis",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                Json(json!({
                    "timeRange": q.get("timeRange"),
                    "kpis": {"throughput": 41},
                    "trends": {"throughput": {"change": 2.5, "direction": "DOWN"}}
                }))
            }),
        )
        .route(
            "/api/analytics/historical",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("period").map(String::as_str), Some("weekly"));
                Json(json!({"metric": q.get("metric"), "data": [{"value": 1}, 2, {"v": 3.5}]}))
            }),
        );
    let api = client(&serve(router).await, None);

    let kpis = api.fetch_kpis(TimeRange::Week).await.unwrap();
    assert_eq!(kpis.time_range.as_deref(), Some("1w"));
    assert_eq!(kpis.value("throughput"), Some(41.0));
    assert_eq!(kpis.trends["throughput"].signed_delta(), Some(-2.5));

    let series = api.fetch_historical("rtp", Period::Weekly).await.unwrap();
    assert_eq!(series.metric, "rtp");
    assert_eq!(series.values, vec![1.0, 2.0, 3.5]);
}

#[tokio::test]
async fn signal_override_outcomes() {
    let bodies: Arc<Mutex<Vec<Value>>> = Arc::default();
    let rec = Arc::clone(&bodies);
    let router = Router::new().route(
        "/api/systems/signals/{id}/status",
        put(move |Path(id): Path<String>, Json(body): Json<Value>| {
            let rec = Arc::clone(&rec);
            async move {
                rec.lock().unwrap().push(body);
                match id.as_str() {
                    "S1" => (StatusCode::OK, Json(json!({"status": "OK"}))),
                    "S2" => (
                        StatusCode::OK,
                        Json(json!({"status": "KO", "message": "signal locked"})),
                    ),
                    _ => (StatusCode::NOT_FOUND, Json(json!({"error": "unknown signal"}))),
                }
            }
        }),
    );
    let api = client(&serve(router).await, None);
    let update = SignalStatusUpdate {
        new_status: SignalStatus::Green,
        reason: "clear the block".into(),
        user_id: "operator".into(),
    };

    api.set_signal_status("S1", &update).await.unwrap();
    assert_eq!(
        bodies.lock().unwrap()[0],
        json!({"newStatus": "GREEN", "reason": "clear the block", "userId": "operator"})
    );

    match api.set_signal_status("S2", &update).await {
        Err(SyncError::Rejected(message)) => assert_eq!(message, "signal locked"),
        other => panic!("expected rejection, got {other:?}"),
    }
    match api.set_signal_status("S404", &update).await {
        Err(SyncError::Status { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected 404, got {other:?}"),
    }
}

#[tokio::test]
async fn hint_response_posts_verdict_with_api_key() {
    let recorded: Arc<Mutex<Vec<(String, Value, Option<String>)>>> = Arc::default();
    let rec = Arc::clone(&recorded);
    let router = Router::new().route(
        "/api/ai/hints/{id}/respond",
        post(
            move |Path(id): Path<String>, headers: HeaderMap, Json(body): Json<Value>| {
                let rec = Arc::clone(&rec);
                async move {
                    rec.lock().unwrap().push((id, body, api_key(&headers)));
                    Json(json!({"status": "OK", "message": "recorded"}))
                }
            },
        ),
    );
    let api = client(&serve(router).await, Some("k2"));
    let body = HintResponse {
        response: HintVerdict::Dismiss,
        override_action: None,
        user_id: "operator".into(),
        dismiss_minutes: Some(30),
    };

    let reply = api.respond_to_hint("h7", &body).await.unwrap();
    assert_eq!(reply["message"], "recorded");

    let calls = recorded.lock().unwrap().clone();
    assert_eq!(calls[0].0, "h7");
    assert_eq!(
        calls[0].1,
        json!({"response": "DISMISS", "userId": "operator", "dismissMinutes": 30})
    );
    assert_eq!(calls[0].2.as_deref(), Some("k2"));
}
