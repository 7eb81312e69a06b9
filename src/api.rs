//! HTTP surface. A thin axum binding over the `Station` facade: JSON
//! endpoints, a server-sent event stream, and a WebSocket with revision
//! replay. Every decision lives in the facade; handlers translate.

use crate::error::StationError;
use crate::state::StateEvent;
use crate::station::Station;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;

/// SSE heartbeat interval.
const HEARTBEAT: Duration = Duration::from_secs(15);
/// Minimum spacing for `state.*` events at the subscriber boundary.
const UPDATE_GATE: Duration = Duration::from_millis(500);

pub fn build_router(station: Arc<Station>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .route("/dashboard/snapshot", get(dashboard_snapshot))
        .route("/dashboard/queue", get(dashboard_queue))
        .route("/dashboard/queue/commentary", post(queue_commentary))
        .route("/dashboard/queue/track", post(queue_track))
        .route("/dashboard/queue/{id}", delete(queue_delete).patch(queue_patch))
        .route("/dashboard/media/{id}", get(media_by_segment))
        .route("/dashboard/media-by-path", get(media_by_path))
        .route("/dashboard/events", get(events_sse))
        .route("/dashboard/transport/skip", post(transport_skip))
        .route("/timeline/snapshot", get(timeline_snapshot))
        .route("/timeline/rebuild", post(timeline_rebuild))
        .route("/control/start", post(control_start))
        .route("/control/stop", post(control_stop))
        .route("/ws", get(ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(station)
}

// ── Error translation ───────────────────────────────────────────────────────

fn fail(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(serde_json::json!({ "ok": false, "error": message })),
    )
        .into_response()
}

fn station_error(e: StationError) -> Response {
    let status = match &e {
        StationError::QueueMiss(_) => StatusCode::NOT_FOUND,
        StationError::PathNotAllowed(_) => StatusCode::FORBIDDEN,
        StationError::CatalogInvalid(_) => StatusCode::BAD_REQUEST,
        StationError::Tts(msg) if msg.contains("empty commentary") => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    fail(status, e.to_string())
}

fn ok() -> Response {
    Json(serde_json::json!({ "ok": true })).into_response()
}

// ── Read endpoints ──────────────────────────────────────────────────────────

async fn healthz() -> Response {
    Json(serde_json::json!({ "ok": true, "service": "airwave" })).into_response()
}

async fn status(State(station): State<Arc<Station>>) -> Response {
    Json(station.status()).into_response()
}

async fn dashboard_snapshot(State(station): State<Arc<Station>>) -> Response {
    Json(station.snapshot()).into_response()
}

async fn dashboard_queue(State(station): State<Arc<Station>>) -> Response {
    Json(station.queue_views()).into_response()
}

async fn timeline_snapshot(State(station): State<Arc<Station>>) -> Response {
    Json(station.timeline_snapshot()).into_response()
}

async fn timeline_rebuild(State(station): State<Arc<Station>>) -> Response {
    match station.rebuild_timeline() {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => station_error(e),
    }
}

// ── Media endpoints ─────────────────────────────────────────────────────────

async fn media_by_segment(
    State(station): State<Arc<Station>>,
    UrlPath(id): UrlPath<String>,
) -> Response {
    let Some(path) = station.media_path(&id) else {
        return fail(StatusCode::NOT_FOUND, format!("no segment '{}'", id));
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "audio/wav")], bytes).into_response(),
        Err(_) => fail(
            StatusCode::NOT_FOUND,
            format!("segment file missing: {}", path.display()),
        ),
    }
}

#[derive(Deserialize)]
struct MediaByPathParams {
    path: String,
}

async fn media_by_path(
    State(station): State<Arc<Station>>,
    Query(params): Query<MediaByPathParams>,
) -> Response {
    let path = match station.checked_media_path(&params.path) {
        Ok(path) => path,
        Err(e) => return station_error(e),
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "audio/wav")], bytes).into_response(),
        Err(_) => fail(StatusCode::NOT_FOUND, "unreadable file".to_string()),
    }
}

// ── Queue mutation ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CommentaryBody {
    text: String,
}

async fn queue_commentary(
    State(station): State<Arc<Station>>,
    Json(body): Json<CommentaryBody>,
) -> Response {
    let result =
        tokio::task::spawn_blocking(move || station.enqueue_manual_commentary(&body.text)).await;
    match result {
        Ok(Ok(segment)) => Json(serde_json::json!({ "ok": true, "segment": segment })).into_response(),
        Ok(Err(e)) => station_error(e),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
struct TrackBody {
    title: String,
    artist: Option<String>,
    youtube_url: String,
}

async fn queue_track(State(station): State<Arc<Station>>, Json(body): Json<TrackBody>) -> Response {
    let result = tokio::task::spawn_blocking(move || {
        station.enqueue_manual_track(&body.title, body.artist.as_deref(), &body.youtube_url)
    })
    .await;
    match result {
        Ok(Ok(segment)) => Json(serde_json::json!({ "ok": true, "segment": segment })).into_response(),
        Ok(Err(e)) => station_error(e),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn queue_delete(
    State(station): State<Arc<Station>>,
    UrlPath(id): UrlPath<String>,
) -> Response {
    match station.remove_from_queue(&id) {
        Ok(()) => ok(),
        Err(e) => station_error(e),
    }
}

#[derive(Deserialize)]
struct QueuePatchBody {
    priority: Option<i64>,
    pinned: Option<bool>,
}

async fn queue_patch(
    State(station): State<Arc<Station>>,
    UrlPath(id): UrlPath<String>,
    Json(body): Json<QueuePatchBody>,
) -> Response {
    match station.update_queue_item(&id, body.priority, body.pinned) {
        Ok(()) => ok(),
        Err(e) => station_error(e),
    }
}

// ── Transport & lifecycle ───────────────────────────────────────────────────

async fn transport_skip(State(station): State<Arc<Station>>) -> Response {
    let outcome = station.skip();
    Json(serde_json::json!({ "ok": true, "result": outcome })).into_response()
}

async fn control_start(State(station): State<Arc<Station>>) -> Response {
    let result = tokio::task::spawn_blocking(move || station.start()).await;
    match result {
        Ok(Ok(())) => ok(),
        Ok(Err(e)) => station_error(e),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn control_stop(State(station): State<Arc<Station>>) -> Response {
    let result = tokio::task::spawn_blocking(move || station.stop()).await;
    match result {
        Ok(()) => ok(),
        Err(e) => fail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ── Event streams ───────────────────────────────────────────────────────────

/// Drops `state.*` chatter that arrives faster than the gate. Discrete
/// events (segments, queue, errors) always pass.
struct UpdateGate {
    last_update: Option<Instant>,
}

impl UpdateGate {
    fn new() -> Self {
        UpdateGate { last_update: None }
    }

    fn admit(&mut self, event: &StateEvent) -> bool {
        if !event.event.starts_with("state.") {
            return true;
        }
        let now = Instant::now();
        if self
            .last_update
            .is_some_and(|last| now.duration_since(last) < UPDATE_GATE)
        {
            return false;
        }
        self.last_update = Some(now);
        true
    }
}

async fn events_sse(State(station): State<Arc<Station>>) -> Response {
    let snapshot = station.snapshot();
    let first = SseEvent::default()
        .event("snapshot")
        .data(serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".into()));

    let rx = station.subscribe();
    let mut gate = UpdateGate::new();
    let live = BroadcastStream::new(rx).filter_map(move |item| {
        let event = match item {
            Ok(event) if gate.admit(&event) => Some(event),
            _ => None,
        };
        futures::future::ready(event.map(|event| {
            Ok::<_, std::convert::Infallible>(
                SseEvent::default()
                    .event(event.event.clone())
                    .data(serde_json::to_string(&event).unwrap_or_else(|_| "{}".into())),
            )
        }))
    });

    let stream = futures::stream::once(async move {
        Ok::<_, std::convert::Infallible>(first)
    })
    .chain(live);

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(HEARTBEAT).text("hb"))
        .into_response()
}

#[derive(Deserialize)]
struct WsParams {
    #[serde(rename = "lastRevision")]
    last_revision: Option<u64>,
}

async fn ws_upgrade(
    State(station): State<Arc<Station>>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| ws_session(socket, station, params.last_revision))
}

/// On connect: replay what the client missed when the ring still has it,
/// otherwise a fresh snapshot. Then stream events through the update gate.
async fn ws_session(mut socket: WebSocket, station: Arc<Station>, last_revision: Option<u64>) {
    // Subscribe before replay so nothing falls between the two.
    let mut rx = station.subscribe();

    let mut sent_revision = last_revision.unwrap_or(0);
    let replay = last_revision.and_then(|rev| station.events_since(rev));
    match replay {
        Some(missed) => {
            for event in missed {
                if send_event_envelope(&mut socket, &event).await.is_err() {
                    return;
                }
                sent_revision = event.revision;
            }
        }
        None => {
            let snapshot = station.snapshot();
            sent_revision = snapshot.revision;
            let envelope = serde_json::json!({
                "type": "snapshot",
                "revision": snapshot.revision,
                "snapshot": snapshot,
            });
            if send_json(&mut socket, &envelope).await.is_err() {
                return;
            }
        }
    }

    let mut gate = UpdateGate::new();
    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Ok(event) => {
                        if event.revision <= sent_revision || !gate.admit(&event) {
                            continue;
                        }
                        sent_revision = event.revision;
                        if send_event_envelope(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
}

async fn send_event_envelope(
    socket: &mut WebSocket,
    event: &StateEvent,
) -> Result<(), axum::Error> {
    let envelope = serde_json::json!({
        "type": "event",
        "revision": event.revision,
        "ts": event.ts,
        "event": event.event,
        "payload": event.payload,
    });
    send_json(socket, &envelope).await
}

async fn send_json(socket: &mut WebSocket, value: &serde_json::Value) -> Result<(), axum::Error> {
    let text = serde_json::to_string(value).unwrap_or_else(|_| "{}".into());
    socket.send(Message::Text(text.into())).await
}
