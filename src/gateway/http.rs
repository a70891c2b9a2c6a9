//! HTTP and WebSocket transport.
//!
//! `/ws` upgrades to a WebSocket whose text frames carry [super::ClientMessage]
//! JSON. Each socket gets a writer task draining its outbox; the read half
//! forwards frames to the hub as [HubEvent::Inbound]. The remaining routes are
//! read-only JSON for operators.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use serde_json::json;
use tokio::sync::mpsc;

use super::hub::HubEvent;
use super::protocol::ServerMessage;
use crate::catalog::CampaignCatalog;
use crate::lobby::{ConnectionId, LobbyRegistry};
use crate::metrics;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<LobbyRegistry>,
    pub catalog: Arc<CampaignCatalog>,
    pub events: mpsc::UnboundedSender<HubEvent>,
    next_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        registry: Arc<LobbyRegistry>,
        catalog: Arc<CampaignCatalog>,
        events: mpsc::UnboundedSender<HubEvent>,
    ) -> Self {
        AppState { registry, catalog, events, next_id: Arc::new(AtomicU64::new(1)) }
    }

    fn allocate_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/lobbies", get(lobbies))
        .route("/campaigns", get(campaigns))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "lobbies": state.registry.len(),
        "metrics": metrics::snapshot(),
    }))
}

async fn lobbies(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "lobbies": state.registry.names() }))
}

async fn campaigns(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "campaigns": state.catalog.list() }))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let id = state.allocate_id();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    if state.events.send(HubEvent::Connected { id, tx }).is_err() {
        warn!("Hub is gone; refusing {}", id);
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    warn!("Could not encode {}: {}", msg.kind(), e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                debug!("{} read error: {}", id, e);
                break;
            }
        };
        match frame {
            Message::Text(text) => {
                if state.events.send(HubEvent::Inbound { id, text }).is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    let _ = state.events.send(HubEvent::Disconnected { id });
    // The hub drops the outbox on disconnect, which ends the writer.
    if let Err(e) = writer.await {
        debug!("{} writer ended abnormally: {}", id, e);
    }
}
