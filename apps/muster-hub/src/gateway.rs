//! WebSocket gateway for agents.
//!
//! An agent connects to `/agents/{client_id}`, introduces itself with a
//! `hello` frame carrying its device properties, and from then on pushes
//! upload events. Outbound command orders are written back as JSON frames.
//! Socket teardown maps to a disconnect event on the agent's link.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::timeout;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use agent_bus::{AgentEvent, LinkRemote, LocalLink, Upload};
use fleet_state::FleetManager;

const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct GatewayState {
    pub manager: Arc<FleetManager>,
}

pub fn router(manager: Arc<FleetManager>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agents/:client_id", get(agent_handler))
        .with_state(GatewayState { manager })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Frames an agent may send over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum AgentFrame {
    Hello {
        #[serde(default)]
        dynamic_data: Value,
    },
    Upload(Upload),
}

async fn agent_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<GatewayState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_agent(socket, client_id, state))
}

async fn handle_agent(socket: WebSocket, client_id: String, state: GatewayState) {
    let (mut sender, mut receiver) = socket.split();

    // The first frame must be the hello; close the socket otherwise.
    let dynamic_data = match timeout(HELLO_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<AgentFrame>(&text) {
            Ok(AgentFrame::Hello { dynamic_data }) => dynamic_data,
            Ok(_) => {
                warn!(client_id = %client_id, "agent sent events before hello");
                return;
            }
            Err(err) => {
                warn!(client_id = %client_id, %err, "malformed hello frame");
                return;
            }
        },
        _ => {
            warn!(client_id = %client_id, "agent did not introduce itself");
            return;
        }
    };

    let (link, remote) = LocalLink::pair();
    let LinkRemote {
        orders: mut order_rx,
        events: event_tx,
    } = remote;

    // Forward orders from the hub to the socket.
    let writer_id = client_id.clone();
    tokio::spawn(async move {
        while let Some(order) = order_rx.recv().await {
            let frame = match serde_json::to_string(&order) {
                Ok(frame) => frame,
                Err(err) => {
                    error!(client_id = %writer_id, %err, "unserializable order dropped");
                    continue;
                }
            };
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        debug!(client_id = %writer_id, "order writer stopped");
    });

    if let Err(err) = state.manager.connect(&client_id, link, dynamic_data).await {
        error!(client_id = %client_id, %err, "agent registration failed");
        return;
    }

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<AgentFrame>(&text) {
                Ok(AgentFrame::Upload(upload)) => {
                    let _ = event_tx.send(AgentEvent::Upload(upload));
                }
                Ok(AgentFrame::Hello { .. }) => {
                    debug!(client_id = %client_id, "duplicate hello ignored");
                }
                Err(err) => {
                    warn!(client_id = %client_id, %err, "unparseable agent frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(client_id = %client_id, %err, "agent socket error");
                break;
            }
        }
    }
    let _ = event_tx.send(AgentEvent::Disconnected);
}
