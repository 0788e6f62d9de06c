//! Duplex channel seam between the hub and one connected agent.
//!
//! The hub never talks to a transport directly; it holds an [`AgentLink`] per
//! connected agent and pushes [`Order`]s through it, while the transport
//! adapter feeds [`AgentEvent`]s back through the link's event stream. The
//! stream ending is equivalent to an explicit [`AgentEvent::Disconnected`].

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Command envelope pushed to a connected agent.
///
/// Serializes as the command payload with a `type` discriminator merged in,
/// so `{"type":"lock","until":123}` is one flat object on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

/// Inbound media upload pushed by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Upload {
    pub name: String,
    /// Base64-encoded file contents.
    pub inline_bytes: String,
    pub has_image: bool,
}

/// Events an agent link can surface to the hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    Upload(Upload),
    Disconnected,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("agent channel closed")]
    Closed,
    #[error("agent transport error: {0}")]
    Transport(String),
}

pub type LinkResult<T> = Result<T, LinkError>;

/// Live endpoint usable to push commands to a connected agent.
pub trait AgentLink: Send + Sync {
    /// Push an order to the agent. Fails if the transport is gone.
    fn deliver(&self, order: Order) -> LinkResult<()>;

    /// Take the inbound event stream. Yields `None` on every call after the
    /// first; the hub owns the stream for the lifetime of the connection.
    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AgentEvent>>;
}

/// In-memory link backed by unbounded channels, for tests and for transport
/// adapters that pump a socket on the far side.
pub struct LocalLink {
    orders: mpsc::UnboundedSender<Order>,
    events: Mutex<Option<mpsc::UnboundedReceiver<AgentEvent>>>,
}

/// Far side of a [`LocalLink`]: observes delivered orders, injects events.
pub struct LinkRemote {
    pub orders: mpsc::UnboundedReceiver<Order>,
    pub events: mpsc::UnboundedSender<AgentEvent>,
}

impl LocalLink {
    pub fn pair() -> (Arc<LocalLink>, LinkRemote) {
        let (order_tx, order_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let link = Arc::new(LocalLink {
            orders: order_tx,
            events: Mutex::new(Some(event_rx)),
        });
        let remote = LinkRemote {
            orders: order_rx,
            events: event_tx,
        };
        (link, remote)
    }
}

impl AgentLink for LocalLink {
    fn deliver(&self, order: Order) -> LinkResult<()> {
        self.orders.send(order).map_err(|_| LinkError::Closed)
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<AgentEvent>> {
        self.events.lock().take()
    }
}
