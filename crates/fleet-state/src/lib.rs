//! Coordination core for a fleet of long-lived remote agents.
//!
//! [`manager::FleetManager`] owns the connection registry, the offline
//! command queue with reconnect replay, per-client location polling, media
//! upload ingestion, and the read-side page facade. Persistence and transport
//! are seams: [`store`] defines the store traits (with in-memory
//! implementations), and the per-agent channel comes from the `agent-bus`
//! crate.

pub mod error;
pub mod manager;
mod poller;
pub mod query;
pub mod store;
pub mod types;

pub use error::{FleetError, StoreError};
pub use manager::{FleetConfig, FleetManager};
pub use query::{Page, PageView};
pub use types::DispatchOutcome;
