//! Hub daemon wiring: configuration, Redis-backed stores, filesystem blob
//! storage, and the WebSocket agent gateway. The coordination logic itself
//! lives in the `fleet-state` crate.

pub mod blob;
pub mod cli;
pub mod config;
pub mod gateway;
pub mod storage;
