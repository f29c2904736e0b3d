//! `AskStack` Server — question API, search projection, and gateway services.
//!
//! One crate, three binaries:
//!
//! - `askstack-questions`: CRUD over the system of record plus the outbox
//!   relay that publishes domain events to the broker.
//! - `askstack-search`: subscribes to domain events and projects them into
//!   an embedded full-text index, served over `GET /search`.
//! - `askstack-gateway`: path-prefix router in front of the two services.
//!
//! The storage and broker seams are traits with in-process defaults; the
//! `postgres` and `redis-bus` features swap in the external backends.

pub mod auth;
pub mod bus;
pub mod config;
pub mod error;
pub mod gateway;
pub mod network;
pub mod questions;
pub mod relay;
pub mod search;
pub mod storage;
pub mod worker;

pub use error::ApiError;
