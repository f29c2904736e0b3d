//! Question service: HTTP surface over the system of record.
//!
//! Handlers validate the caller's identity and ownership, perform exactly
//! one store mutation (which records the domain event in the outbox), and
//! nudge the relay. They never talk to the broker.

pub mod handlers;

pub use handlers::{router, AppState};
