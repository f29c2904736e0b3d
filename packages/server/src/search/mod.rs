//! Search service: event subscription, projection, and the query endpoint.
//!
//! The index is embedded tantivy, a pre-built full-text engine used as a
//! library. [`index::SearchIndex`] wraps it with upsert/remove/fetch keyed
//! by question id; [`projection::Projector`] applies domain events through
//! the pure merge in `askstack-core`; [`subscriber`] pumps events from the
//! bus into the projector; [`handlers`] serves `GET /search`.

pub mod handlers;
pub mod index;
pub mod projection;
pub mod subscriber;

pub use handlers::{router, SearchState};
pub use index::SearchIndex;
pub use projection::Projector;
