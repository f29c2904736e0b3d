//! `AskStack` Core — domain model, domain events, and the search document schema.
//!
//! This crate is deliberately dependency-light: it defines the shapes shared
//! between the question service, the outbox relay, and the search service,
//! plus the pure projection function that maps domain events onto search
//! documents. All wire types serialize with camelCase field names.

pub mod document;
pub mod events;
pub mod types;

pub use document::{project, Projection, SearchDocument};
pub use events::{topics, DomainEvent};
pub use types::{Answer, Question, Tag};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
