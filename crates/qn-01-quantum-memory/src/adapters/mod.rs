//! Adapters Layer
//!
//! - `InMemoryTimeline`: ordered event store for tests and embedding

pub mod timeline;

pub use timeline::InMemoryTimeline;
