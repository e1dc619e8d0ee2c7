//! Nexus delivery for hubble
//!
//! This crate pushes classified events to the Nexus ingestion service,
//! forwards acknowledged events to their side channels, and derives the
//! resume cursor from the last event Nexus recorded for a source.

mod client;
mod error;
mod resume;

pub use client::{DeliveryPolicy, NexusClient, StoredEvent};
pub use error::DeliveryError;
pub use resume::resume_cursor;

// Re-export types used in our public API
pub use hubble_types::{DeliveryOutcome, ResumeCursor};
