//! Log processing for hubble
//!
//! This crate turns raw node output into typed telemetry: [`LogParser`]
//! tokenizes a line and [`EventClassifier`] maps the message to an event.

mod classifier;
mod parser;

pub use classifier::{ClassifyError, EventClassifier};
pub use parser::LogParser;

// Re-export types used in our public API
pub use hubble_types::{ClassifiedEvent, EventName, ParsedLogRecord};
