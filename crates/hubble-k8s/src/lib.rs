//! Kubernetes client for hubble
//!
//! This crate provides the log source the stream supervisor tails and the
//! resource probe the reporter polls, both backed by a single pod.

mod client;
mod source;

pub use client::KubeClient;
pub use source::{LineStream, LogSource, PodLogSource, ResourceProbe, SourceError};

// Re-export types that are used in our public API
pub use hubble_types::{ContainerInfo, PodInfo, PodStatus};
