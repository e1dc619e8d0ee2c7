use thiserror::Error;

/// Errors talking to the Nexus ingestion service
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid Nexus URL {0}")]
    InvalidUrl(String),

    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("failed to serialize event")]
    Serialize(#[source] serde_json::Error),

    /// Every transport attempt failed; the caller should treat this as fatal
    #[error("Nexus unreachable after {attempts} attempts")]
    Unreachable {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Shutdown was requested before the event was delivered
    #[error("delivery cancelled")]
    Cancelled,

    #[error("Nexus request failed")]
    Request(#[source] reqwest::Error),

    #[error("Nexus answered with status {0}")]
    Status(u16),
}
