use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use hubble_types::{ClassifiedEvent, DeliveryOutcome};

use crate::error::DeliveryError;

/// Retry and pacing rules for event delivery
#[derive(Clone, Debug)]
pub struct DeliveryPolicy {
    /// Transport attempts per event before giving up for good
    pub max_attempts: u32,

    /// Pause between transport attempts
    pub retry_delay: Duration,

    /// Pause after Nexus answered with anything but `201 Created`
    pub rejection_delay: Duration,

    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay: Duration::from_secs(5),
            rejection_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// An event as returned by the latest-events query
#[derive(Clone, Debug, Deserialize)]
pub struct StoredEvent {
    pub event_datetime: String,
}

/// Nexus answers either with a bare list or with `{"data": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum EventsResponse {
    List(Vec<StoredEvent>),
    Envelope { data: Vec<StoredEvent> },
}

impl EventsResponse {
    fn into_events(self) -> Vec<StoredEvent> {
        match self {
            Self::List(events) | Self::Envelope { data: events } => events,
        }
    }
}

/// HTTP client for the Nexus ingestion service
#[derive(Clone, Debug)]
pub struct NexusClient {
    base_url: String,
    http: reqwest::Client,
    policy: DeliveryPolicy,
}

impl NexusClient {
    /// Create a client for the service at `base_url`
    pub fn new(base_url: &str, policy: DeliveryPolicy) -> Result<Self, DeliveryError> {
        reqwest::Url::parse(base_url)
            .map_err(|e| DeliveryError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let http = reqwest::Client::builder()
            .timeout(policy.request_timeout)
            .build()
            .map_err(DeliveryError::Client)?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            policy,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Push an event to `/insert/event`
    ///
    /// Transport failures are retried up to `max_attempts` times; running out
    /// of attempts is returned as [`DeliveryError::Unreachable`]. A completed
    /// round-trip with any status but `201 Created` is an unacknowledged
    /// outcome, not an error, and does not consume the retry budget.
    ///
    /// Cancelling `cancel` interrupts the request and every pause between
    /// attempts with [`DeliveryError::Cancelled`]. A rejection pause that is
    /// cut short still returns the unacknowledged outcome.
    pub async fn create_event<T>(
        &self,
        event: &T,
        cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, DeliveryError>
    where
        T: Serialize + ?Sized,
    {
        let url = self.endpoint("insert/event");
        let payload = serde_json::to_vec(event).map_err(DeliveryError::Serialize)?;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let request = self
                .http
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .body(payload.clone())
                .send();

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
                result = request => result,
            };

            match result {
                Ok(response) => {
                    let status = response.status();
                    let raw_response = response.text().await.unwrap_or_default();

                    if status == StatusCode::CREATED {
                        debug!(attempt, "event acknowledged by Nexus");
                        return Ok(DeliveryOutcome {
                            acknowledged: true,
                            status: status.as_u16(),
                            raw_response,
                        });
                    }

                    warn!(status = status.as_u16(), body = %raw_response, "Nexus rejected event");
                    pause(self.policy.rejection_delay, cancel).await;
                    return Ok(DeliveryOutcome {
                        acknowledged: false,
                        status: status.as_u16(),
                        raw_response,
                    });
                }
                Err(err) if attempt >= max_attempts => {
                    error!(attempts = attempt, error = %err, "Nexus unreachable, giving up");
                    return Err(DeliveryError::Unreachable {
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => {
                    warn!(attempt, max_attempts, error = %err, "failed to reach Nexus, retrying");
                    if !pause(self.policy.retry_delay, cancel).await {
                        return Err(DeliveryError::Cancelled);
                    }
                }
            }
        }
    }

    /// Events recorded for `source`, most recent first
    pub async fn latest_events(&self, source: &str) -> Result<Vec<StoredEvent>, DeliveryError> {
        let response = self
            .http
            .get(self.endpoint("get/events"))
            .query(&[("event_source", source)])
            .send()
            .await
            .map_err(DeliveryError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }

        let body: EventsResponse = response.json().await.map_err(DeliveryError::Request)?;
        Ok(body.into_events())
    }

    /// Forward an acknowledged event to its side channel
    pub async fn route(&self, event: &ClassifiedEvent) {
        if event.name.is_consensus() {
            self.insert_consensus(event).await;
        } else {
            self.insert_claim(event).await;
        }
    }

    pub async fn insert_consensus(&self, event: &ClassifiedEvent) {
        self.fire_and_forget("insert/consensus", event).await;
    }

    pub async fn insert_claim(&self, event: &ClassifiedEvent) {
        self.fire_and_forget("insert/claim", event).await;
    }

    async fn fire_and_forget(&self, path: &str, event: &ClassifiedEvent) {
        match self.http.post(self.endpoint(path)).json(event).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(path, event = %event.name, "event routed");
            }
            Ok(response) => {
                warn!(path, status = response.status().as_u16(), "side channel rejected event");
            }
            Err(err) => {
                warn!(path, error = %err, "failed to route event");
            }
        }
    }
}

/// Sleep for `duration`; false if cancelled first
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
