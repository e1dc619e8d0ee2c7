//! Stream supervisor: health check, resume, tail, classify, deliver, route

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hubble_k8s::{LogSource, PodStatus};
use hubble_logs::{EventClassifier, LogParser};
use hubble_nexus::{DeliveryError, NexusClient, ResumeCursor, resume_cursor};

/// Pacing for the supervisor's wait states
#[derive(Clone, Debug)]
pub struct StreamSettings {
    /// Wait between health checks while the entity is not running
    pub health_interval: Duration,

    /// Pause after a line carried a keyword but did not match its pattern
    pub mismatch_delay: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_secs(30),
            mismatch_delay: Duration::from_secs(5),
        }
    }
}

/// Supervisor states; a finished or failed tail always returns to `CheckHealth`
#[derive(Debug)]
enum State {
    CheckHealth,
    ComputeResume,
    Tail(ResumeCursor),
}

/// Drives one log source through the tail/classify/deliver cycle
pub struct StreamSupervisor<S> {
    source: S,
    nexus: NexusClient,
    classifier: EventClassifier,
    source_name: String,
    settings: StreamSettings,
    cancel: CancellationToken,
}

impl<S: LogSource> StreamSupervisor<S> {
    pub fn new(
        source: S,
        nexus: NexusClient,
        source_name: String,
        settings: StreamSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            nexus,
            classifier: EventClassifier::new(),
            source_name,
            settings,
            cancel,
        }
    }

    /// Run until cancelled
    ///
    /// Only an unreachable Nexus ends the loop with an error; every other
    /// failure is logged and the cycle restarts.
    pub async fn run(self) -> Result<(), DeliveryError> {
        info!(source = %self.source_name, "starting log stream monitor");
        let mut state = State::CheckHealth;

        while !self.cancel.is_cancelled() {
            state = match state {
                State::CheckHealth => self.check_health().await,
                State::ComputeResume => {
                    State::Tail(resume_cursor(&self.nexus, &self.source_name).await)
                }
                State::Tail(cursor) => {
                    self.tail(cursor).await?;
                    State::CheckHealth
                }
            };
        }

        info!(source = %self.source_name, "log stream monitor stopped");
        Ok(())
    }

    async fn check_health(&self) -> State {
        match self.source.status().await {
            Ok(PodStatus::Running) => return State::ComputeResume,
            Ok(status) => {
                warn!(source = %self.source_name, ?status, "node must be running to tail its logs");
            }
            Err(err) => {
                warn!(source = %self.source_name, error = %err, "failed to check node status");
            }
        }

        self.wait(self.settings.health_interval).await;
        State::CheckHealth
    }

    /// Sleep for `duration` or until cancelled
    async fn wait(&self, duration: Duration) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }

    /// Follow the log from `cursor` until the stream ends, fails, or we are cancelled
    async fn tail(&self, cursor: ResumeCursor) -> Result<(), DeliveryError> {
        info!(source = %self.source_name, since = %cursor, "getting logs");

        let mut lines = match self.source.stream_lines(cursor.since()).await {
            Ok(lines) => lines,
            Err(err) => {
                error!(source = %self.source_name, error = %err, "failed to open log stream");
                return Ok(());
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                next = lines.next() => next,
            };

            match next {
                Some(Ok(line)) => self.handle_line(&line).await?,
                Some(Err(err)) => {
                    error!(source = %self.source_name, error = %err, "log stream failed");
                    return Ok(());
                }
                None => {
                    info!(source = %self.source_name, "log stream ended");
                    return Ok(());
                }
            }
        }
    }

    /// Tokenize, classify, deliver and route a single line
    async fn handle_line(&self, line: &str) -> Result<(), DeliveryError> {
        let Some(record) = LogParser::parse(line) else {
            warn!(line, "unable to parse log line");
            return Ok(());
        };

        let event = match self.classifier.classify(&record, &self.source_name) {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(()),
            Err(err) => {
                error!(error = %err, "failed to classify log line");
                self.wait(self.settings.mismatch_delay).await;
                return Ok(());
            }
        };

        match self.nexus.create_event(&event, &self.cancel).await {
            Ok(outcome) if outcome.acknowledged => self.nexus.route(&event).await,
            Ok(outcome) => {
                debug!(event = %event.name, status = outcome.status, "event not recorded, skipping routing");
            }
            Err(err @ DeliveryError::Unreachable { .. }) => return Err(err),
            Err(DeliveryError::Cancelled) => {
                debug!(event = %event.name, "delivery cancelled");
            }
            Err(err) => error!(event = %event.name, error = %err, "failed to deliver event"),
        }

        Ok(())
    }
}
