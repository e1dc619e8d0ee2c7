//! Periodic resource reports for the monitored pod

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hubble_k8s::ResourceProbe;
use hubble_nexus::{DeliveryError, NexusClient};
use hubble_types::{ContainerEvent, ContainerEventName, ContainerSnapshot, EventType, PodInfo};

/// Polls a [`ResourceProbe`] on a fixed interval and reports to Nexus
pub struct ResourceReporter<P> {
    probe: P,
    nexus: NexusClient,
    source_name: String,
    server_ip: Option<String>,
    interval: Duration,
    cancel: CancellationToken,
}

impl<P: ResourceProbe> ResourceReporter<P> {
    pub fn new(
        probe: P,
        nexus: NexusClient,
        source_name: String,
        server_ip: Option<String>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            probe,
            nexus,
            source_name,
            server_ip,
            interval,
            cancel,
        }
    }

    /// Run until cancelled; an unreachable Nexus ends the loop with an error
    pub async fn run(self) -> Result<(), DeliveryError> {
        info!(source = %self.source_name, interval = ?self.interval, "starting resource reporter");
        let mut registered = false;

        while !self.cancel.is_cancelled() {
            match self.probe.snapshot().await {
                Ok(pod) => {
                    let name = if registered {
                        ContainerEventName::Update
                    } else {
                        ContainerEventName::Register
                    };

                    let event = self.event(name, pod);
                    match self.nexus.create_event(&event, &self.cancel).await {
                        Ok(outcome) if outcome.acknowledged => {
                            debug!(source = %self.source_name, ?name, "resources reported");
                            registered = true;
                        }
                        Ok(outcome) => {
                            debug!(
                                source = %self.source_name,
                                ?name,
                                status = outcome.status,
                                "resource report not recorded"
                            );
                        }
                        Err(err @ DeliveryError::Unreachable { .. }) => return Err(err),
                        Err(DeliveryError::Cancelled) => break,
                        Err(err) => warn!(error = %err, "failed to report resources"),
                    }
                }
                Err(err) => {
                    warn!(source = %self.source_name, error = %err, "failed to read pod resources");
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(source = %self.source_name, "resource reporter stopped");
        Ok(())
    }

    fn event(&self, name: ContainerEventName, pod: PodInfo) -> ContainerEvent {
        ContainerEvent {
            name,
            kind: EventType::Container,
            level: "INFO".to_string(),
            datetime: Utc::now().naive_utc(),
            source: self.source_name.clone(),
            data: ContainerSnapshot {
                server_ip: self.server_ip.clone(),
                pod,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hubble_k8s::{PodStatus, SourceError};
    use hubble_nexus::DeliveryPolicy;
    use mockito::{Matcher, Server};
    use serde_json::json;

    struct FixedProbe;

    #[async_trait]
    impl ResourceProbe for FixedProbe {
        async fn snapshot(&self) -> Result<PodInfo, SourceError> {
            let mut pod = PodInfo::new("subspace-node-0".to_string(), "subspace".to_string());
            pod.status = PodStatus::Running;
            Ok(pod)
        }
    }

    fn nexus(url: &str) -> NexusClient {
        let policy = DeliveryPolicy {
            max_attempts: 2,
            retry_delay: Duration::from_millis(10),
            rejection_delay: Duration::from_millis(10),
            request_timeout: Duration::from_secs(5),
        };
        NexusClient::new(url, policy).unwrap()
    }

    #[tokio::test]
    async fn test_registers_then_updates() {
        let mut server = Server::new_async().await;
        let register = server
            .mock("POST", "/insert/event")
            .match_body(Matcher::PartialJson(json!({
                "event_name": "Register Container",
                "event_type": "Container",
                "event_source": "node-0",
                "event_data": {
                    "server_ip": "192.168.1.20",
                    "name": "subspace-node-0",
                    "status": "Running"
                }
            })))
            .with_status(201)
            .expect(1)
            .create_async()
            .await;
        let update = server
            .mock("POST", "/insert/event")
            .match_body(Matcher::PartialJson(json!({ "event_name": "Update Container" })))
            .with_status(201)
            .expect_at_least(1)
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        let reporter = ResourceReporter::new(
            FixedProbe,
            nexus(&server.url()),
            "node-0".to_string(),
            Some("192.168.1.20".to_string()),
            Duration::from_millis(20),
            cancel.clone(),
        );

        let task = tokio::spawn(reporter.run());
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        register.assert_async().await;
        update.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_nexus_stops_reporter() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let reporter = ResourceReporter::new(
            FixedProbe,
            nexus(&format!("http://127.0.0.1:{}", port)),
            "node-0".to_string(),
            None,
            Duration::from_millis(20),
            CancellationToken::new(),
        );

        let err = reporter.run().await.unwrap_err();
        assert!(matches!(err, DeliveryError::Unreachable { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_rejected_report() {
        let mut server = Server::new_async().await;
        let report = server
            .mock("POST", "/insert/event")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let policy = DeliveryPolicy {
            max_attempts: 2,
            retry_delay: Duration::from_millis(10),
            rejection_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
        };

        let cancel = CancellationToken::new();
        let reporter = ResourceReporter::new(
            FixedProbe,
            NexusClient::new(&server.url(), policy).unwrap(),
            "node-0".to_string(),
            None,
            Duration::from_secs(60),
            cancel.clone(),
        );

        let task = tokio::spawn(reporter.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reporter did not stop")
            .unwrap()
            .unwrap();
        report.assert_async().await;
    }
}
