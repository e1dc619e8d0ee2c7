use std::pin::pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::{AsyncBufReadExt, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::LogParams;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use hubble_types::{ContainerInfo, PodInfo, PodStatus};

/// Lines buffered between the pod log reader and the consumer
const LINE_BUFFER: usize = 256;

/// A live, follow-mode sequence of raw log lines
pub type LineStream = BoxStream<'static, Result<String, SourceError>>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Kubernetes API request failed")]
    Kube(#[from] kube::Error),

    #[error("failed to read log stream")]
    Io(#[from] std::io::Error),

    #[error("log reader stopped before the stream opened")]
    Closed,
}

/// Something whose output can be tailed from a point in time
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Current lifecycle phase of the monitored entity
    async fn status(&self) -> Result<PodStatus, SourceError>;

    /// Follow the log from `since` (`None` = from the beginning)
    async fn stream_lines(&self, since: Option<DateTime<Utc>>) -> Result<LineStream, SourceError>;
}

/// Something whose resources can be polled for reporting
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    async fn snapshot(&self) -> Result<PodInfo, SourceError>;
}

/// Log source and resource probe for a single pod
#[derive(Clone)]
pub struct PodLogSource {
    api: Api<Pod>,
    namespace: String,
    pod_name: String,
    container: Option<String>,
}

impl PodLogSource {
    pub fn new(
        api: Api<Pod>,
        namespace: String,
        pod_name: String,
        container: Option<String>,
    ) -> Self {
        Self {
            api,
            namespace,
            pod_name,
            container,
        }
    }
}

#[async_trait]
impl LogSource for PodLogSource {
    async fn status(&self) -> Result<PodStatus, SourceError> {
        let pod = self.api.get(&self.pod_name).await?;
        Ok(pod
            .status
            .and_then(|s| s.phase)
            .as_deref()
            .map(PodStatus::from)
            .unwrap_or(PodStatus::Unknown))
    }

    async fn stream_lines(&self, since: Option<DateTime<Utc>>) -> Result<LineStream, SourceError> {
        let params = LogParams {
            follow: true,
            container: self.container.clone(),
            since_time: since,
            // the node prints its own timestamps
            timestamps: false,
            ..Default::default()
        };

        let api = self.api.clone();
        let pod_name = self.pod_name.clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);

        tokio::spawn(async move {
            let reader = match api.log_stream(&pod_name, &params).await {
                Ok(reader) => {
                    let _ = ready_tx.send(Ok(()));
                    reader
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };

            let mut lines = pin!(reader.lines());

            loop {
                tokio::select! {
                    // Consumer dropped the stream
                    _ = line_tx.closed() => break,

                    result = lines.try_next() => {
                        match result {
                            Ok(Some(line)) => {
                                if line_tx.send(Ok(line)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(None) => break,
                            Err(err) => {
                                let _ = line_tx.send(Err(SourceError::Io(err))).await;
                                break;
                            }
                        }
                    }
                }
            }

            debug!(pod = %pod_name, "log reader finished");
        });

        ready_rx.await.map_err(|_| SourceError::Closed)??;

        Ok(futures::stream::unfold(line_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

#[async_trait]
impl ResourceProbe for PodLogSource {
    async fn snapshot(&self) -> Result<PodInfo, SourceError> {
        let pod = self.api.get(&self.pod_name).await?;
        Ok(pod_to_info(pod, &self.namespace))
    }
}

/// Convert a k8s Pod to PodInfo
fn pod_to_info(pod: Pod, namespace: &str) -> PodInfo {
    let name = pod.metadata.name.unwrap_or_default();
    let mut info = PodInfo::new(name, namespace.to_string());

    if let Some(spec) = &pod.spec {
        info.node_name = spec.node_name.clone();
    }

    if let Some(status) = pod.status {
        info.pod_ip = status.pod_ip;
        info.host_ip = status.host_ip;
        info.started_at = status.start_time.map(|t| t.0.naive_utc());
        info.status = status
            .phase
            .as_deref()
            .map(PodStatus::from)
            .unwrap_or(PodStatus::Unknown);

        if let Some(container_statuses) = status.container_statuses {
            info.containers = container_statuses
                .into_iter()
                .map(|cs| {
                    let mut container = ContainerInfo::new(cs.name);
                    container.image = Some(cs.image);
                    container.ready = cs.ready;
                    container.restart_count = cs.restart_count;
                    container
                })
                .collect();
        }
    }

    info
}
