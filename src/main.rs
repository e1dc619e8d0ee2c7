mod config;
mod reporter;
mod supervisor;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use hubble_k8s::KubeClient;
use hubble_nexus::{DeliveryError, NexusClient};

use crate::config::{Args, Config};
use crate::reporter::ResourceReporter;
use crate::supervisor::StreamSupervisor;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(args)?;
    info!(
        nexus = %config.nexus_url,
        namespace = %config.namespace,
        pod = %config.pod,
        source = %config.source,
        "got config"
    );

    let kube = KubeClient::new(config.context.as_deref()).await?;
    info!(context = kube.context().unwrap_or("default"), "connected to Kubernetes");
    let pod = kube.pod(&config.namespace, &config.pod, config.container.clone());
    let nexus = NexusClient::new(&config.nexus_url, config.delivery.clone())?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("SIGINT received, shutting down");
                cancel.cancel();
            }
        });
    }

    let supervisor = StreamSupervisor::new(
        pod.clone(),
        nexus.clone(),
        config.source.clone(),
        config.stream.clone(),
        cancel.clone(),
    );
    let reporter = ResourceReporter::new(
        pod,
        nexus,
        config.source.clone(),
        config.server_ip.clone(),
        config.report_interval,
        cancel.clone(),
    );

    let stream_task = tokio::spawn(cancel_on_error(supervisor.run(), cancel.clone()));
    let report_task = tokio::spawn(cancel_on_error(reporter.run(), cancel.clone()));
    let (stream, report) = tokio::join!(stream_task, report_task);

    stream
        .context("log stream monitor panicked")?
        .context("log stream monitor failed")?;
    report
        .context("resource reporter panicked")?
        .context("resource reporter failed")?;

    Ok(())
}

/// Stop the peer loop as soon as one loop hits a fatal error
async fn cancel_on_error<F>(task: F, cancel: CancellationToken) -> Result<(), DeliveryError>
where
    F: Future<Output = Result<(), DeliveryError>>,
{
    let result = task.await;
    if result.is_err() {
        cancel.cancel();
    }
    result
}
