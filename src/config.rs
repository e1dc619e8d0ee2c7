//! Command line and config file handling

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use hubble_nexus::DeliveryPolicy;

use crate::supervisor::StreamSettings;

/// Hubble - ships a blockchain node's telemetry from its logs to Nexus
#[derive(Parser, Debug, Default)]
#[command(name = "hubble")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Nexus base URL (e.g. http://nexus:8000)
    #[arg(short, long)]
    pub nexus: Option<String>,

    /// Address of the host the node runs on, included in resource reports
    #[arg(short, long)]
    pub server: Option<String>,

    /// Kubernetes context name (defaults to the current context)
    #[arg(long)]
    pub context: Option<String>,

    /// Namespace of the node pod
    #[arg(long)]
    pub namespace: Option<String>,

    /// Pod running the node
    #[arg(long)]
    pub pod: Option<String>,

    /// Container within the pod (defaults to the only container)
    #[arg(long)]
    pub container: Option<String>,

    /// Name events are recorded under (defaults to the pod name)
    #[arg(long)]
    pub source: Option<String>,

    /// TOML config file; command line flags take precedence
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Settings as read from the config file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub nexus: Option<String>,
    pub server: Option<String>,
    pub context: Option<String>,
    pub namespace: Option<String>,
    pub pod: Option<String>,
    pub container: Option<String>,
    pub source: Option<String>,

    pub health_interval_secs: Option<u64>,
    pub mismatch_delay_secs: Option<u64>,
    pub report_interval_secs: Option<u64>,

    pub max_attempts: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub rejection_delay_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub nexus_url: String,
    pub server_ip: Option<String>,
    pub context: Option<String>,
    pub namespace: String,
    pub pod: String,
    pub container: Option<String>,
    pub source: String,
    pub stream: StreamSettings,
    pub report_interval: Duration,
    pub delivery: DeliveryPolicy,
}

impl Config {
    /// Resolve the command line against the optional config file
    pub fn load(args: Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    fn resolve(args: Args, file: FileConfig) -> Result<Self> {
        let nexus_url = args
            .nexus
            .or(file.nexus)
            .context("Nexus URL is required (--nexus or `nexus` in the config file)")?;
        validate_nexus_url(&nexus_url)?;

        let pod = args
            .pod
            .or(file.pod)
            .context("Pod name is required (--pod or `pod` in the config file)")?;

        let stream_defaults = StreamSettings::default();
        let delivery_defaults = DeliveryPolicy::default();
        let secs = |value: Option<u64>, default: Duration| value.map_or(default, Duration::from_secs);

        Ok(Self {
            nexus_url,
            server_ip: args.server.or(file.server),
            context: args.context.or(file.context),
            namespace: args
                .namespace
                .or(file.namespace)
                .unwrap_or_else(|| "default".to_string()),
            source: args.source.or(file.source).unwrap_or_else(|| pod.clone()),
            pod,
            container: args.container.or(file.container),
            stream: StreamSettings {
                health_interval: secs(file.health_interval_secs, stream_defaults.health_interval),
                mismatch_delay: secs(file.mismatch_delay_secs, stream_defaults.mismatch_delay),
            },
            report_interval: secs(file.report_interval_secs, Duration::from_secs(60)),
            delivery: DeliveryPolicy {
                max_attempts: file.max_attempts.unwrap_or(delivery_defaults.max_attempts).max(1),
                retry_delay: secs(file.retry_delay_secs, delivery_defaults.retry_delay),
                rejection_delay: secs(file.rejection_delay_secs, delivery_defaults.rejection_delay),
                request_timeout: secs(file.request_timeout_secs, delivery_defaults.request_timeout),
            },
        })
    }
}

fn validate_nexus_url(url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(url).with_context(|| format!("Invalid Nexus URL: {}", url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("Nexus URL must be http or https: {}", url);
    }
    Ok(())
}
