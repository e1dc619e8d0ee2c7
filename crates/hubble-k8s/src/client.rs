//! Kubernetes client for hubble

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};

use crate::source::PodLogSource;

/// Kubernetes client wrapper
pub struct KubeClient {
    client: kube::Client,
    context: Option<String>,
}

impl KubeClient {
    /// Connect using `context` from the kubeconfig, or the inferred default
    /// (current context, or the in-cluster service account) when `None`
    pub async fn new(context: Option<&str>) -> Result<Self> {
        let client = match context {
            Some(name) => Self::client_for_context(name).await?,
            None => kube::Client::try_default()
                .await
                .context("Failed to infer Kubernetes config. Is kubectl configured?")?,
        };

        Ok(Self {
            client,
            context: context.map(str::to_string),
        })
    }

    /// Create a kube::Client for a specific context
    async fn client_for_context(context_name: &str) -> Result<kube::Client> {
        let kubeconfig =
            Kubeconfig::read().context("Failed to read kubeconfig. Is kubectl configured?")?;

        if !kubeconfig.contexts.iter().any(|c| c.name == context_name) {
            anyhow::bail!("Context '{}' not found in kubeconfig", context_name);
        }

        let config = kube::Config::from_custom_kubeconfig(
            kubeconfig,
            &KubeConfigOptions {
                context: Some(context_name.to_string()),
                ..Default::default()
            },
        )
        .await
        .context(format!(
            "Failed to create config for context: {}",
            context_name
        ))?;

        kube::Client::try_from(config).context(format!(
            "Failed to create client for context: {}",
            context_name
        ))
    }

    /// The context this client was created for, if one was named
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Log source and resource probe for one pod
    pub fn pod(&self, namespace: &str, name: &str, container: Option<String>) -> PodLogSource {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        PodLogSource::new(api, namespace.to_string(), name.to_string(), container)
    }
}
