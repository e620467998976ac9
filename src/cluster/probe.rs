//! Cluster Probe (§4.5): validates a kubeconfig by querying the API server.

use crate::error::AppError;
use crate::models::ConnectionStatus;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::time::Duration;

pub struct ProbeOutcome {
    pub status: ConnectionStatus,
    pub message: String,
    pub kubernetes_version: Option<String>,
    pub node_count: Option<i64>,
}

/// Build a `kube::Client` from an in-memory kubeconfig blob (YAML). Shared by
/// the probe and by the builtin check handlers that need direct API access.
pub async fn kube_client_from_blob(blob: &str) -> Result<Client, AppError> {
    let kubeconfig = Kubeconfig::from_yaml(blob)
        .map_err(|e| AppError::DependencyUnavailable(format!("invalid kubeconfig: {e}")))?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| AppError::DependencyUnavailable(format!("kubeconfig resolution failed: {e}")))?;
    Client::try_from(config).map_err(|e| AppError::DependencyUnavailable(format!("client build failed: {e}")))
}

/// Lightweight connectivity test equivalent to `kubectl get --raw=/version`
/// followed by `kubectl get nodes`. Partial success (version OK, nodes failed)
/// is reported as `warning`; total failure as `failed`.
pub async fn probe(kubeconfig_blob: &str, timeout: Duration) -> ProbeOutcome {
    let client = match tokio::time::timeout(timeout, kube_client_from_blob(kubeconfig_blob)).await {
        Ok(Ok(client)) => client,
        Ok(Err(e)) => {
            return ProbeOutcome {
                status: ConnectionStatus::Failed,
                message: e.to_string(),
                kubernetes_version: None,
                node_count: None,
            }
        }
        Err(_) => {
            return ProbeOutcome {
                status: ConnectionStatus::Failed,
                message: format!("timed out after {}s connecting to API server", timeout.as_secs()),
                kubernetes_version: None,
                node_count: None,
            }
        }
    };

    let version_result = tokio::time::timeout(timeout, client.apiserver_version()).await;
    let version = match version_result {
        Ok(Ok(info)) => Some(info.git_version),
        _ => None,
    };

    let nodes_api: kube::Api<k8s_openapi::api::core::v1::Node> = kube::Api::all(client);
    let node_count = match tokio::time::timeout(timeout, nodes_api.list(&Default::default())).await {
        Ok(Ok(list)) => Some(list.items.len() as i64),
        _ => None,
    };

    match (version.as_ref(), node_count) {
        (Some(v), Some(n)) => ProbeOutcome {
            status: ConnectionStatus::Connected,
            message: format!("connected, kubernetes {v}, {n} node(s)"),
            kubernetes_version: Some(v.clone()),
            node_count: Some(n),
        },
        (Some(v), None) => ProbeOutcome {
            status: ConnectionStatus::Warning,
            message: "version check succeeded but node listing failed".to_string(),
            kubernetes_version: Some(v.clone()),
            node_count: None,
        },
        (None, Some(n)) => ProbeOutcome {
            status: ConnectionStatus::Warning,
            message: "node listing succeeded but version check failed".to_string(),
            kubernetes_version: None,
            node_count: Some(n),
        },
        (None, None) => ProbeOutcome {
            status: ConnectionStatus::Failed,
            message: "neither version check nor node listing succeeded".to_string(),
            kubernetes_version: None,
            node_count: None,
        },
    }
}
