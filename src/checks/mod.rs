//! Check Engine (§4.3): evaluates one inspection item against one cluster.
//! Never raises across its boundary -- every failure becomes a result with
//! `status = failed`, matching the error propagation policy in §7.

mod builtin;
mod command;
mod promql;

pub use promql::{PromqlClient, ReqwestPromqlClient};

use crate::config::AppConfig;
use crate::models::{CheckConfig, Cluster, InspectionItem, ResultStatus};

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub status: ResultStatus,
    pub detail: Option<String>,
    pub suggestion: Option<String>,
}

impl CheckOutcome {
    fn passed(detail: impl Into<String>) -> Self {
        Self { status: ResultStatus::Passed, detail: Some(detail.into()), suggestion: None }
    }

    fn warning(detail: impl Into<String>, suggestion: Option<String>) -> Self {
        Self { status: ResultStatus::Warning, detail: Some(detail.into()), suggestion }
    }

    fn failed(detail: impl Into<String>, suggestion: Option<String>) -> Self {
        Self { status: ResultStatus::Failed, detail: Some(detail.into()), suggestion }
    }

    fn misconfigured(key: &str) -> Self {
        Self::failed(format!("inspection item misconfigured: {key}"), None)
    }
}

/// A transient, private kubeconfig file for the duration of one check. The
/// file is 0600 and deleted on every exit path, including a panic unwind,
/// since `Drop` runs during unwinding too.
pub struct KubeconfigGuard {
    path: std::path::PathBuf,
}

impl KubeconfigGuard {
    pub fn write(dir: &std::path::Path, blob: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, blob)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for KubeconfigGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub async fn evaluate(
    cfg: &AppConfig,
    item: &InspectionItem,
    cluster: &Cluster,
    kubeconfig_blob: &str,
    promql_client: &dyn PromqlClient,
) -> CheckOutcome {
    tracing::info!(item = %item.name, cluster = %cluster.name, kind = item.config.kind_str(), "evaluating inspection item");

    let outcome = match &item.config {
        CheckConfig::Command { .. } => command::evaluate(cfg, item, kubeconfig_blob).await,
        CheckConfig::Promql { .. } => promql::evaluate(cfg, item, cluster, promql_client).await,
        CheckConfig::Unknown => CheckOutcome::failed("unknown check type", None),
        builtin_kind => builtin::evaluate(cfg, builtin_kind, cluster, kubeconfig_blob, promql_client).await,
    };

    tracing::info!(item = %item.name, status = %outcome.status, "inspection item evaluated");
    outcome
}
