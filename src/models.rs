//! Domain types for the inspection platform: clusters, inspection items, runs,
//! results, agents, and the audit log. These are plain data carriers; the
//! `store` module owns mapping them to/from rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

fn now() -> DateTime<Utc> {
    Utc::now()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Failed,
    Warning,
    Unknown,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
            ConnectionStatus::Warning => "warning",
            ConnectionStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ConnectionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "connected" => ConnectionStatus::Connected,
            "failed" => ConnectionStatus::Failed,
            "warning" => ConnectionStatus::Warning,
            _ => ConnectionStatus::Unknown,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Server,
    Agent,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionMode::Server => "server",
            ExecutionMode::Agent => "agent",
        })
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "agent" => ExecutionMode::Agent,
            _ => ExecutionMode::Server,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub kubeconfig_handle: String,
    pub prometheus_url: Option<String>,
    pub contexts: Vec<String>,
    pub connection_status: ConnectionStatus,
    pub connection_message: Option<String>,
    pub kubernetes_version: Option<String>,
    pub node_count: Option<i64>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub execution_mode: ExecutionMode,
    pub default_agent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    #[allow(clippy::too_many_arguments)]
    pub fn new(id: String, name: String, kubeconfig_handle: String, prometheus_url: Option<String>) -> Self {
        let ts = now();
        Self {
            id,
            name,
            kubeconfig_handle,
            prometheus_url,
            contexts: Vec::new(),
            connection_status: ConnectionStatus::Unknown,
            connection_message: None,
            kubernetes_version: None,
            node_count: None,
            last_checked_at: None,
            execution_mode: ExecutionMode::Server,
            default_agent_id: None,
            created_at: ts,
            updated_at: ts,
        }
    }
}

/// Per-`check_type` configuration. `Unknown` is the fallback used when reading
/// historical rows whose `check_type` is no longer recognised by this build;
/// evaluating it always yields `failed` / "unknown check type".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check_type", rename_all = "snake_case")]
pub enum CheckConfig {
    Command {
        #[serde(default)]
        command_template: String,
        #[serde(default)]
        shell: bool,
        #[serde(default = "default_timeout_s")]
        timeout_s: u64,
        #[serde(default)]
        success_message: String,
        #[serde(default)]
        failure_message: String,
        #[serde(default)]
        suggestion_on_fail: Option<String>,
        #[serde(default)]
        suggestion_on_success: Option<String>,
    },
    Promql {
        #[serde(default)]
        expression: String,
        #[serde(default = "default_comparison")]
        comparison: Comparison,
        #[serde(default)]
        fail_threshold: f64,
        #[serde(default)]
        detail_template: String,
        #[serde(default)]
        suggestion_on_fail: Option<String>,
        #[serde(default)]
        empty_message: String,
        #[serde(default)]
        suggestion_if_empty: Option<String>,
    },
    ClusterVersion,
    NodesStatus,
    PodsStatus,
    EventsRecent,
    ClusterCpuUsage,
    ClusterMemoryUsage,
    NodeCpuHotspots,
    NodeMemoryPressure,
    ClusterDiskIo,
    #[serde(other)]
    Unknown,
}

fn default_timeout_s() -> u64 {
    30
}

fn default_comparison() -> Comparison {
    Comparison::Gt
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparison {
    /// Evaluate the failure predicate this comparison names. NaN always
    /// fails the predicate (decided in spec.md §9's open question).
    pub fn fails(self, value: f64, threshold: f64) -> bool {
        if value.is_nan() {
            return matches!(self, Comparison::Eq | Comparison::Ne);
        }
        match self {
            Comparison::Gt => value > threshold,
            Comparison::Lt => value < threshold,
            Comparison::Eq => value == threshold,
            Comparison::Ge => value >= threshold,
            Comparison::Le => value <= threshold,
            Comparison::Ne => value != threshold,
        }
    }
}

impl CheckConfig {
    pub fn kind_str(&self) -> &'static str {
        match self {
            CheckConfig::Command { .. } => "command",
            CheckConfig::Promql { .. } => "promql",
            CheckConfig::ClusterVersion => "cluster_version",
            CheckConfig::NodesStatus => "nodes_status",
            CheckConfig::PodsStatus => "pods_status",
            CheckConfig::EventsRecent => "events_recent",
            CheckConfig::ClusterCpuUsage => "cluster_cpu_usage",
            CheckConfig::ClusterMemoryUsage => "cluster_memory_usage",
            CheckConfig::NodeCpuHotspots => "node_cpu_hotspots",
            CheckConfig::NodeMemoryPressure => "node_memory_pressure",
            CheckConfig::ClusterDiskIo => "cluster_disk_io",
            CheckConfig::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionItem {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub config: CheckConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Paused,
    Cancelled,
    Completed,
    Incomplete,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Incomplete | RunStatus::Cancelled)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "queued" => RunStatus::Queued,
            "running" => RunStatus::Running,
            "paused" => RunStatus::Paused,
            "cancelled" => RunStatus::Cancelled,
            "completed" => RunStatus::Completed,
            "incomplete" => RunStatus::Incomplete,
            other => return Err(format!("unknown run status: {other}")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Executor {
    Server,
    Agent,
}

impl fmt::Display for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Executor::Server => "server",
            Executor::Agent => "agent",
        })
    }
}

impl std::str::FromStr for Executor {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "agent" => Executor::Agent,
            _ => Executor::Server,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Queued,
    Running,
    Finished,
    Failed,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Queued => "queued",
            AgentStatus::Running => "running",
            AgentStatus::Finished => "finished",
            AgentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "queued" => AgentStatus::Queued,
            "running" => AgentStatus::Running,
            "finished" => AgentStatus::Finished,
            "failed" => AgentStatus::Failed,
            other => return Err(format!("unknown agent status: {other}")),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionRun {
    pub id: String,
    pub cluster_id: String,
    pub operator: Option<String>,
    pub status: RunStatus,
    pub executor: Executor,
    pub agent_id: Option<String>,
    pub agent_status: Option<AgentStatus>,
    pub total_items: i64,
    pub processed_items: i64,
    pub progress: i64,
    pub summary: Option<String>,
    pub report_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub cancel_requested: bool,
}

impl InspectionRun {
    pub fn recompute_progress(&mut self) {
        self.progress = if self.total_items == 0 {
            100
        } else {
            ((self.processed_items as f64 / self.total_items as f64) * 100.0).round() as i64
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Passed,
    Warning,
    Failed,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultStatus::Passed => "passed",
            ResultStatus::Warning => "warning",
            ResultStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ResultStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "passed" => ResultStatus::Passed,
            "warning" => ResultStatus::Warning,
            "failed" => ResultStatus::Failed,
            other => return Err(format!("unknown result status: {other}")),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionResult {
    pub id: String,
    pub run_id: String,
    pub item_id: Option<String>,
    pub item_name: String,
    pub item_seq: i64,
    pub status: ResultStatus,
    pub detail: Option<String>,
    pub suggestion: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectionAgent {
    pub id: String,
    pub name: String,
    pub cluster_id: Option<String>,
    pub description: Option<String>,
    pub is_enabled: bool,
    pub prometheus_url: Option<String>,
    #[serde(skip)]
    pub token_hash: String,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditLog {
    pub id: String,
    pub actor: String,
    pub action: String,
    pub target: String,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_fails_matches_its_operator() {
        assert!(Comparison::Gt.fails(5.0, 3.0));
        assert!(!Comparison::Gt.fails(2.0, 3.0));
        assert!(Comparison::Lt.fails(1.0, 3.0));
        assert!(Comparison::Ge.fails(3.0, 3.0));
        assert!(Comparison::Le.fails(3.0, 3.0));
        assert!(Comparison::Eq.fails(3.0, 3.0));
        assert!(!Comparison::Eq.fails(3.0, 4.0));
        assert!(Comparison::Ne.fails(3.0, 4.0));
        assert!(!Comparison::Ne.fails(3.0, 3.0));
    }

    #[test]
    fn comparison_nan_only_fails_equality_family() {
        assert!(Comparison::Eq.fails(f64::NAN, 1.0));
        assert!(Comparison::Ne.fails(f64::NAN, 1.0));
        assert!(!Comparison::Gt.fails(f64::NAN, 1.0));
        assert!(!Comparison::Lt.fails(f64::NAN, 1.0));
        assert!(!Comparison::Ge.fails(f64::NAN, 1.0));
        assert!(!Comparison::Le.fails(f64::NAN, 1.0));
    }

    #[test]
    fn run_status_terminal_set() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Incomplete.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
    }

    #[test]
    fn run_status_round_trips_through_its_string_form() {
        for status in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Paused,
            RunStatus::Cancelled,
            RunStatus::Completed,
            RunStatus::Incomplete,
        ] {
            let parsed: RunStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    fn sample_run(total: i64, processed: i64) -> InspectionRun {
        let now = Utc::now();
        InspectionRun {
            id: "r1".to_string(),
            cluster_id: "c1".to_string(),
            operator: None,
            status: RunStatus::Running,
            executor: Executor::Server,
            agent_id: None,
            agent_status: None,
            total_items: total,
            processed_items: processed,
            progress: 0,
            summary: None,
            report_path: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            lease_expires_at: None,
            cancel_requested: false,
        }
    }

    #[test]
    fn recompute_progress_is_a_percentage_of_processed_over_total() {
        let mut run = sample_run(4, 1);
        run.recompute_progress();
        assert_eq!(run.progress, 25);

        run.processed_items = 3;
        run.recompute_progress();
        assert_eq!(run.progress, 75);

        run.processed_items = 4;
        run.recompute_progress();
        assert_eq!(run.progress, 100);
    }

    #[test]
    fn recompute_progress_of_an_empty_run_is_complete() {
        let mut run = sample_run(0, 0);
        run.recompute_progress();
        assert_eq!(run.progress, 100);
    }
}
