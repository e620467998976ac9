use super::promql::PromqlClient;
use super::CheckOutcome;
use crate::cluster::probe::kube_client_from_blob;
use crate::config::AppConfig;
use crate::models::{CheckConfig, Cluster};
use k8s_openapi::api::core::v1::{Event, Node, Pod};
use kube::Api;

/// Builtin check kinds carry no user configuration; each is a fixed handler.
/// Resource-usage builtins require Prometheus and degrade to `warning` when
/// it is absent, matching the plain `promql` rule.
pub async fn evaluate(
    cfg: &AppConfig,
    kind: &CheckConfig,
    cluster: &Cluster,
    kubeconfig_blob: &str,
    promql_client: &dyn PromqlClient,
) -> CheckOutcome {
    match kind {
        CheckConfig::ClusterVersion => cluster_version(kubeconfig_blob).await,
        CheckConfig::NodesStatus => nodes_status(kubeconfig_blob).await,
        CheckConfig::PodsStatus => pods_status(kubeconfig_blob).await,
        CheckConfig::EventsRecent => events_recent(kubeconfig_blob).await,
        CheckConfig::ClusterCpuUsage => {
            resource_query(cfg, cluster, promql_client, "sum(rate(container_cpu_usage_seconds_total[5m]))", 0.85, "cluster CPU usage").await
        }
        CheckConfig::ClusterMemoryUsage => {
            resource_query(
                cfg,
                cluster,
                promql_client,
                "sum(container_memory_working_set_bytes) / sum(machine_memory_bytes)",
                0.85,
                "cluster memory usage",
            )
            .await
        }
        CheckConfig::NodeCpuHotspots => {
            resource_query(cfg, cluster, promql_client, "max(instance:node_cpu_utilisation:rate5m)", 0.9, "node CPU hotspot")
                .await
        }
        CheckConfig::NodeMemoryPressure => {
            resource_query(cfg, cluster, promql_client, "max(node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes)", 0.1, "node memory pressure")
                .await
        }
        CheckConfig::ClusterDiskIo => {
            resource_query(cfg, cluster, promql_client, "sum(rate(node_disk_io_time_seconds_total[5m]))", 0.8, "cluster disk I/O")
                .await
        }
        _ => CheckOutcome::failed("unknown check type", None),
    }
}

async fn cluster_version(kubeconfig_blob: &str) -> CheckOutcome {
    match kube_client_from_blob(kubeconfig_blob).await {
        Ok(client) => match client.apiserver_version().await {
            Ok(info) => CheckOutcome::passed(format!("kubernetes {}", info.git_version)),
            Err(e) => CheckOutcome::failed(format!("version query failed: {e}"), None),
        },
        Err(e) => CheckOutcome::failed(e.to_string(), None),
    }
}

async fn nodes_status(kubeconfig_blob: &str) -> CheckOutcome {
    let client = match kube_client_from_blob(kubeconfig_blob).await {
        Ok(c) => c,
        Err(e) => return CheckOutcome::failed(e.to_string(), None),
    };
    let api: Api<Node> = Api::all(client);
    match api.list(&Default::default()).await {
        Ok(list) => {
            let total = list.items.len();
            let not_ready: Vec<String> = list
                .items
                .iter()
                .filter(|n| !node_is_ready(n))
                .filter_map(|n| n.metadata.name.clone())
                .collect();
            if not_ready.is_empty() {
                CheckOutcome::passed(format!("{total} node(s), all ready"))
            } else {
                CheckOutcome::failed(
                    format!("{}/{} node(s) not ready: {}", not_ready.len(), total, not_ready.join(", ")),
                    Some("inspect `kubectl describe node` for the affected nodes".to_string()),
                )
            }
        }
        Err(e) => CheckOutcome::failed(format!("node listing failed: {e}"), None),
    }
}

fn node_is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .into_iter()
        .flatten()
        .any(|c| c.type_ == "Ready" && c.status == "True")
}

async fn pods_status(kubeconfig_blob: &str) -> CheckOutcome {
    let client = match kube_client_from_blob(kubeconfig_blob).await {
        Ok(c) => c,
        Err(e) => return CheckOutcome::failed(e.to_string(), None),
    };
    let api: Api<Pod> = Api::all(client);
    match api.list(&Default::default()).await {
        Ok(list) => {
            let total = list.items.len();
            let unhealthy: Vec<String> = list
                .items
                .iter()
                .filter(|p| !pod_is_healthy(p))
                .filter_map(|p| p.metadata.name.clone())
                .collect();
            if unhealthy.is_empty() {
                CheckOutcome::passed(format!("{total} pod(s), all healthy"))
            } else if unhealthy.len() * 10 < total.max(1) {
                CheckOutcome::warning(
                    format!("{}/{} pod(s) unhealthy: {}", unhealthy.len(), total, unhealthy.join(", ")),
                    Some("check pod logs and events for the affected workloads".to_string()),
                )
            } else {
                CheckOutcome::failed(
                    format!("{}/{} pod(s) unhealthy: {}", unhealthy.len(), total, unhealthy.join(", ")),
                    Some("check pod logs and events for the affected workloads".to_string()),
                )
            }
        }
        Err(e) => CheckOutcome::failed(format!("pod listing failed: {e}"), None),
    }
}

fn pod_is_healthy(pod: &Pod) -> bool {
    matches!(pod.status.as_ref().and_then(|s| s.phase.as_deref()), Some("Running") | Some("Succeeded"))
}

async fn events_recent(kubeconfig_blob: &str) -> CheckOutcome {
    let client = match kube_client_from_blob(kubeconfig_blob).await {
        Ok(c) => c,
        Err(e) => return CheckOutcome::failed(e.to_string(), None),
    };
    let api: Api<Event> = Api::all(client);
    match api.list(&Default::default()).await {
        Ok(list) => {
            let warnings = list.items.iter().filter(|e| e.type_.as_deref() == Some("Warning")).count();
            if warnings == 0 {
                CheckOutcome::passed(format!("{} recent event(s), none are warnings", list.items.len()))
            } else {
                CheckOutcome::warning(
                    format!("{warnings} warning event(s) in the last window"),
                    Some("run `kubectl get events --field-selector type=Warning` for detail".to_string()),
                )
            }
        }
        Err(e) => CheckOutcome::failed(format!("event listing failed: {e}"), None),
    }
}

async fn resource_query(
    cfg: &AppConfig,
    cluster: &Cluster,
    client: &dyn PromqlClient,
    expr: &str,
    fail_threshold: f64,
    label: &str,
) -> CheckOutcome {
    let Some(prom_url) = &cluster.prometheus_url else {
        return CheckOutcome::warning(
            format!("{label} check requires Prometheus and none is configured for this cluster"),
            Some("set a prometheus_url on the cluster".to_string()),
        );
    };

    match client.instant_query(prom_url, expr, cfg.promql_timeout).await {
        Err(e) => CheckOutcome::failed(format!("{label} query failed: {e}"), None),
        Ok(samples) if samples.is_empty() => CheckOutcome::warning(format!("no data for {label}"), None),
        Ok(samples) => {
            let value = samples[0];
            if !value.is_nan() && value > fail_threshold {
                CheckOutcome::failed(format!("{label} = {value:.3} (threshold {fail_threshold})"), None)
            } else {
                CheckOutcome::passed(format!("{label} = {value:.3}"))
            }
        }
    }
}
