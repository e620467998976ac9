use crate::models::{Cluster, InspectionResult, InspectionRun};
use handlebars::Handlebars;
use serde_json::json;

const TEMPLATE: &str = r#"# Inspection report

- Cluster: {{cluster_name}}
- Run: {{run_id}}
- Status: {{status}}
- Executor: {{executor}}
- Summary: {{summary}}
- Started: {{started_at}}
- Completed: {{completed_at}}

## Results

{{#each results}}
### {{this.seq}}. {{this.item_name}} -- {{this.status}}

{{#if this.detail}}{{this.detail}}{{/if}}
{{#if this.suggestion}}

Suggestion: {{this.suggestion}}
{{/if}}

{{/each}}
"#;

pub fn render(run: &InspectionRun, cluster: &Cluster, results: &[InspectionResult]) -> String {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(false);
    handlebars
        .register_template_string("report", TEMPLATE)
        .expect("report template is a compile-time constant");

    let results_ctx: Vec<_> = results
        .iter()
        .map(|r| {
            json!({
                "seq": r.item_seq + 1,
                "item_name": r.item_name,
                "status": r.status.to_string(),
                "detail": r.detail,
                "suggestion": r.suggestion,
            })
        })
        .collect();

    let ctx = json!({
        "cluster_name": cluster.name,
        "run_id": run.id,
        "status": run.status.to_string(),
        "executor": run.executor.to_string(),
        "summary": run.summary.clone().unwrap_or_default(),
        "started_at": run.started_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        "completed_at": run.completed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        "results": results_ctx,
    });

    handlebars.render("report", &ctx).unwrap_or_else(|e| format!("# report render error\n\n{e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionStatus, Executor, ExecutionMode, ResultStatus, RunStatus};

    fn sample_cluster() -> Cluster {
        Cluster {
            id: "c1".to_string(),
            name: "prod-east".to_string(),
            kubeconfig_handle: "kc.yaml".to_string(),
            prometheus_url: None,
            contexts: Vec::new(),
            connection_status: ConnectionStatus::Connected,
            connection_message: None,
            kubernetes_version: None,
            node_count: None,
            last_checked_at: None,
            execution_mode: ExecutionMode::Server,
            default_agent_id: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn sample_run() -> InspectionRun {
        InspectionRun {
            id: "run-1".to_string(),
            cluster_id: "c1".to_string(),
            operator: None,
            status: RunStatus::Completed,
            executor: Executor::Server,
            agent_id: None,
            agent_status: None,
            total_items: 1,
            processed_items: 1,
            progress: 100,
            summary: Some("1 item(s) passed, 0 warning(s), 0 failed".to_string()),
            report_path: None,
            created_at: chrono::Utc::now(),
            started_at: Some(chrono::Utc::now()),
            completed_at: Some(chrono::Utc::now()),
            lease_expires_at: None,
            cancel_requested: false,
        }
    }

    #[test]
    fn renders_cluster_run_and_result_details() {
        let run = sample_run();
        let cluster = sample_cluster();
        let results = vec![InspectionResult {
            id: "res-1".to_string(),
            run_id: run.id.clone(),
            item_id: Some("item-1".to_string()),
            item_name: "cluster version".to_string(),
            item_seq: 0,
            status: ResultStatus::Passed,
            detail: Some("v1.31.0".to_string()),
            suggestion: None,
            created_at: chrono::Utc::now(),
        }];

        let out = render(&run, &cluster, &results);
        assert!(out.contains("prod-east"));
        assert!(out.contains("run-1"));
        assert!(out.contains("cluster version"));
        assert!(out.contains("v1.31.0"));
        assert!(out.contains("1. cluster version"));
    }

    #[test]
    fn renders_without_results() {
        let out = render(&sample_run(), &sample_cluster(), &[]);
        assert!(out.contains("Inspection report"));
    }
}
