//! Cross-cutting scenarios exercising the Store, RunOrchestrator, and
//! AgentCoordinator together against a real (file-backed, temp-dir) SQLite
//! database. Each module-level unit test stubs its collaborators; these
//! exist to prove the pieces cooperate correctly end to end.

#[cfg(test)]
mod tests {
    use crate::agents::AgentCoordinator;
    use crate::checks::PromqlClient;
    use crate::config::AppConfig;
    use crate::models::{AgentStatus, Cluster, ConnectionStatus, Executor, ExecutionMode, CheckConfig, InspectionItem, ResultStatus, RunStatus};
    use crate::runs::RunOrchestrator;
    use crate::store::Store;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    struct FixedPromqlClient(Vec<f64>);

    #[async_trait]
    impl PromqlClient for FixedPromqlClient {
        async fn instant_query(&self, _base_url: &str, _expr: &str, _timeout: Duration) -> Result<Vec<f64>, String> {
            Ok(self.0.clone())
        }
    }

    async fn test_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let store = Store::connect(&url).await.expect("connect");
        store.migrate().await.expect("migrate");
        (dir, store)
    }

    fn test_config(data_dir: &std::path::Path, lease_ttl: Duration) -> Arc<AppConfig> {
        Arc::new(AppConfig {
            data_dir: data_dir.to_path_buf(),
            database_url: None,
            license_secret: None,
            prometheus_url: None,
            bind_addr: "127.0.0.1:0".to_string(),
            lease_ttl,
            stale_sweep_interval: Duration::from_secs(30),
            default_command_timeout: Duration::from_secs(5),
            promql_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
        })
    }

    fn command_item(name: &str, template: &str) -> InspectionItem {
        let now = chrono::Utc::now();
        InspectionItem {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: None,
            config: CheckConfig::Command {
                command_template: template.to_string(),
                shell: true,
                timeout_s: 5,
                success_message: String::new(),
                failure_message: String::new(),
                suggestion_on_fail: None,
                suggestion_on_success: None,
            },
            created_at: now,
            updated_at: now,
        }
    }

    fn promql_item(name: &str) -> InspectionItem {
        let now = chrono::Utc::now();
        InspectionItem {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: None,
            config: CheckConfig::Promql {
                expression: "up{job=\"x\"}".to_string(),
                comparison: crate::models::Comparison::Gt,
                fail_threshold: 0.5,
                detail_template: String::new(),
                suggestion_on_fail: None,
                empty_message: "no data".to_string(),
                suggestion_if_empty: Some("configure exporter".to_string()),
            },
            created_at: now,
            updated_at: now,
        }
    }

    fn server_cluster(id: &str, prometheus_url: Option<&str>) -> Cluster {
        let mut cluster = Cluster::new(id.to_string(), format!("cluster-{id}"), "/tmp/does-not-exist.yaml".to_string(), prometheus_url.map(str::to_string));
        cluster.connection_status = ConnectionStatus::Connected;
        cluster
    }

    async fn wait_for_terminal(store: &Store, run_id: &str) -> crate::models::InspectionRun {
        for _ in 0..400 {
            let run = store.get_run(run_id).await.expect("run exists");
            if run.status.is_terminal() {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("run {run_id} did not reach a terminal state in time");
    }

    async fn wait_for_processed_at_least(store: &Store, run_id: &str, n: i64) {
        for _ in 0..400 {
            let run = store.get_run(run_id).await.expect("run exists");
            if run.processed_items >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {run_id} never reached {n} processed item(s)");
    }

    #[tokio::test]
    async fn command_item_run_completes_and_emits_a_report() {
        let (dir, store) = test_store().await;
        let cfg = test_config(dir.path(), Duration::from_secs(300));

        let item = command_item("echo-ok", "echo ok");
        store.create_item(&item).await.unwrap();

        let cluster_id = Uuid::new_v4().to_string();
        let cluster = server_cluster(&cluster_id, None);
        store.create_cluster(&cluster).await.unwrap();

        let promql: Arc<dyn PromqlClient> = Arc::new(FixedPromqlClient(vec![]));
        let orchestrator = RunOrchestrator::new(store.clone(), cfg.clone(), promql);

        let run = orchestrator.create_run(&cluster_id, &[item.id.clone()], None).await.unwrap();
        assert_eq!(run.status, RunStatus::Queued);

        let finished = wait_for_terminal(&store, &run.id).await;
        assert_eq!(finished.status, RunStatus::Completed);
        assert_eq!(finished.progress, 100);
        assert!(finished.report_path.is_some());

        let results = store.list_results(&run.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ResultStatus::Passed);
        assert_eq!(results[0].detail.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn promql_item_with_no_samples_warns_and_leaves_the_run_incomplete() {
        let (dir, store) = test_store().await;
        let cfg = test_config(dir.path(), Duration::from_secs(300));

        let item = promql_item("up-check");
        store.create_item(&item).await.unwrap();

        let cluster_id = Uuid::new_v4().to_string();
        let cluster = server_cluster(&cluster_id, Some("http://prometheus.invalid"));
        store.create_cluster(&cluster).await.unwrap();

        let promql: Arc<dyn PromqlClient> = Arc::new(FixedPromqlClient(vec![]));
        let orchestrator = RunOrchestrator::new(store.clone(), cfg.clone(), promql);

        let run = orchestrator.create_run(&cluster_id, &[item.id.clone()], None).await.unwrap();
        let finished = wait_for_terminal(&store, &run.id).await;

        assert_eq!(finished.status, RunStatus::Incomplete);
        let results = store.list_results(&run.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ResultStatus::Warning);
        assert_eq!(results[0].detail.as_deref(), Some("no data"));
        assert_eq!(results[0].suggestion.as_deref(), Some("configure exporter"));
    }

    #[tokio::test]
    async fn stale_agent_lease_is_reclaimed_and_becomes_pullable_again() {
        let (dir, store) = test_store().await;
        let cfg = test_config(dir.path(), Duration::from_millis(30));

        let agent_coordinator = AgentCoordinator::new(store.clone(), cfg.clone());
        let (agent, _token) = agent_coordinator.register("agent-a".to_string(), None, None, None).await.unwrap();

        let cluster_id = Uuid::new_v4().to_string();
        let mut cluster = server_cluster(&cluster_id, None);
        cluster.execution_mode = ExecutionMode::Agent;
        cluster.default_agent_id = Some(agent.id.clone());
        store.create_cluster(&cluster).await.unwrap();

        let mut item_ids = Vec::new();
        for i in 0..3 {
            let item = command_item(&format!("item-{i}"), "echo ok");
            store.create_item(&item).await.unwrap();
            item_ids.push(item.id);
        }

        let promql: Arc<dyn PromqlClient> = Arc::new(FixedPromqlClient(vec![]));
        let orchestrator = RunOrchestrator::new(store.clone(), cfg.clone(), promql);
        let run = orchestrator.create_run(&cluster_id, &item_ids, None).await.unwrap();
        assert_eq!(run.executor, Executor::Agent);
        assert_eq!(run.agent_status, Some(AgentStatus::Queued));

        let tasks = agent_coordinator.pull_tasks(&agent.id, 10).await.unwrap();
        assert_eq!(tasks.len(), 3);

        // Lease held: a second pull sees nothing left to claim.
        let second_pull = agent_coordinator.pull_tasks(&agent.id, 10).await.unwrap();
        assert!(second_pull.is_empty());

        tokio::time::sleep(Duration::from_millis(80)).await;
        store.reclaim_stale_leases().await.unwrap();

        let reclaimed = store.get_run(&run.id).await.unwrap();
        assert_eq!(reclaimed.status, RunStatus::Queued);
        assert_eq!(reclaimed.agent_status, Some(AgentStatus::Queued));
        assert!(reclaimed.lease_expires_at.is_none());

        let re_pulled = agent_coordinator.pull_tasks(&agent.id, 10).await.unwrap();
        assert_eq!(re_pulled.len(), 3);
    }

    #[tokio::test]
    async fn cancelling_a_run_preserves_already_recorded_results() {
        let (dir, store) = test_store().await;
        let cfg = test_config(dir.path(), Duration::from_secs(300));

        let fast = command_item("fast", "echo ok");
        let slow1 = command_item("slow-1", "sleep 2 && echo ok");
        let slow2 = command_item("slow-2", "sleep 2 && echo ok");
        for item in [&fast, &slow1, &slow2] {
            store.create_item(item).await.unwrap();
        }

        let cluster_id = Uuid::new_v4().to_string();
        let cluster = server_cluster(&cluster_id, None);
        store.create_cluster(&cluster).await.unwrap();

        let promql: Arc<dyn PromqlClient> = Arc::new(FixedPromqlClient(vec![]));
        let orchestrator = RunOrchestrator::new(store.clone(), cfg.clone(), promql);

        let item_ids = vec![fast.id.clone(), slow1.id.clone(), slow2.id.clone()];
        let run = orchestrator.create_run(&cluster_id, &item_ids, None).await.unwrap();

        wait_for_processed_at_least(&store, &run.id, 1).await;
        let cancelled = orchestrator.cancel_run(&run.id).await.unwrap();
        assert!(cancelled.cancel_requested);

        let finished = wait_for_terminal(&store, &run.id).await;
        assert_eq!(finished.status, RunStatus::Cancelled);
        assert_eq!(finished.progress, 100);

        let results = store.list_results(&run.id).await.unwrap();
        // All three items are eventually accounted for: the fast one already
        // ran before cancellation landed, the last one is guaranteed not to
        // have started since its predecessor alone takes longer than the
        // entire cancel round-trip.
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].status, ResultStatus::Passed);
        assert_eq!(results[0].detail.as_deref(), Some("ok"));
        assert!(results[2].detail.as_deref().unwrap_or_default().contains("cancelled"));
    }

    #[tokio::test]
    async fn duplicate_submit_result_is_idempotent() {
        let (dir, store) = test_store().await;
        let cfg = test_config(dir.path(), Duration::from_secs(300));

        let agent_coordinator = AgentCoordinator::new(store.clone(), cfg.clone());
        let (agent, _token) = agent_coordinator.register("agent-b".to_string(), None, None, None).await.unwrap();

        let item = command_item("item-x", "echo ok");
        store.create_item(&item).await.unwrap();

        let cluster_id = Uuid::new_v4().to_string();
        let mut cluster = server_cluster(&cluster_id, None);
        cluster.execution_mode = ExecutionMode::Agent;
        cluster.default_agent_id = Some(agent.id.clone());
        store.create_cluster(&cluster).await.unwrap();

        let promql: Arc<dyn PromqlClient> = Arc::new(FixedPromqlClient(vec![]));
        let orchestrator = RunOrchestrator::new(store.clone(), cfg.clone(), promql);
        let run = orchestrator.create_run(&cluster_id, &[item.id.clone()], None).await.unwrap();

        let _ = agent_coordinator.pull_tasks(&agent.id, 10).await.unwrap();

        let first = agent_coordinator
            .submit_result(&run.id, Some(&item.id), ResultStatus::Passed, Some("first".to_string()), None)
            .await
            .unwrap();
        let second = agent_coordinator
            .submit_result(&run.id, Some(&item.id), ResultStatus::Passed, Some("second".to_string()), None)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.detail.as_deref(), Some("first"));

        let results = store.list_results(&run.id).await.unwrap();
        assert_eq!(results.len(), 1);

        let finished = store.get_run(&run.id).await.unwrap();
        assert_eq!(finished.processed_items, 1);
        assert_eq!(finished.status, RunStatus::Completed);
    }
}
