use super::CheckOutcome;
use crate::config::AppConfig;
use crate::models::{CheckConfig, Cluster, InspectionItem};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PromResponse {
    data: PromData,
}

#[derive(Debug, Deserialize)]
struct PromData {
    result: Vec<PromSample>,
}

#[derive(Debug, Deserialize)]
struct PromSample {
    /// `[timestamp, "value-as-string"]` per the Prometheus HTTP API.
    value: (f64, String),
}

#[async_trait]
pub trait PromqlClient: Send + Sync {
    async fn instant_query(&self, base_url: &str, expr: &str, timeout: std::time::Duration) -> Result<Vec<f64>, String>;
}

pub struct ReqwestPromqlClient {
    client: reqwest::Client,
}

impl Default for ReqwestPromqlClient {
    fn default() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

#[async_trait]
impl PromqlClient for ReqwestPromqlClient {
    async fn instant_query(&self, base_url: &str, expr: &str, timeout: std::time::Duration) -> Result<Vec<f64>, String> {
        let url = format!("{}/api/v1/query", base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(url)
            .query(&[("query", expr)])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("prometheus returned HTTP {}", resp.status()));
        }

        let body: PromResponse = resp.json().await.map_err(|e| e.to_string())?;
        Ok(body
            .data
            .result
            .into_iter()
            .map(|s| s.value.1.parse::<f64>().unwrap_or(f64::NAN))
            .collect())
    }
}

pub async fn evaluate(
    cfg: &AppConfig,
    item: &InspectionItem,
    cluster: &Cluster,
    client: &dyn PromqlClient,
) -> CheckOutcome {
    let CheckConfig::Promql {
        expression,
        comparison,
        fail_threshold,
        detail_template,
        suggestion_on_fail,
        empty_message,
        suggestion_if_empty,
    } = &item.config
    else {
        return CheckOutcome::misconfigured("config");
    };

    if expression.trim().is_empty() {
        return CheckOutcome::misconfigured("expression");
    }

    let Some(prom_url) = &cluster.prometheus_url else {
        return CheckOutcome::warning(empty_message.clone(), suggestion_if_empty.clone());
    };

    match client.instant_query(prom_url, expression, cfg.promql_timeout).await {
        Err(e) => CheckOutcome::failed(format!("prometheus query failed: {e}"), suggestion_on_fail.clone()),
        Ok(samples) if samples.is_empty() => CheckOutcome::warning(empty_message.clone(), suggestion_if_empty.clone()),
        Ok(samples) => {
            let value = samples[0];
            let detail = render_detail(detail_template, expression, value);
            if comparison.fails(value, *fail_threshold) {
                CheckOutcome::failed(detail, suggestion_on_fail.clone())
            } else {
                CheckOutcome::passed(detail)
            }
        }
    }
}

fn render_detail(template: &str, expression: &str, value: f64) -> String {
    if template.is_empty() {
        return format!("{expression} = {value}");
    }
    template.replace("{expression}", expression).replace("{value}", &value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cluster, Comparison};

    struct FixedClient(Result<Vec<f64>, String>);

    #[async_trait]
    impl PromqlClient for FixedClient {
        async fn instant_query(&self, _base_url: &str, _expr: &str, _timeout: std::time::Duration) -> Result<Vec<f64>, String> {
            self.0.clone()
        }
    }

    fn promql_item(comparison: Comparison, fail_threshold: f64) -> InspectionItem {
        let now = chrono::Utc::now();
        InspectionItem {
            id: "item-1".to_string(),
            name: "cpu-usage".to_string(),
            description: None,
            config: CheckConfig::Promql {
                expression: "node_cpu_usage".to_string(),
                comparison,
                fail_threshold,
                detail_template: String::new(),
                suggestion_on_fail: Some("scale up".to_string()),
                empty_message: "no samples returned".to_string(),
                suggestion_if_empty: Some("check the exporter".to_string()),
            },
            created_at: now,
            updated_at: now,
        }
    }

    fn cluster_with_prometheus(url: Option<&str>) -> Cluster {
        Cluster::new("c1".to_string(), "cluster-1".to_string(), "kc.yaml".to_string(), url.map(str::to_string))
    }

    #[tokio::test]
    async fn missing_prometheus_url_is_a_warning_not_a_failure() {
        let cfg = AppConfig::load(&crate::config::Cli { data_dir: None, bind: None, migrate_only: false });
        let item = promql_item(Comparison::Gt, 80.0);
        let cluster = cluster_with_prometheus(None);
        let client = FixedClient(Ok(vec![90.0]));

        let outcome = evaluate(&cfg, &item, &cluster, &client).await;
        assert_eq!(outcome.status, crate::models::ResultStatus::Warning);
        assert_eq!(outcome.detail.as_deref(), Some("no samples returned"));
    }

    #[tokio::test]
    async fn empty_result_set_is_a_warning() {
        let cfg = AppConfig::load(&crate::config::Cli { data_dir: None, bind: None, migrate_only: false });
        let item = promql_item(Comparison::Gt, 80.0);
        let cluster = cluster_with_prometheus(Some("http://prom.local"));
        let client = FixedClient(Ok(vec![]));

        let outcome = evaluate(&cfg, &item, &cluster, &client).await;
        assert_eq!(outcome.status, crate::models::ResultStatus::Warning);
        assert_eq!(outcome.suggestion.as_deref(), Some("check the exporter"));
    }

    #[tokio::test]
    async fn value_beyond_threshold_fails() {
        let cfg = AppConfig::load(&crate::config::Cli { data_dir: None, bind: None, migrate_only: false });
        let item = promql_item(Comparison::Gt, 80.0);
        let cluster = cluster_with_prometheus(Some("http://prom.local"));
        let client = FixedClient(Ok(vec![95.5]));

        let outcome = evaluate(&cfg, &item, &cluster, &client).await;
        assert_eq!(outcome.status, crate::models::ResultStatus::Failed);
        assert_eq!(outcome.suggestion.as_deref(), Some("scale up"));
        assert_eq!(outcome.detail.as_deref(), Some("node_cpu_usage = 95.5"));
    }

    #[tokio::test]
    async fn value_within_threshold_passes() {
        let cfg = AppConfig::load(&crate::config::Cli { data_dir: None, bind: None, migrate_only: false });
        let item = promql_item(Comparison::Gt, 80.0);
        let cluster = cluster_with_prometheus(Some("http://prom.local"));
        let client = FixedClient(Ok(vec![10.0]));

        let outcome = evaluate(&cfg, &item, &cluster, &client).await;
        assert_eq!(outcome.status, crate::models::ResultStatus::Passed);
    }

    #[tokio::test]
    async fn query_error_fails_the_check() {
        let cfg = AppConfig::load(&crate::config::Cli { data_dir: None, bind: None, migrate_only: false });
        let item = promql_item(Comparison::Gt, 80.0);
        let cluster = cluster_with_prometheus(Some("http://prom.local"));
        let client = FixedClient(Err("connection refused".to_string()));

        let outcome = evaluate(&cfg, &item, &cluster, &client).await;
        assert_eq!(outcome.status, crate::models::ResultStatus::Failed);
        assert!(outcome.detail.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn reqwest_client_parses_the_prometheus_instant_query_response() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "data": { "resultType": "vector", "result": [{ "metric": {}, "value": [1.0, "42.5"] }] }
            })))
            .mount(&server)
            .await;

        let client = ReqwestPromqlClient::default();
        let samples = client.instant_query(&server.uri(), "up", std::time::Duration::from_secs(5)).await.unwrap();
        assert_eq!(samples, vec![42.5]);
    }

    #[tokio::test]
    async fn reqwest_client_surfaces_a_non_success_status_as_an_error() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = ReqwestPromqlClient::default();
        let err = client.instant_query(&server.uri(), "up", std::time::Duration::from_secs(5)).await.unwrap_err();
        assert!(err.contains("503"));
    }

    #[tokio::test]
    async fn unparsable_sample_becomes_nan_and_only_fails_equality() {
        // ReqwestPromqlClient maps an unparsable sample string to NaN; a
        // Gt comparison must not treat that as a failure.
        let cfg = AppConfig::load(&crate::config::Cli { data_dir: None, bind: None, migrate_only: false });
        let item = promql_item(Comparison::Gt, 80.0);
        let cluster = cluster_with_prometheus(Some("http://prom.local"));
        let client = FixedClient(Ok(vec![f64::NAN]));

        let outcome = evaluate(&cfg, &item, &cluster, &client).await;
        assert_eq!(outcome.status, crate::models::ResultStatus::Passed);
    }
}
