use super::{CheckOutcome, KubeconfigGuard};
use crate::config::AppConfig;
use crate::models::{CheckConfig, InspectionItem};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

const DETAIL_TAIL_BYTES: usize = 2048;

pub async fn evaluate(cfg: &AppConfig, item: &InspectionItem, kubeconfig_blob: &str) -> CheckOutcome {
    let CheckConfig::Command {
        command_template,
        shell,
        timeout_s,
        success_message,
        failure_message,
        suggestion_on_fail,
        suggestion_on_success,
    } = &item.config
    else {
        return CheckOutcome::misconfigured("config");
    };

    if command_template.trim().is_empty() {
        return CheckOutcome::misconfigured("command_template");
    }

    let guard = match KubeconfigGuard::write(&cfg.configs_dir().join("tmp"), kubeconfig_blob) {
        Ok(g) => g,
        Err(e) => return CheckOutcome::failed(format!("failed to stage kubeconfig: {e}"), None),
    };

    let rendered = command_template.replace("{{kubeconfig}}", &guard.path().display().to_string());
    let timeout = if *timeout_s > 0 { Duration::from_secs(*timeout_s) } else { cfg.default_command_timeout };

    let mut command = if *shell {
        let mut c = Command::new("/bin/sh");
        c.arg("-c").arg(&rendered);
        c
    } else {
        let mut parts = rendered.split_whitespace();
        let Some(program) = parts.next() else {
            return CheckOutcome::misconfigured("command_template");
        };
        let mut c = Command::new(program);
        c.args(parts);
        c
    };

    command
        .env_clear()
        .env("PATH", std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let spawn_result = command.spawn();
    let mut child = match spawn_result {
        Ok(child) => child,
        Err(e) => return CheckOutcome::failed(format!("failed to launch command: {e}"), suggestion_on_fail.clone()),
    };

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let run = async {
        let read_stdout = async {
            let mut buf = Vec::new();
            if let Some(out) = stdout.as_mut() {
                let _ = out.read_to_end(&mut buf).await;
            }
            buf
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(err) = stderr.as_mut() {
                let _ = err.read_to_end(&mut buf).await;
            }
            buf
        };
        let (mut out_buf, err_buf) = tokio::join!(read_stdout, read_stderr);
        let status = child.wait().await;
        out_buf.extend_from_slice(&err_buf);
        (status, out_buf)
    };

    match tokio::time::timeout(timeout, run).await {
        Ok((Ok(status), _combined)) if status.success() => {
            CheckOutcome::passed(if success_message.is_empty() { "ok".to_string() } else { success_message.clone() })
                .with_suggestion(suggestion_on_success.clone())
        }
        Ok((Ok(status), combined)) => {
            let detail = tail_text(&combined, DETAIL_TAIL_BYTES);
            let detail = if detail.is_empty() {
                format!("{} (exit code {:?})", non_empty(failure_message, "command failed"), status.code())
            } else {
                detail
            };
            CheckOutcome::failed(detail, suggestion_on_fail.clone())
        }
        Ok((Err(e), _)) => CheckOutcome::failed(format!("failed to await command: {e}"), suggestion_on_fail.clone()),
        Err(_) => {
            CheckOutcome::failed(format!("command timed out after {}s", timeout.as_secs()), suggestion_on_fail.clone())
        }
    }
}

fn non_empty(s: &str, default: &str) -> String {
    if s.is_empty() { default.to_string() } else { s.to_string() }
}

fn tail_text(bytes: &[u8], max: usize) -> String {
    let start = bytes.len().saturating_sub(max);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}

impl CheckOutcome {
    fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        if self.suggestion.is_none() {
            self.suggestion = suggestion;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_text_keeps_only_the_trailing_bytes() {
        let bytes = b"0123456789";
        assert_eq!(tail_text(bytes, 4), "6789");
        assert_eq!(tail_text(bytes, 100), "0123456789");
    }

    #[test]
    fn non_empty_falls_back_to_the_default() {
        assert_eq!(non_empty("", "default"), "default");
        assert_eq!(non_empty("custom", "default"), "custom");
    }

    fn test_config() -> AppConfig {
        let dir = std::env::temp_dir().join(format!("inspection-command-test-{}", uuid::Uuid::new_v4()));
        AppConfig {
            data_dir: dir,
            database_url: None,
            license_secret: None,
            prometheus_url: None,
            bind_addr: "127.0.0.1:0".to_string(),
            lease_ttl: Duration::from_secs(300),
            stale_sweep_interval: Duration::from_secs(30),
            default_command_timeout: Duration::from_secs(5),
            promql_timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
        }
    }

    fn command_item(template: &str, success_message: &str) -> InspectionItem {
        let now = chrono::Utc::now();
        InspectionItem {
            id: "item-1".to_string(),
            name: "shell-check".to_string(),
            description: None,
            config: CheckConfig::Command {
                command_template: template.to_string(),
                shell: true,
                timeout_s: 3,
                success_message: success_message.to_string(),
                failure_message: String::new(),
                suggestion_on_fail: Some("check the node".to_string()),
                suggestion_on_success: None,
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn successful_command_passes_with_its_success_message() {
        let cfg = test_config();
        let item = command_item("echo ok", "command succeeded");
        let outcome = evaluate(&cfg, &item, "").await;
        assert_eq!(outcome.status, crate::models::ResultStatus::Passed);
        assert_eq!(outcome.detail.as_deref(), Some("command succeeded"));
    }

    #[tokio::test]
    async fn failing_command_fails_with_suggestion() {
        let cfg = test_config();
        let item = command_item("exit 1", "command succeeded");
        let outcome = evaluate(&cfg, &item, "").await;
        assert_eq!(outcome.status, crate::models::ResultStatus::Failed);
        assert_eq!(outcome.suggestion.as_deref(), Some("check the node"));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let cfg = test_config();
        let item = command_item("sleep 5", "command succeeded");
        let outcome = evaluate(&cfg, &item, "").await;
        assert_eq!(outcome.status, crate::models::ResultStatus::Failed);
        assert!(outcome.detail.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn blank_command_template_is_misconfigured() {
        let cfg = test_config();
        let item = command_item("   ", "command succeeded");
        let outcome = evaluate(&cfg, &item, "").await;
        assert_eq!(outcome.status, crate::models::ResultStatus::Failed);
        assert!(outcome.detail.unwrap().contains("misconfigured"));
    }
}
