//! Report Emitter (§4.1, §6): renders a finalised run to Markdown and PDF
//! and records the artefact directory on the run. Invoked best-effort from
//! `RunOrchestrator::finalise` -- a rendering failure is logged and leaves
//! `report_path` unset, it never flips the run's terminal status.

mod markdown;
mod pdf;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::{Cluster, InspectionResult, InspectionRun};
use std::path::PathBuf;

#[derive(Clone)]
pub struct ReportEmitter {
    cfg: std::sync::Arc<AppConfig>,
}

impl ReportEmitter {
    pub fn new(cfg: std::sync::Arc<AppConfig>) -> Self {
        Self { cfg }
    }

    /// Renders and writes `<reports_dir>/<run_id>.md` and `.pdf`, returning
    /// the shared path prefix (without extension) on success.
    pub async fn emit(
        &self,
        run: &InspectionRun,
        cluster: &Cluster,
        results: &[InspectionResult],
    ) -> Result<String, AppError> {
        let dir = self.cfg.reports_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Internal(format!("failed to create reports dir: {e}")))?;

        let markdown_body = markdown::render(run, cluster, results);
        let pdf_bytes = pdf::render(&markdown_body);

        let prefix: PathBuf = dir.join(&run.id);
        let md_path = prefix.with_extension("md");
        let pdf_path = prefix.with_extension("pdf");

        tokio::fs::write(&md_path, markdown_body.as_bytes())
            .await
            .map_err(|e| AppError::Internal(format!("failed to write markdown report: {e}")))?;
        tokio::fs::write(&pdf_path, &pdf_bytes)
            .await
            .map_err(|e| AppError::Internal(format!("failed to write pdf report: {e}")))?;

        Ok(prefix.to_string_lossy().to_string())
    }

    pub fn markdown_path(&self, report_path: &str) -> PathBuf {
        PathBuf::from(report_path).with_extension("md")
    }

    pub fn pdf_path(&self, report_path: &str) -> PathBuf {
        PathBuf::from(report_path).with_extension("pdf")
    }
}
