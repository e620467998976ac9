//! Persistence layer.
//!
//! Backed by `sqlx`'s `Any` driver so the same query code runs against an
//! embedded SQLite file (the default, per §6 of the spec) or an external
//! Postgres instance named by `DATABASE_URL`. All mutation goes through this
//! module; nothing upstream holds row state across an `.await` boundary --
//! the orchestrator re-reads under a fresh query after every suspension, as
//! required by the concurrency model.

mod agents;
mod audit;
mod clusters;
mod items;
mod results;
mod runs;

pub use agents::*;
pub use audit::*;
pub use clusters::*;
pub use items::*;
pub use results::*;
pub use runs::*;

use crate::error::AppError;
use chrono::{DateTime, Utc};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use std::path::Path;

#[derive(Clone)]
pub struct Store {
    pub(crate) pool: AnyPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        sqlx::any::install_default_drivers();

        if let Some(path) = sqlite_file_path(database_url) {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Internal(format!("creating data dir: {e}")))?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
                }
            }
        }

        let pool = AnyPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(|e| AppError::DependencyUnavailable(format!("database connect: {e}")))?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        const MIGRATION: &str = include_str!("../../migrations/0001_init.sql");
        for statement in MIGRATION.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Internal(format!("migration failed: {e}")))?;
        }
        Ok(())
    }

    /// Cheap round-trip used by the readiness probe.
    pub async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DependencyUnavailable(format!("store ping: {e}")))?;
        Ok(())
    }
}

fn sqlite_file_path(database_url: &str) -> Option<std::path::PathBuf> {
    let rest = database_url.strip_prefix("sqlite://")?;
    let rest = rest.split('?').next().unwrap_or(rest);
    if rest.is_empty() || rest == ":memory:" {
        return None;
    }
    Some(Path::new(rest).to_path_buf())
}

pub(crate) fn col_str(row: &AnyRow, name: &str) -> Result<String, AppError> {
    row.try_get::<String, _>(name)
        .map_err(|e| AppError::Internal(format!("reading column {name}: {e}")))
}

pub(crate) fn col_opt_str(row: &AnyRow, name: &str) -> Result<Option<String>, AppError> {
    row.try_get::<Option<String>, _>(name)
        .map_err(|e| AppError::Internal(format!("reading column {name}: {e}")))
}

pub(crate) fn col_i64(row: &AnyRow, name: &str) -> Result<i64, AppError> {
    row.try_get::<i64, _>(name)
        .map_err(|e| AppError::Internal(format!("reading column {name}: {e}")))
}

pub(crate) fn col_opt_i64(row: &AnyRow, name: &str) -> Result<Option<i64>, AppError> {
    row.try_get::<Option<i64>, _>(name)
        .map_err(|e| AppError::Internal(format!("reading column {name}: {e}")))
}

pub(crate) fn col_bool(row: &AnyRow, name: &str) -> Result<bool, AppError> {
    let raw = col_i64(row, name)?;
    Ok(raw != 0)
}

pub(crate) fn col_opt_ts(row: &AnyRow, name: &str) -> Result<Option<DateTime<Utc>>, AppError> {
    match col_opt_str(row, name)? {
        Some(s) => Ok(Some(parse_ts(&s)?)),
        None => Ok(None),
    }
}

pub(crate) fn col_ts(row: &AnyRow, name: &str) -> Result<DateTime<Utc>, AppError> {
    parse_ts(&col_str(row, name)?)
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("bad timestamp {s:?}: {e}")))
}

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn fmt_opt_ts(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(fmt_ts)
}
