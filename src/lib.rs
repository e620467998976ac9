/*
 * 5D Labs Agent Platform - Kubernetes Orchestrator for AI Coding Agents
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! Inspection orchestration core.
//!
//! Ties together the Store, Check Engine, Cluster Probe, Agent Coordination
//! Plane, Run Orchestrator, Report Emitter, and License Guard behind the
//! HTTP API in `http`.

pub mod agents;
pub mod checks;
pub mod cluster;
pub mod config;
pub mod error;
pub mod http;
pub mod license;
pub mod models;
pub mod reports;
pub mod runs;
pub mod store;

pub use config::{AppConfig, Cli};
pub use error::{AppError, AppResult};
pub use store::Store;
