use clap::Parser;
use inspection_core::checks::{PromqlClient, ReqwestPromqlClient};
use inspection_core::cluster::ClusterService;
use inspection_core::http::{build_router, AppState};
use inspection_core::license::LicenseGuard;
use inspection_core::runs::RunOrchestrator;
use inspection_core::{agents, AppConfig, Cli, Store};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("inspection_core=info".parse()?))
        .init();

    let cli = Cli::parse();
    let cfg = Arc::new(AppConfig::load(&cli));

    tokio::fs::create_dir_all(&cfg.data_dir).await?;
    tokio::fs::create_dir_all(cfg.configs_dir()).await?;
    tokio::fs::create_dir_all(cfg.reports_dir()).await?;

    let store = Store::connect(&cfg.resolved_database_url()).await?;
    store.migrate().await?;

    if cli.migrate_only {
        info!("migrations applied, exiting (--migrate-only)");
        return Ok(());
    }

    let clusters = ClusterService::new(store.clone(), cfg.clone());
    let agent_coordinator = agents::AgentCoordinator::new(store.clone(), cfg.clone());
    let promql_client: Arc<dyn PromqlClient> = Arc::new(ReqwestPromqlClient::default());
    let runs = RunOrchestrator::new(store.clone(), cfg.clone(), promql_client);
    let license = Arc::new(LicenseGuard::new(cfg.license_secret.clone(), cfg.license_path()));

    let lease_sweeper = agents::lease::spawn(store.clone(), cfg.clone());

    let state = AppState { store, cfg: cfg.clone(), clusters, runs, agents: agent_coordinator, license };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    info!(addr = %cfg.bind_addr, "inspection-core listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    lease_sweeper.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}
