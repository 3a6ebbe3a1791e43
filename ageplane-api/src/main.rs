use ageplane_api::config::{AgePlaneConfig, ClusterMode};
use ageplane_api::kubernetes::{ClusterApi, InMemoryCluster, K8sClient};
use ageplane_api::shutdown::ShutdownCoordinator;
use ageplane_api::{build_router, AppState};
use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// AgePlane API server
#[derive(Parser, Debug)]
#[command(name = "ageplane-api", version, about)]
struct Args {
    /// Configuration file (defaults to $AGEPLANE_CONFIG, /etc/ageplane/config.toml, ./ageplane.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// API key required on /api/v1 routes
    #[arg(long)]
    api_key: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Print a sample configuration file and exit
    #[arg(long)]
    print_config: bool,
}

async fn connect_cluster(config: &AgePlaneConfig) -> anyhow::Result<Arc<dyn ClusterApi>> {
    let cluster: Arc<dyn ClusterApi> = match config.cluster.mode {
        ClusterMode::InCluster => Arc::new(K8sClient::from_incluster()?),
        ClusterMode::Kubeconfig => {
            let path = config
                .cluster
                .kubeconfig_path
                .as_deref()
                .context("kubeconfig mode requires cluster.kubeconfig_path")?;
            Arc::new(K8sClient::from_kubeconfig(path, config.cluster.context.as_deref()).await?)
        }
        ClusterMode::Auto => Arc::new(K8sClient::infer().await?),
        ClusterMode::Memory => {
            warn!("Using in-memory cluster backend; nothing is provisioned on a real cluster");
            Arc::new(InMemoryCluster::new())
        }
    };

    Ok(cluster)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", AgePlaneConfig::generate_sample());
        return Ok(());
    }

    let mut config = AgePlaneConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(key) = args.api_key {
        config.auth.api_key = key;
    }
    if args.debug {
        config.logging.level = "debug".to_string();
    }
    config.validate()?;

    let _log_guard = config
        .logging
        .init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Configuration loaded successfully");
    if !config.auth.enabled() {
        warn!("No API key configured; /api/v1 is unauthenticated");
    }

    let cluster = connect_cluster(&config).await?;
    info!(backend = cluster.backend(), "Cluster client ready");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, cluster));

    // Periodically drop idle rate-limit buckets
    let limiter = state.rate_limiter.clone();
    let shutdown = ShutdownCoordinator::new();
    let mut stop = shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(300));
        loop {
            tokio::select! {
                _ = ticker.tick() => limiter.cleanup().await,
                _ = stop.changed() => break,
            }
        }
    });

    let app = build_router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("AgePlane API listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone().signal())
    .await?;

    shutdown.shutdown();
    info!("Server stopped");

    Ok(())
}
