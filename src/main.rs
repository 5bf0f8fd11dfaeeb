//! CLI entry point (§6): `producer` brings up HTTP only, `consumer` brings
//! up scheduler + watcher + dispatcher workers, `both` runs everything.
//! Exit 0 on clean shutdown, 1 on fatal init error.

use std::sync::Arc;

use abathur::adapters::sqlite::{
    initialize_database, CronScheduleStore, SqliteEventStore, SqliteNamespaceRepository,
    SqliteQueueRepository, SqliteTaskRepository, SqliteTokenBucketRepository,
};
use abathur::domain::ports::{FakeClusterGateway, FakeJobWatcher};
use abathur::http::{build_router, AppState};
use abathur::infrastructure::logging::LoggerImpl;
use abathur::services::config::Config;
use abathur::services::dispatcher::{Dispatcher, DispatcherConfig};
use abathur::services::handlers::{HandlerContext, HandlerRegistry};
use abathur::services::namespace_monitor::{NamespaceMonitor, NamespaceMonitorConfig};
use abathur::services::queue_service::QueueService;
use abathur::services::scheduler::{Scheduler, SchedulerConfig};
use abathur::services::token_bucket_service::{TokenBucketConfig, TokenBucketService};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "orchestrator", about = "Task orchestration core for chaos-engineering experiments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// HTTP port to bind (overrides config and ORCHESTRATOR_HTTP_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "orchestrator.toml")]
    conf: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring up the HTTP surface only (SubmitTask, StreamTrace).
    Producer,
    /// Bring up the scheduler, job watcher, and dispatcher workers only.
    Consumer,
    /// Run everything in one process.
    Both,
}

#[tokio::main]
async fn main() -> Result<()> {
    match run().await {
        Ok(()) => Ok(()),
        Err(err) => {
            eprintln!("fatal: {err:#}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if std::path::Path::new(&cli.conf).exists() {
        Config::from_file(&cli.conf).context("failed to load configuration")?
    } else {
        Config::load().context("failed to load configuration")?
    };
    if let Some(port) = cli.port {
        config.http.port = port;
    }
    let config = Arc::new(config);

    let _logger = LoggerImpl::init(&config.logging).context("failed to initialize logging")?;

    let database_url = format!("sqlite:{}", config.database.path);
    let pool = initialize_database(&database_url).await.context("failed to initialize database")?;

    let tasks = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let queue_repo = Arc::new(SqliteQueueRepository::new(pool.clone()));
    let namespaces_repo = Arc::new(SqliteNamespaceRepository::new(pool.clone()));
    let tokens_repo = Arc::new(SqliteTokenBucketRepository::new(pool.clone()));
    let events: Arc<dyn abathur::services::event_store::EventStore> = Arc::new(SqliteEventStore::new(pool.clone()));
    let schedules = Arc::new(CronScheduleStore::new(pool.clone()));

    let queue_service = Arc::new(QueueService::new(tasks.clone(), queue_repo.clone()));
    let namespaces = Arc::new(NamespaceMonitor::new(namespaces_repo, NamespaceMonitorConfig::default()));
    let tokens = Arc::new(TokenBucketService::new(
        tokens_repo,
        TokenBucketConfig {
            ttl: std::time::Duration::from_secs(config.rate_limiting.token_wait_timeout_secs),
            ..TokenBucketConfig::default()
        },
    ));

    let cluster: Arc<dyn abathur::domain::ports::ClusterGateway> = Arc::new(FakeClusterGateway::new());
    let jobs: Arc<dyn abathur::domain::ports::JobWatcher> = Arc::new(FakeJobWatcher::new());

    let ctx = Arc::new(HandlerContext {
        queue: queue_service.clone(),
        events: events.clone(),
        tokens,
        namespaces,
        cluster,
        jobs,
        schedules,
        config: config.clone(),
    });
    let registry = Arc::new(HandlerRegistry::default());

    let shutdown = CancellationToken::new();

    let mut tasks_to_join: Vec<tokio::task::JoinHandle<anyhow::Result<()>>> = Vec::new();

    if matches!(cli.command, Commands::Producer | Commands::Both) {
        let state = Arc::new(AppState { queue: queue_service.clone(), events: events.clone() });
        let router = build_router(state);
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.http.port));
        let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind HTTP listener")?;
        tracing::info!(%addr, "HTTP surface listening");
        let http_shutdown = shutdown.clone();
        tasks_to_join.push(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
                .await
                .map_err(anyhow::Error::from)
        }));
    }

    if matches!(cli.command, Commands::Consumer | Commands::Both) {
        let scheduler = Arc::new(Scheduler::new(queue_repo.clone(), SchedulerConfig::default()));
        let dispatcher = Arc::new(Dispatcher::new(
            tasks,
            queue_repo,
            registry,
            ctx,
            DispatcherConfig {
                workers: config.queue.workers,
                ..DispatcherConfig::default()
            },
        ));

        let reconciled = dispatcher.reconcile().await.context("crash-recovery reconciliation failed")?;
        if reconciled > 0 {
            tracing::info!(reconciled, "reconciled tasks stranded by a prior crash");
        }

        let scheduler_shutdown = shutdown.clone();
        tasks_to_join.push(tokio::spawn(async move {
            scheduler.run(scheduler_shutdown).await;
            Ok(())
        }));

        let dispatcher_shutdown = shutdown.clone();
        tasks_to_join.push(tokio::spawn(async move {
            dispatcher.run(dispatcher_shutdown).await;
            Ok(())
        }));
    }

    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining");
    shutdown.cancel();

    for handle in tasks_to_join {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "component task panicked during shutdown");
        }
    }

    tracing::info!("clean shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
}
