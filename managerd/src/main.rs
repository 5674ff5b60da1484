//! Process entry point: loads configuration, wires the metadata store,
//! datastore, message bus and HTTP façade together, and runs until a
//! shutdown signal arrives. Modeled on `drmemd::main`'s `init_app`/
//! `run`/`wrap_task` split.

mod config;
mod coordinator;
mod http;
mod recorder;
mod ttl;

use axum::Router;
use manager_api::{Error, Result};
use manager_bus::{LocalBus, ManagerClient, ManagerService, MessageBus};
use manager_datastore::{Executor, InfluxDbConfig, InfluxDbExecutor, TDengineConfig, TDengineExecutor, TimeSeriesStore};
use manager_metastore::{FileMetaStore, MetaStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// Determines the configuration and installs the logger. Returns
/// `None` when the program should exit immediately (e.g. `--print-
/// config` was given).
async fn init_app() -> Option<config::Config> {
    if let Some(cfg) = config::get().await {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(cfg.get_log_level())
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber).expect("unable to set global default subscriber");
        Some(cfg)
    } else {
        None
    }
}

async fn build_metastore(cfg: &config::MetaStoreConfig) -> Result<Arc<dyn MetaStore>> {
    match cfg {
        config::MetaStoreConfig::File { root } => Ok(Arc::new(FileMetaStore::open(root.clone()).await?)),
    }
}

async fn build_datastore(cfg: &config::DataStoreConfig) -> Result<TimeSeriesStore> {
    let (executor, batch_size): (Arc<dyn Executor>, usize) = match cfg {
        config::DataStoreConfig::Influxdb {
            database,
            batch_size,
            url,
            username,
            password,
            timeout_secs,
        } => {
            let executor = InfluxDbExecutor::new(InfluxDbConfig {
                url: url.clone(),
                database: database.clone(),
                username: username.clone(),
                password: password.clone(),
                timeout: Duration::from_secs(*timeout_secs),
            })?;
            (Arc::new(executor), *batch_size)
        }
        config::DataStoreConfig::Tdengine {
            database,
            batch_size,
            url,
            username,
            password,
            timeout_secs,
        } => {
            let executor = TDengineExecutor::new(TDengineConfig {
                url: url.clone(),
                database: database.clone(),
                username: username.clone(),
                password: password.clone(),
                timeout: Duration::from_secs(*timeout_secs),
            })?;
            (Arc::new(executor), *batch_size)
        }
    };

    let store = TimeSeriesStore::new(executor, batch_size.max(1));
    store.connect().await?;
    store.create_db().await?;
    store.use_db().await?;
    Ok(store)
}

#[cfg(feature = "nats")]
async fn build_bus(cfg: &config::BusConfig) -> Result<Arc<dyn MessageBus>> {
    match cfg {
        config::BusConfig::Local => Ok(Arc::new(LocalBus::new())),
        config::BusConfig::Nats { url } => {
            let bus = manager_bus::NatsBus::connect(url.as_str()).await?;
            Ok(Arc::new(bus))
        }
    }
}

#[cfg(not(feature = "nats"))]
async fn build_bus(cfg: &config::BusConfig) -> Result<Arc<dyn MessageBus>> {
    match cfg {
        config::BusConfig::Local => Ok(Arc::new(LocalBus::new())),
        config::BusConfig::Nats { .. } => Err(Error::internal("this build was compiled without the `nats` feature")),
    }
}

async fn wrap_task(handle: JoinHandle<()>) {
    match handle.await {
        Ok(()) => (),
        Err(e) if e.is_panic() => error!("task terminated due to panic"),
        Err(_) => warn!("task terminated due to cancellation"),
    }
}

async fn run() -> Result<()> {
    let Some(cfg) = init_app().await else {
        return Ok(());
    };

    let metastore = build_metastore(&cfg.metastore).await?;
    let datastore = Arc::new(build_datastore(&cfg.datastore).await?);
    let bus = build_bus(&cfg.bus).await?;

    let client = ManagerClient::new(bus.clone());
    let service = ManagerService::new(bus.clone());
    let root = CancellationToken::new();

    let coordinator = coordinator::Coordinator::new(metastore, datastore, bus, client, service, root.clone());

    info!("starting driver monitor");
    let monitor = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            if let Err(e) = coordinator.run_driver_monitor().await {
                error!(error = %e, "driver monitor exited");
            }
        }
        .instrument(info_span!("driver_monitor"))
    });

    let addr = format!("0.0.0.0:{}", cfg.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::internal(format!("binding http listener on {addr}: {e}")))?;

    info!(addr = %addr, "starting http server");
    let server = tokio::spawn({
        let coordinator = coordinator.clone();
        let shutdown = root.clone();
        async move {
            let app = Router::new().nest("/api/v1", http::router(coordinator));
            let result = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "http server exited");
            }
        }
        .instrument(info_span!("http_server"))
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        _ = root.cancelled() => {}
    }

    root.cancel();
    wrap_task(monitor).await;
    wrap_task(server).await;

    warn!("shut down");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("ERROR: {e}");
        std::process::exit(1);
    }
}
