//! Streaming telemetry collector for Cisco IOS-XE devices.
//!
//! Devices open a long-lived MDT dial-out gRPC stream and push kvGPB
//! telemetry envelopes. Each envelope is bound to a decoder by its YANG
//! encoding path; decoders emit scrape-ready Prometheus samples into the
//! per-(node, path) sample cache and reconcile metadata rows against the
//! Postgres catalog. A pull-based HTTP endpoint serves the cache.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::sync::{oneshot, watch};
use tonic::transport::Server;

pub mod cache;
pub mod config;
pub mod decode;
pub mod dispatch;
pub mod http;
pub mod kvstore;
pub mod metadb;

pub mod proto {
    pub mod telemetry {
        tonic::include_proto!("telemetry");
    }

    pub mod mdt_dialout {
        tonic::include_proto!("mdt_dialout");
    }
}

use crate::cache::SampleCache;
use crate::config::Config;
use crate::decode::{DecodeSettings, DecoderRegistry};
use crate::dispatch::DialoutService;
use crate::kvstore::KvStore;
use crate::metadb::MetaDb;
use crate::proto::mdt_dialout::g_rpc_mdt_dialout_server::GRpcMdtDialoutServer;

/// How long in-flight scrape requests get to finish once shutdown starts.
const HTTP_DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn run() -> Result<()> {
    let cfg = Config::from_env()?;

    let metadb = Arc::new(MetaDb::connect(&cfg).await?);
    let kv = KvStore::connect(&cfg)?;
    let registry = DecoderRegistry::new().context("failed to build decoder registry")?;
    let cache = Arc::new(SampleCache::new());
    let settings = Arc::new(DecodeSettings {
        flow_sample_modulus: cfg.flow_sample_modulus,
    });

    let (http_shutdown_tx, http_shutdown_rx) = watch::channel(false);
    let http_addr = cfg.http_listen_addr;
    let http_task = tokio::spawn(http::serve(
        http_addr,
        Arc::clone(&cache),
        kv.clone(),
        http_shutdown_rx,
    ));

    let service = DialoutService::new(
        Arc::clone(&cache),
        registry,
        kv,
        Arc::clone(&metadb),
        settings,
    );

    let (grpc_shutdown_tx, grpc_shutdown_rx) = oneshot::channel::<()>();
    let grpc_addr = cfg.grpc_listen_addr;
    let grpc_task = tokio::spawn(async move {
        Server::builder()
            .http2_keepalive_interval(Some(Duration::from_secs(30)))
            .http2_keepalive_timeout(Some(Duration::from_secs(60)))
            .tcp_keepalive(Some(Duration::from_secs(300)))
            .add_service(GRpcMdtDialoutServer::new(service))
            .serve_with_shutdown(grpc_addr, async {
                let _ = grpc_shutdown_rx.await;
            })
            .await
    });

    info!("telemetry dial-out collector listening on {grpc_addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for interrupt signal")?;
    warn!("interrupt received, shutting down collector...");

    // Drain the scrape endpoint first so a scrape in flight sees a complete
    // exposition, then stop the stream transport.
    let _ = http_shutdown_tx.send(true);
    match tokio::time::timeout(HTTP_DRAIN_TIMEOUT, http_task).await {
        Ok(Ok(Err(e))) => warn!("scrape endpoint exited with error: {e}"),
        Ok(Err(e)) => warn!("scrape endpoint task failed: {e}"),
        Ok(Ok(Ok(()))) => {}
        Err(_) => warn!("scrape endpoint did not drain before deadline"),
    }

    let _ = grpc_shutdown_tx.send(());
    grpc_task
        .await
        .context("dial-out server task failed")?
        .context("dial-out server error")?;

    Ok(())
}
