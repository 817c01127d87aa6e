//! Telemetry metadata catalog (Postgres).
//!
//! Every writer here reconciles a device's current view: the observed rows
//! are upserted in one batch, then catalog rows for the same device whose
//! keys were not observed are deleted. A concurrent reader may briefly see
//! a superset of the device's rows, never a subset.

use std::fs::File;
use std::future::Future;
use std::io::BufReader;
use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use log::{error, info};
use rustls::{ClientConfig, RootCertStore};
use thiserror::Error;
use tokio_postgres::{Config as PgConfig, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;

use crate::config::Config;

pub mod bgp;
pub mod hardware;
pub mod interfaces;
pub mod ip_sla;
pub mod license;
pub mod processes;

pub use bgp::{BgpAfiRow, BgpNeighborRow};
pub use hardware::{HwInventoryRow, SystemDataRow};
pub use interfaces::InterfaceRow;
pub use ip_sla::IpSlaEntryRow;
pub use license::LicenseRow;
pub use processes::{CpuProcessRow, MemProcessRow};

pub type PgPool = Pool<PgConnectionManager>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("connection pool error: {0}")]
    Pool(String),

    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),

    #[error("query deadline exceeded")]
    Timeout,

    #[error("failed to load TLS root certificates: {0}")]
    Tls(String),
}

impl From<bb8::RunError<tokio_postgres::Error>> for DbError {
    fn from(err: bb8::RunError<tokio_postgres::Error>) -> Self {
        match err {
            bb8::RunError::User(e) => DbError::Postgres(e),
            bb8::RunError::TimedOut => DbError::Pool("checkout timed out".to_string()),
        }
    }
}

pub struct MetaDb {
    pool: PgPool,
    query_timeout: Duration,
}

impl MetaDb {
    pub async fn connect(cfg: &Config) -> Result<Self, DbError> {
        let mut pg = PgConfig::new();
        pg.host(&cfg.metadb_host)
            .user(&cfg.metadb_username)
            .password(&cfg.metadb_password)
            .dbname(&cfg.metadb_database_name)
            .connect_timeout(Duration::from_secs(10))
            .keepalives_idle(Duration::from_secs(30));

        let tls = match cfg.metadb_ssl_root_cert.as_deref() {
            Some(path) => PgTls::Rustls(build_tls_connector(path)?),
            None => PgTls::None,
        };

        let manager = PgConnectionManager { config: pg, tls };
        let pool = Pool::builder()
            .max_size(cfg.metadb_max_pool_size)
            .build(manager)
            .await
            .map_err(DbError::Postgres)?;

        let db = Self {
            pool,
            query_timeout: cfg.query_timeout,
        };

        // Fail fast if credentials are wrong, and log the server banner.
        let version = db.server_version().await?;
        info!("metadata database connected: {version}");

        Ok(db)
    }

    async fn server_version(&self) -> Result<String, DbError> {
        let conn = self.conn().await?;
        let row = self
            .deadline(conn.query_one("SELECT version()", &[]))
            .await?;
        Ok(row.get(0))
    }

    pub(crate) async fn conn(
        &self,
    ) -> Result<PooledConnection<'_, PgConnectionManager>, DbError> {
        Ok(self.pool.get().await?)
    }

    /// Applies the catalog's short query deadline to one database
    /// round-trip.
    pub(crate) async fn deadline<T>(
        &self,
        fut: impl Future<Output = Result<T, tokio_postgres::Error>>,
    ) -> Result<T, DbError> {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(DbError::Timeout),
        }
    }
}

/// Keys present in the catalog but absent from the device's current report.
/// These rows belong to decommissioned entities and get deleted.
pub(crate) fn stale_keys<K: PartialEq>(existing: Vec<K>, observed: &[K]) -> Vec<K> {
    existing
        .into_iter()
        .filter(|key| !observed.contains(key))
        .collect()
}

#[derive(Clone)]
pub struct PgConnectionManager {
    config: PgConfig,
    tls: PgTls,
}

#[derive(Clone)]
enum PgTls {
    None,
    Rustls(MakeRustlsConnect),
}

#[async_trait]
impl bb8::ManageConnection for PgConnectionManager {
    type Connection = tokio_postgres::Client;
    type Error = tokio_postgres::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        match &self.tls {
            PgTls::None => {
                let (client, connection) = self.config.connect(NoTls).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("metadata database connection error: {e}");
                    }
                });
                Ok(client)
            }
            PgTls::Rustls(connector) => {
                let (client, connection) = self.config.connect(connector.clone()).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("metadata database connection error: {e}");
                    }
                });
                Ok(client)
            }
        }
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await.map(|_| ())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}

fn build_tls_connector(root_cert_path: &str) -> Result<MakeRustlsConnect, DbError> {
    let file = File::open(root_cert_path)
        .map_err(|e| DbError::Tls(format!("{root_cert_path}: {e}")))?;
    let mut reader = BufReader::new(file);

    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|e| DbError::Tls(format!("{root_cert_path}: {e}")))?;
        roots
            .add(cert)
            .map_err(|e| DbError::Tls(e.to_string()))?;
    }

    if roots.is_empty() {
        return Err(DbError::Tls(format!(
            "{root_cert_path} contains no certificates"
        )));
    }

    let tls_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(MakeRustlsConnect::new(tls_config))
}
