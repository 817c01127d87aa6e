//! Device provisioning lookups against the external KV store.
//!
//! Each provisioned device is a hash keyed by its management IP with a
//! `hostname` field. A stream from a node whose IP has no hash entry is
//! rejected by the dispatcher.

use std::collections::HashMap;

use redis::AsyncCommands;
use thiserror::Error;

use crate::config::Config;

const HOSTNAME_FIELD: &str = "hostname";

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("device {0} is not provisioned in the kv store")]
    NotProvisioned(String),
}

#[derive(Clone)]
pub struct KvStore {
    client: redis::Client,
}

impl KvStore {
    pub fn connect(cfg: &Config) -> Result<Self, KvError> {
        let url = if cfg.kv_password.is_empty() {
            format!("redis://{}:6379/", cfg.kv_host)
        } else {
            format!("redis://:{}@{}:6379/", cfg.kv_password, cfg.kv_host)
        };

        let client = redis::Client::open(url)?;
        Ok(Self { client })
    }

    /// Returns the provisioned hostname for a device IP, or
    /// `KvError::NotProvisioned` when the hash is missing or carries no
    /// hostname field.
    pub async fn lookup_hostname(&self, ip: &str) -> Result<String, KvError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let entry: HashMap<String, String> = conn.hgetall(ip).await?;

        entry
            .get(HOSTNAME_FIELD)
            .cloned()
            .ok_or_else(|| KvError::NotProvisioned(ip.to_string()))
    }

    /// Registers (or overwrites) the hostname for a device IP.
    pub async fn register_host(&self, ip: &str, hostname: &str) -> Result<(), KvError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.hset(ip, HOSTNAME_FIELD, hostname).await?;
        Ok(())
    }
}
