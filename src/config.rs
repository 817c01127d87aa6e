//! Environment-driven configuration (`MDT_*` variables).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Config {
    pub grpc_listen_addr: SocketAddr,
    pub http_listen_addr: SocketAddr,
    pub metadb_host: String,
    pub metadb_username: String,
    pub metadb_password: String,
    pub metadb_database_name: String,
    pub metadb_ssl_root_cert: Option<String>,
    pub metadb_max_pool_size: u32,
    pub query_timeout: Duration,
    pub kv_host: String,
    pub kv_password: String,
    pub flow_sample_modulus: u32,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_grpc_port")]
    grpc_listen_port: u16,
    #[serde(default = "default_http_port")]
    http_listen_port: u16,
    metadb_host: String,
    metadb_username: String,
    metadb_password: String,
    metadb_database_name: String,
    #[serde(default)]
    metadb_ssl_root_cert: Option<String>,
    #[serde(default = "default_pool_size")]
    metadb_max_pool_size: u32,
    #[serde(default = "default_query_timeout_secs")]
    metadb_query_timeout_secs: u64,
    kv_host: String,
    #[serde(default)]
    kv_password: String,
    #[serde(default = "default_flow_sample_modulus")]
    flow_sample_modulus: u32,
}

const fn default_grpc_port() -> u16 {
    50051
}

const fn default_http_port() -> u16 {
    2112
}

const fn default_pool_size() -> u32 {
    50
}

const fn default_query_timeout_secs() -> u64 {
    10
}

const fn default_flow_sample_modulus() -> u32 {
    1
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig = envy::prefixed("MDT_")
            .from_env()
            .context("failed to parse MDT_* environment variables")?;

        Ok(Self {
            grpc_listen_addr: ([0, 0, 0, 0], raw.grpc_listen_port).into(),
            http_listen_addr: ([0, 0, 0, 0], raw.http_listen_port).into(),
            metadb_host: raw.metadb_host,
            metadb_username: raw.metadb_username,
            metadb_password: raw.metadb_password,
            metadb_database_name: raw.metadb_database_name,
            metadb_ssl_root_cert: raw.metadb_ssl_root_cert,
            metadb_max_pool_size: raw.metadb_max_pool_size.max(1),
            query_timeout: Duration::from_secs(raw.metadb_query_timeout_secs.max(1)),
            kv_host: raw.kv_host,
            kv_password: raw.kv_password,
            flow_sample_modulus: raw.flow_sample_modulus.max(1),
        })
    }
}
