//! Schema-directed decoders.
//!
//! One decoder per YANG encoding path. The registry is assembled once at
//! startup from the declarative table below and is immutable afterwards;
//! registering two decoders for the same path is a configuration error
//! surfaced before the dispatcher accepts streams.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::cache::Bucket;
use crate::metadb::MetaDb;
use crate::proto::telemetry::{Telemetry, TelemetryField};

pub mod convert;
pub mod extract;

mod bgp;
mod cpu;
mod eigrp;
mod flow;
mod hardware;
mod interfaces;
mod ip_sla_config;
mod ip_sla_stats;
mod license;
mod memory;
mod memory_processes;
mod ospf;
mod qos;

/// Knobs decoders read at runtime.
#[derive(Debug, Clone)]
pub struct DecodeSettings {
    /// Keep one flow record in N; 1 disables sampling.
    pub flow_sample_modulus: u32,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            flow_sample_modulus: 1,
        }
    }
}

/// Everything a decoder invocation needs. The dispatcher builds one per
/// inbound envelope and hands it to the decoder on its own task.
pub struct DecodeContext {
    pub msg: Telemetry,
    pub bucket: Arc<Bucket>,
    /// Producer timestamp, milliseconds. Every emitted sample carries this.
    pub timestamp_ms: i64,
    /// The device's self-reported node id (its management IP).
    pub node: String,
    /// Provisioned hostname from the KV store.
    pub hostname: String,
    pub metadb: Arc<MetaDb>,
    pub settings: Arc<DecodeSettings>,
}

pub type HandlerFn = fn(DecodeContext);

struct Decoder {
    encoding_path: &'static str,
    handle: HandlerFn,
}

fn decoders() -> Vec<Decoder> {
    vec![
        Decoder {
            encoding_path: cpu::ENCODING_PATH,
            handle: cpu::handle,
        },
        Decoder {
            encoding_path: memory::ENCODING_PATH,
            handle: memory::handle,
        },
        Decoder {
            encoding_path: memory_processes::ENCODING_PATH,
            handle: memory_processes::handle,
        },
        Decoder {
            encoding_path: interfaces::ENCODING_PATH,
            handle: interfaces::handle,
        },
        Decoder {
            encoding_path: bgp::ENCODING_PATH,
            handle: bgp::handle,
        },
        Decoder {
            encoding_path: ospf::ENCODING_PATH,
            handle: ospf::handle,
        },
        Decoder {
            encoding_path: eigrp::ENCODING_PATH,
            handle: eigrp::handle,
        },
        Decoder {
            encoding_path: flow::ENCODING_PATH,
            handle: flow::handle,
        },
        Decoder {
            encoding_path: hardware::ENCODING_PATH,
            handle: hardware::handle,
        },
        Decoder {
            encoding_path: license::ENCODING_PATH,
            handle: license::handle,
        },
        Decoder {
            encoding_path: ip_sla_config::ENCODING_PATH,
            handle: ip_sla_config::handle,
        },
        Decoder {
            encoding_path: ip_sla_stats::ENCODING_PATH,
            handle: ip_sla_stats::handle,
        },
    ]
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate decoder registered for schema path {0}")]
    DuplicatePath(&'static str),
}

pub struct DecoderRegistry {
    handlers: HashMap<&'static str, HandlerFn>,
}

impl DecoderRegistry {
    pub fn new() -> Result<Self, RegistryError> {
        let mut handlers = HashMap::new();
        for decoder in decoders() {
            if handlers.insert(decoder.encoding_path, decoder.handle).is_some() {
                return Err(RegistryError::DuplicatePath(decoder.encoding_path));
            }
        }
        Ok(Self { handlers })
    }

    pub fn lookup(&self, path: &str) -> Option<HandlerFn> {
        self.handlers.get(path).copied()
    }

    pub fn paths(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Top-level entries carry their key leaves in `fields[0]` and their
/// content leaves in `fields[1]`. Entries that violate the convention are
/// skipped by the caller.
pub(crate) fn entry_key_content(
    entry: &TelemetryField,
) -> Option<(&TelemetryField, &TelemetryField)> {
    match entry.fields.as_slice() {
        [key, content, ..] => Some((key, content)),
        _ => None,
    }
}

/// Catalog rows stamp the producer time in epoch seconds.
pub(crate) fn row_timestamp(timestamp_ms: i64) -> i64 {
    timestamp_ms / 1000
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::proto::telemetry::telemetry_field::ValueByType;
    use crate::proto::telemetry::{Telemetry, TelemetryField};

    pub fn container(name: &str, fields: Vec<TelemetryField>) -> TelemetryField {
        TelemetryField {
            name: name.to_string(),
            fields,
            ..Default::default()
        }
    }

    fn leaf(name: &str, value: ValueByType) -> TelemetryField {
        TelemetryField {
            name: name.to_string(),
            value_by_type: Some(value),
            ..Default::default()
        }
    }

    pub fn str_leaf(name: &str, value: &str) -> TelemetryField {
        leaf(name, ValueByType::StringValue(value.to_string()))
    }

    pub fn u32_leaf(name: &str, value: u32) -> TelemetryField {
        leaf(name, ValueByType::Uint32Value(value))
    }

    pub fn u64_leaf(name: &str, value: u64) -> TelemetryField {
        leaf(name, ValueByType::Uint64Value(value))
    }

    pub fn f64_leaf(name: &str, value: f64) -> TelemetryField {
        leaf(name, ValueByType::DoubleValue(value))
    }

    pub fn bool_leaf(name: &str, value: bool) -> TelemetryField {
        leaf(name, ValueByType::BoolValue(value))
    }

    /// One top-level entry: keys in `fields[0]`, content in `fields[1]`.
    pub fn entry(keys: Vec<TelemetryField>, content: Vec<TelemetryField>) -> TelemetryField {
        TelemetryField {
            fields: vec![container("keys", keys), container("content", content)],
            ..Default::default()
        }
    }

    pub fn envelope(
        path: &str,
        node: &str,
        msg_timestamp: u64,
        entries: Vec<TelemetryField>,
    ) -> Telemetry {
        Telemetry {
            node_id_str: node.to_string(),
            encoding_path: path.to_string(),
            msg_timestamp,
            data_gpbkv: entries,
            ..Default::default()
        }
    }
}
