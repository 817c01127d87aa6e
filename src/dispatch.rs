//! MDT dial-out stream dispatcher.
//!
//! One session loop per device stream: identify the peer, decode each
//! envelope, gate on KV provisioning, install the source's cache slot and
//! hand the envelope to its decoder on a separate task so database latency
//! never backpressures the read loop. Terminal states (clean EOF or any
//! failure) drop every cache slot the session installed.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use log::{error, info, warn};
use prost::Message;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::cache::{SampleCache, SourceKey};
use crate::decode::{DecodeContext, DecodeSettings, DecoderRegistry};
use crate::kvstore::KvStore;
use crate::metadb::MetaDb;
use crate::proto::mdt_dialout::g_rpc_mdt_dialout_server::GRpcMdtDialout;
use crate::proto::mdt_dialout::MdtDialoutArgs;
use crate::proto::telemetry::telemetry_field::ValueByType;
use crate::proto::telemetry::{Telemetry, TelemetryField};

/// Envelopes for unsupported schema paths are kept around for decoder
/// development.
const UNKNOWN_ENVELOPE_DUMP: &str = "unknown_envelope.json";

pub struct DialoutService {
    shared: Arc<Shared>,
}

struct Shared {
    cache: Arc<SampleCache>,
    registry: DecoderRegistry,
    kv: KvStore,
    metadb: Arc<MetaDb>,
    settings: Arc<DecodeSettings>,
}

impl DialoutService {
    pub fn new(
        cache: Arc<SampleCache>,
        registry: DecoderRegistry,
        kv: KvStore,
        metadb: Arc<MetaDb>,
        settings: Arc<DecodeSettings>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                cache,
                registry,
                kv,
                metadb,
                settings,
            }),
        }
    }
}

#[tonic::async_trait]
impl GRpcMdtDialout for DialoutService {
    type MdtDialoutStream = ReceiverStream<Result<MdtDialoutArgs, Status>>;

    async fn mdt_dialout(
        &self,
        request: Request<Streaming<MdtDialoutArgs>>,
    ) -> Result<Response<Self::MdtDialoutStream>, Status> {
        let peer = request
            .remote_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        info!("client socket {peer} sending telemetry stream");

        let stream = request.into_inner();
        let (tx, rx) = mpsc::channel(4);
        let shared = Arc::clone(&self.shared);

        tokio::spawn(async move {
            let mut observed: HashSet<SourceKey> = HashSet::new();
            let outcome = session_loop(&shared, stream, &peer, &mut observed).await;

            // Both terminal states surrender the session's cache slots.
            for key in &observed {
                shared.cache.remove(key);
            }

            match outcome {
                Ok(()) => info!("telemetry stream from {peer} closed"),
                Err(status) => {
                    let _ = tx.send(Err(status)).await;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

async fn session_loop(
    shared: &Shared,
    mut stream: Streaming<MdtDialoutArgs>,
    peer: &str,
    observed: &mut HashSet<SourceKey>,
) -> Result<(), Status> {
    // Log the subscription once per session to avoid flooding the log.
    let mut logged_subscription = false;

    loop {
        let frame = match stream.message().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!("error while reading client {peer} stream: {e}");
                return Err(Status::aborted("reading stream failed, disconnecting now"));
            }
        };

        let msg = Telemetry::decode(frame.data.as_slice()).map_err(|e| {
            error!("error while decoding telemetry envelope from {peer}: {e}");
            Status::internal("unable to decode telemetry envelope")
        })?;

        let node = msg.node_id_str.clone();
        let path = msg.encoding_path.clone();

        if !logged_subscription {
            info!("telemetry subscription received: client {peer}, node {node}, path {path}");
            logged_subscription = true;
        }

        if node.parse::<IpAddr>().is_err() {
            error!("node id {node} from {peer} is not a valid IP address");
            return Err(Status::invalid_argument(format!(
                "unable to decode value {node} as a valid IP address"
            )));
        }

        let hostname = match shared.kv.lookup_hostname(&node).await {
            Ok(hostname) => hostname,
            Err(e) => {
                error!("unable to verify device {node} in the kv store: {e}");
                return Err(Status::invalid_argument(format!(
                    "unable to verify device {node} in the kv store"
                )));
            }
        };

        // Replace the slot on every message so stale samples never outlive
        // their producing observation.
        let key = SourceKey::new(node.clone(), path.clone());
        let bucket = shared.cache.install(key.clone());
        observed.insert(key);

        let Some(handler) = shared.registry.lookup(&path) else {
            dump_unknown_envelope(&msg).await;
            error!(
                "telemetry from client {peer} (node {node}) for unsupported schema path {path}"
            );
            return Err(Status::invalid_argument(format!(
                "schema path {path} telemetry subscription not supported"
            )));
        };

        let ctx = DecodeContext {
            timestamp_ms: msg.msg_timestamp as i64,
            node,
            hostname,
            msg,
            bucket,
            metadb: Arc::clone(&shared.metadb),
            settings: Arc::clone(&shared.settings),
        };

        // The decoder runs on its own task; the read loop stays drained.
        tokio::spawn(async move {
            handler(ctx);
        });
    }
}

async fn dump_unknown_envelope(msg: &Telemetry) {
    let rendered = telemetry_to_json(msg);
    match serde_json::to_vec_pretty(&rendered) {
        Ok(body) => {
            if let Err(e) = tokio::fs::write(UNKNOWN_ENVELOPE_DUMP, body).await {
                warn!("failed to write {UNKNOWN_ENVELOPE_DUMP}: {e}");
            }
        }
        Err(e) => warn!("failed to render unknown envelope as JSON: {e}"),
    }
}

/// Renders the kvGPB tree as JSON for offline inspection.
pub(crate) fn telemetry_to_json(msg: &Telemetry) -> Value {
    json!({
        "node_id_str": msg.node_id_str,
        "subscription_id_str": msg.subscription_id_str,
        "encoding_path": msg.encoding_path,
        "msg_timestamp": msg.msg_timestamp,
        "data_gpbkv": msg.data_gpbkv.iter().map(field_to_json).collect::<Vec<_>>(),
    })
}

fn field_to_json(field: &TelemetryField) -> Value {
    let value = match &field.value_by_type {
        Some(ValueByType::BytesValue(v)) => json!(v),
        Some(ValueByType::StringValue(v)) => json!(v),
        Some(ValueByType::BoolValue(v)) => json!(v),
        Some(ValueByType::Uint32Value(v)) => json!(v),
        Some(ValueByType::Uint64Value(v)) => json!(v),
        Some(ValueByType::Sint32Value(v)) => json!(v),
        Some(ValueByType::Sint64Value(v)) => json!(v),
        Some(ValueByType::DoubleValue(v)) => json!(v),
        Some(ValueByType::FloatValue(v)) => json!(v),
        None => Value::Null,
    };

    json!({
        "name": field.name,
        "value": value,
        "fields": field.fields.iter().map(field_to_json).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::testutil::{entry, envelope, u32_leaf};

    #[test]
    fn envelope_renders_as_json_tree() {
        let msg = envelope(
            "Cisco-IOS-XE-process-cpu-oper:cpu-usage/cpu-utilization",
            "10.0.0.1",
            1_700_000_000_000,
            vec![entry(vec![], vec![u32_leaf("five-seconds", 7)])],
        );

        let rendered = telemetry_to_json(&msg);
        assert_eq!(rendered["node_id_str"], "10.0.0.1");
        assert_eq!(
            rendered["encoding_path"],
            "Cisco-IOS-XE-process-cpu-oper:cpu-usage/cpu-utilization"
        );
        let leaf = &rendered["data_gpbkv"][0]["fields"][1]["fields"][0];
        assert_eq!(leaf["name"], "five-seconds");
        assert_eq!(leaf["value"], 7);
    }
}
