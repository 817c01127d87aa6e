//! Flexible NetFlow record decoder.
//!
//! Flow labels are intrinsically high-cardinality (source x destination x
//! port). The sampling hook keeps one flow in N when configured; with the
//! default modulus of 1 every record is emitted with values identical to
//! the unsampled stream.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use log::warn;

use crate::cache::{Bucket, Descriptor, SampleKind};
use crate::decode::convert::{ip_protocol_name, tos_to_dscp};
use crate::decode::extract::{leaf_f64, leaf_string};
use crate::decode::DecodeContext;
use crate::proto::telemetry::{Telemetry, TelemetryField};

pub(crate) const ENCODING_PATH: &str =
    "Cisco-IOS-XE-flow-monitor-oper:flow-monitors/flow-monitor";

const FLOW_LABELS: &[&str] = &[
    "node",
    "source_address",
    "destination_address",
    "interface_input",
    "is_multicast",
    "vrf_id_input",
    "source_port",
    "destination_port",
    "dscp",
    "ip_protocol",
    "interface_output",
];

static FLOW_BYTES: Descriptor = Descriptor {
    name: "cisco_iosxe_flexible_netflow_record_bytes",
    help: "The number of bytes passed through the netflow record",
    labels: FLOW_LABELS,
};

static FLOW_PACKETS: Descriptor = Descriptor {
    name: "cisco_iosxe_flexible_netflow_record_packets",
    help: "The number of packets passed through the netflow record",
    labels: FLOW_LABELS,
};

#[derive(Debug)]
struct FlowRecord {
    source_address: String,
    destination_address: String,
    interface_input: String,
    is_multicast: String,
    vrf_id_input: f64,
    source_port: f64,
    destination_port: f64,
    ip_tos: String,
    ip_protocol: f64,
    interface_output: String,
    bytes: f64,
    packets: f64,
}

impl Default for FlowRecord {
    fn default() -> Self {
        Self {
            source_address: "N/A".to_string(),
            destination_address: "N/A".to_string(),
            interface_input: "N/A".to_string(),
            is_multicast: "N/A".to_string(),
            vrf_id_input: 0.0,
            source_port: 0.0,
            destination_port: 0.0,
            ip_tos: "N/A".to_string(),
            ip_protocol: 0.0,
            interface_output: "N/A".to_string(),
            bytes: 0.0,
            packets: 0.0,
        }
    }
}

pub(crate) fn handle(ctx: DecodeContext) {
    record(
        &ctx.msg,
        &ctx.bucket,
        ctx.timestamp_ms,
        &ctx.node,
        ctx.settings.flow_sample_modulus,
    );
}

fn record(
    msg: &Telemetry,
    bucket: &Bucket,
    timestamp_ms: i64,
    node: &str,
    sample_modulus: u32,
) {
    let Some(monitor) = msg.data_gpbkv.first() else {
        return;
    };

    for cache_entry in &monitor.fields {
        for field in &cache_entry.fields {
            if field.name != "flow" {
                continue;
            }

            let flow = parse_flow(&field.fields);
            if !keep_flow(&flow, sample_modulus) {
                continue;
            }
            emit(&flow, bucket, node, timestamp_ms);
        }
    }
}

fn parse_flow(fields: &[TelemetryField]) -> FlowRecord {
    let mut flow = FlowRecord::default();

    for field in fields {
        match field.name.as_str() {
            "source-address" => {
                flow.source_address = leaf_string(field).unwrap_or(flow.source_address)
            }
            "destination-address" => {
                flow.destination_address =
                    leaf_string(field).unwrap_or(flow.destination_address)
            }
            "interface-input" => {
                flow.interface_input = leaf_string(field).unwrap_or(flow.interface_input)
            }
            "is-multicast" => {
                flow.is_multicast = leaf_string(field).unwrap_or(flow.is_multicast)
            }
            "vrf-id-input" => flow.vrf_id_input = leaf_f64(field).unwrap_or(0.0),
            "source-port" => flow.source_port = leaf_f64(field).unwrap_or(0.0),
            "destination-port" => flow.destination_port = leaf_f64(field).unwrap_or(0.0),
            "ip-tos" => flow.ip_tos = leaf_string(field).unwrap_or(flow.ip_tos),
            "ip-protocol" => flow.ip_protocol = leaf_f64(field).unwrap_or(0.0),
            "interface-output" => {
                flow.interface_output = leaf_string(field).unwrap_or(flow.interface_output)
            }
            "bytes" => flow.bytes = leaf_f64(field).unwrap_or(0.0),
            "packets" => flow.packets = leaf_f64(field).unwrap_or(0.0),
            _ => {}
        }
    }

    flow
}

/// Deterministic 1-in-N admission over the flow identity labels.
fn keep_flow(flow: &FlowRecord, sample_modulus: u32) -> bool {
    if sample_modulus <= 1 {
        return true;
    }

    let mut hasher = DefaultHasher::new();
    flow.source_address.hash(&mut hasher);
    flow.destination_address.hash(&mut hasher);
    (flow.source_port as u64).hash(&mut hasher);
    (flow.destination_port as u64).hash(&mut hasher);
    (flow.ip_protocol as u64).hash(&mut hasher);
    hasher.finish() % u64::from(sample_modulus) == 0
}

fn emit(flow: &FlowRecord, bucket: &Bucket, node: &str, timestamp_ms: i64) {
    // The ToS leaf arrives as a hex string such as "0xB8".
    let tos_hex = flow.ip_tos.replace("0x", "");
    let tos = i64::from_str_radix(&tos_hex, 16).unwrap_or_else(|_| {
        if flow.ip_tos != "N/A" {
            warn!("flow record from {node} carries unparsable ToS {:?}", flow.ip_tos);
        }
        0
    });

    let labels = vec![
        node.to_string(),
        flow.source_address.clone(),
        flow.destination_address.clone(),
        flow.interface_input.clone(),
        flow.is_multicast.clone(),
        format!("{:.0}", flow.vrf_id_input),
        format!("{:.0}", flow.source_port),
        format!("{:.0}", flow.destination_port),
        tos_to_dscp(tos).to_string(),
        ip_protocol_name(flow.ip_protocol),
        flow.interface_output.clone(),
    ];

    bucket.record(
        &FLOW_BYTES,
        SampleKind::Counter,
        flow.bytes,
        labels.clone(),
        timestamp_ms,
    );
    bucket.record(
        &FLOW_PACKETS,
        SampleKind::Counter,
        flow.packets,
        labels,
        timestamp_ms,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::testutil::{container, envelope, str_leaf, u32_leaf, u64_leaf};
    use crate::proto::telemetry::TelemetryField;

    fn flow_container(src: &str, dst: &str, bytes: u64) -> TelemetryField {
        container(
            "flow",
            vec![
                str_leaf("source-address", src),
                str_leaf("destination-address", dst),
                str_leaf("interface-input", "GigabitEthernet1"),
                str_leaf("is-multicast", "false"),
                u32_leaf("vrf-id-input", 0),
                u32_leaf("source-port", 49152),
                u32_leaf("destination-port", 443),
                str_leaf("ip-tos", "0xB8"),
                u32_leaf("ip-protocol", 6),
                str_leaf("interface-output", "GigabitEthernet2"),
                u64_leaf("bytes", bytes),
                u64_leaf("packets", 17),
            ],
        )
    }

    fn flow_envelope(flows: Vec<TelemetryField>) -> Telemetry {
        envelope(
            ENCODING_PATH,
            "10.0.0.1",
            1_700_000_000_000,
            vec![TelemetryField {
                fields: vec![container("flows", flows)],
                ..Default::default()
            }],
        )
    }

    #[test]
    fn flow_record_counters_with_dscp_class() {
        let msg = flow_envelope(vec![flow_container("192.168.1.10", "10.10.10.10", 4096)]);

        let bucket = Bucket::default();
        record(&msg, &bucket, 1_700_000_000_000, "10.0.0.1", 1);

        let samples = bucket.samples();
        assert_eq!(samples.len(), 2);

        let bytes = samples
            .iter()
            .find(|s| s.desc.name == "cisco_iosxe_flexible_netflow_record_bytes")
            .unwrap();
        assert_eq!(bytes.value, 4096.0);
        assert_eq!(bytes.kind, SampleKind::Counter);
        // ToS 0xB8 >> 2 == 46 == EF.
        assert_eq!(bytes.labels[8], "EF");
        assert_eq!(bytes.labels[9], "tcp");
        assert_eq!(bytes.labels[6], "49152");

        let packets = samples
            .iter()
            .find(|s| s.desc.name == "cisco_iosxe_flexible_netflow_record_packets")
            .unwrap();
        assert_eq!(packets.value, 17.0);
    }

    #[test]
    fn modulus_one_keeps_every_flow() {
        let flows = (0..16)
            .map(|i| flow_container(&format!("192.168.1.{i}"), "10.0.0.9", 100))
            .collect();
        let msg = flow_envelope(flows);

        let bucket = Bucket::default();
        record(&msg, &bucket, 1, "10.0.0.1", 1);
        assert_eq!(bucket.samples().len(), 32);
    }

    #[test]
    fn sampling_thins_the_record_stream() {
        let flows: Vec<TelemetryField> = (0..64)
            .map(|i| flow_container(&format!("192.168.{}.{}", i / 8, i % 8), "10.0.0.9", 100))
            .collect();
        let msg = flow_envelope(flows);

        let bucket = Bucket::default();
        record(&msg, &bucket, 1, "10.0.0.1", 4);
        // Deterministic hash admission: strictly fewer than all, and the
        // same subset on a second pass.
        let first = bucket.samples().len();
        assert!(first < 128);

        let again = Bucket::default();
        record(&msg, &again, 1, "10.0.0.1", 4);
        assert_eq!(again.samples().len(), first);
    }

    #[test]
    fn missing_leaves_fall_back_to_defaults() {
        let msg = flow_envelope(vec![container("flow", vec![u64_leaf("bytes", 9)])]);

        let bucket = Bucket::default();
        record(&msg, &bucket, 1, "10.0.0.1", 1);

        let bytes = bucket.samples().remove(0);
        assert_eq!(bytes.labels[1], "N/A");
        assert_eq!(bytes.labels[8], "");
        assert_eq!(bytes.labels[9], "0");
    }
}
