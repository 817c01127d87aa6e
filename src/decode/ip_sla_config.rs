//! IP SLA configuration decoder.
//!
//! Each top-level entry is one configured SLA: the entry number keys it and
//! the content holds a single container named after the probe type
//! (icmp-echo, udp-jitter, http) carrying that probe's parameters. Entries
//! without a type container are skipped and do not count against
//! reconciliation.

use log::{error, warn};

use crate::decode::convert::{normalize_vrf, sla_tag_to_cos_dest, tos_to_dscp};
use crate::decode::extract::{leaf_f64, leaf_string};
use crate::decode::{entry_key_content, row_timestamp, DecodeContext};
use crate::metadb::IpSlaEntryRow;
use crate::proto::telemetry::{Telemetry, TelemetryField};

pub(crate) const ENCODING_PATH: &str =
    "Cisco-IOS-XE-native:native/ip/Cisco-IOS-XE-sla:sla/entry";

pub(crate) fn handle(ctx: DecodeContext) {
    let rows = record(&ctx.msg, ctx.timestamp_ms, &ctx.node);

    if rows.is_empty() {
        return;
    }

    let metadb = ctx.metadb;
    let node = ctx.node;
    tokio::spawn(async move {
        if let Err(e) = metadb.persist_ip_sla_entries(&rows, &node).await {
            error!("failed to persist IP SLA configuration for {node}: {e}");
        }
    });
}

fn record(msg: &Telemetry, timestamp_ms: i64, node: &str) -> Vec<IpSlaEntryRow> {
    let mut rows = Vec::new();

    for entry in &msg.data_gpbkv {
        let Some((key, content)) = entry_key_content(entry) else {
            warn!("IP SLA entry from {node} has unexpected shape");
            continue;
        };
        let Some(entry_id) = key
            .fields
            .iter()
            .find(|f| f.name == "number")
            .and_then(leaf_f64)
        else {
            warn!("IP SLA entry from {node} carries no number key");
            continue;
        };

        // An entry without a probe-type container is configured but empty;
        // it is not part of the device's observable SLA set.
        let Some(probe) = content.fields.iter().find(|f| {
            matches!(f.name.as_str(), "icmp-echo" | "udp-jitter" | "http")
        }) else {
            continue;
        };

        rows.push(parse_probe(probe, entry_id as i64, node, timestamp_ms));
    }

    rows
}

fn parse_probe(
    probe: &TelemetryField,
    entry_id: i64,
    node: &str,
    timestamp_ms: i64,
) -> IpSlaEntryRow {
    let mut row = IpSlaEntryRow {
        device_id: node.to_string(),
        timestamps: row_timestamp(timestamp_ms),
        entry_id,
        destination_ip: "N/A".to_string(),
        destination_port: 0,
        source_ip: "N/A".to_string(),
        source_port: 0,
        vrf: "Global".to_string(),
        frequency: 0,
        sla_type: probe.name.clone(),
        dscp: "".to_string(),
        class_of_service: "N/A".to_string(),
        req_data_size: 0,
        http_url: "N/A".to_string(),
        http_version: "N/A".to_string(),
        http_proxy: "N/A".to_string(),
        http_dns_server: "N/A".to_string(),
        destination_host: "N/A".to_string(),
    };

    for field in &probe.fields {
        match field.name.as_str() {
            "dest-addr" => row.destination_ip = leaf_string(field).unwrap_or(row.destination_ip),
            "portno" => row.destination_port = leaf_f64(field).unwrap_or(0.0) as i64,
            "source-ip" => row.source_ip = leaf_string(field).unwrap_or(row.source_ip),
            "source-port" => row.source_port = leaf_f64(field).unwrap_or(0.0) as i64,
            "vrf" => row.vrf = normalize_vrf(&leaf_string(field).unwrap_or_default()),
            "frequency" => row.frequency = leaf_f64(field).unwrap_or(0.0) as i64,
            "tos" => row.dscp = tos_to_dscp(leaf_f64(field).unwrap_or(0.0) as i64).to_string(),
            "request-data-size" => row.req_data_size = leaf_f64(field).unwrap_or(0.0) as i64,
            "tag" => {
                let (cos, dst_host) =
                    sla_tag_to_cos_dest(&leaf_string(field).unwrap_or_default());
                row.class_of_service = cos;
                row.destination_host = dst_host;
            }
            "url" => row.http_url = leaf_string(field).unwrap_or(row.http_url),
            "version" => row.http_version = leaf_string(field).unwrap_or(row.http_version),
            "proxy" => row.http_proxy = leaf_string(field).unwrap_or(row.http_proxy),
            "name-server" => {
                row.http_dns_server = leaf_string(field).unwrap_or(row.http_dns_server)
            }
            _ => {}
        }
    }

    row
}
