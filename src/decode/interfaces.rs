//! Interface statistics and attribute decoder.
//!
//! Physical interfaces carry their counters under the `statistics`
//! subtree; Ethernet sub-interfaces only expose rates under
//! `v4-protocol-stats`. Attribute leaves become one catalog row per
//! interface, and the `diffserv-info` subtree feeds the QoS class
//! decoder.

use std::net::Ipv4Addr;

use log::{error, warn};

use crate::cache::{Bucket, Descriptor, SampleKind};
use crate::decode::convert::{interface_status_to_integer, normalize_vrf};
use crate::decode::extract::{leaf_f64, leaf_string};
use crate::decode::qos;
use crate::decode::{entry_key_content, row_timestamp, DecodeContext};
use crate::metadb::InterfaceRow;
use crate::proto::telemetry::{Telemetry, TelemetryField};

pub(crate) const ENCODING_PATH: &str = "Cisco-IOS-XE-interfaces-oper:interfaces/interface";

static IN_OCTETS: Descriptor = Descriptor {
    name: "cisco_iosxe_if_stats_in_octets",
    help: "The number of inbound octets processed by the interface",
    labels: &["node", "interface"],
};

static OUT_OCTETS: Descriptor = Descriptor {
    name: "cisco_iosxe_if_stats_out_octets",
    help: "The number of outbound octets processed by the interface",
    labels: &["node", "interface"],
};

static NUM_FLAPS: Descriptor = Descriptor {
    name: "cisco_iosxe_if_stats_num_flaps",
    help: "The number of times the interface state transitioned between up and down",
    labels: &["node", "interface"],
};

static CRC_ERRORS_IN: Descriptor = Descriptor {
    name: "cisco_iosxe_if_stats_num_crc_errors",
    help: "Number of receive error events due to FCS/CRC check failure",
    labels: &["node", "interface"],
};

static OUT_DISCARD_PKTS: Descriptor = Descriptor {
    name: "cisco_iosxe_if_stats_out_discard_packets",
    help: "Number of outbound packets discarded",
    labels: &["node", "interface"],
};

static IN_DISCARD_PKTS: Descriptor = Descriptor {
    name: "cisco_iosxe_if_stats_in_discard_packets",
    help: "Number of inbound packets discarded",
    labels: &["node", "interface"],
};

static OUT_ERROR_PKTS: Descriptor = Descriptor {
    name: "cisco_iosxe_if_stats_out_error_packets",
    help: "Number of outbound packets that contained errors",
    labels: &["node", "interface"],
};

static IN_ERROR_PKTS: Descriptor = Descriptor {
    name: "cisco_iosxe_if_stats_in_error_packets",
    help: "Number of inbound packets that contained errors",
    labels: &["node", "interface"],
};

static OUT_BROADCAST_PKTS: Descriptor = Descriptor {
    name: "cisco_iosxe_if_stats_out_broadcast_packets",
    help: "Number of outbound broadcast packets processed",
    labels: &["node", "interface"],
};

static IN_BROADCAST_PKTS: Descriptor = Descriptor {
    name: "cisco_iosxe_if_stats_in_broadcast_packets",
    help: "Number of inbound broadcast packets processed",
    labels: &["node", "interface"],
};

static OUT_UNICAST_PKTS: Descriptor = Descriptor {
    name: "cisco_iosxe_if_stats_out_unicast_packets",
    help: "Number of outbound unicast packets processed",
    labels: &["node", "interface"],
};

static IN_UNICAST_PKTS: Descriptor = Descriptor {
    name: "cisco_iosxe_if_stats_in_unicast_packets",
    help: "Number of inbound unicast packets processed",
    labels: &["node", "interface"],
};

static OUT_MULTICAST_PKTS: Descriptor = Descriptor {
    name: "cisco_iosxe_if_stats_out_multicast_packets",
    help: "Number of outbound multicast packets processed",
    labels: &["node", "interface"],
};

static IN_MULTICAST_PKTS: Descriptor = Descriptor {
    name: "cisco_iosxe_if_stats_in_multicast_packets",
    help: "Number of inbound multicast packets processed",
    labels: &["node", "interface"],
};

pub(crate) fn handle(ctx: DecodeContext) {
    let rows = record(&ctx.msg, &ctx.bucket, ctx.timestamp_ms, &ctx.node);

    if rows.is_empty() {
        return;
    }

    let metadb = ctx.metadb;
    let node = ctx.node;
    tokio::spawn(async move {
        if let Err(e) = metadb.persist_interfaces(&rows, &node).await {
            error!("failed to persist interface metadata for {node}: {e}");
        }
    });
}

fn record(msg: &Telemetry, bucket: &Bucket, timestamp_ms: i64, node: &str) -> Vec<InterfaceRow> {
    let mut rows = Vec::with_capacity(msg.data_gpbkv.len());

    for entry in &msg.data_gpbkv {
        let Some((key, content)) = entry_key_content(entry) else {
            warn!("interface entry from {node} has unexpected shape");
            continue;
        };
        let Some(if_name) = key.fields.first().and_then(leaf_string) else {
            warn!("interface entry from {node} carries no name key");
            continue;
        };

        rows.push(parse_interface_meta(&content.fields, &if_name, node, timestamp_ms));

        let sub_interface = if_name.contains('.');

        for field in &content.fields {
            match field.name.as_str() {
                // Sub-interfaces only report rates under the v4 protocol
                // statistics subtree.
                "v4-protocol-stats" if sub_interface => {
                    record_subinterface_stats(
                        &field.fields,
                        bucket,
                        node,
                        &if_name,
                        timestamp_ms,
                    );
                    break;
                }
                "statistics" if !sub_interface => {
                    record_physical_stats(&field.fields, bucket, node, &if_name, timestamp_ms);
                }
                "diffserv-info" => {
                    qos::record(&field.fields, bucket, node, &if_name, timestamp_ms);
                }
                _ => {}
            }
        }
    }

    rows
}

fn record_physical_stats(
    fields: &[TelemetryField],
    bucket: &Bucket,
    node: &str,
    if_name: &str,
    timestamp_ms: i64,
) {
    for field in fields {
        let desc = match field.name.as_str() {
            "out-octets" => &OUT_OCTETS,
            "in-octets" => &IN_OCTETS,
            "num-flaps" => &NUM_FLAPS,
            "in-crc-errors" => &CRC_ERRORS_IN,
            "out-discards" => &OUT_DISCARD_PKTS,
            "in-discards" => &IN_DISCARD_PKTS,
            "in-errors" => &IN_ERROR_PKTS,
            "out-errors" => &OUT_ERROR_PKTS,
            "out-broadcast-pkts" => &OUT_BROADCAST_PKTS,
            "in-broadcast-pkts" => &IN_BROADCAST_PKTS,
            "out-unicast-pkts" => &OUT_UNICAST_PKTS,
            "in-unicast-pkts" => &IN_UNICAST_PKTS,
            "out-multicast-pkts" => &OUT_MULTICAST_PKTS,
            "in-multicast-pkts" => &IN_MULTICAST_PKTS,
            _ => continue,
        };
        counter(bucket, desc, field, node, if_name, timestamp_ms);
    }
}

fn record_subinterface_stats(
    fields: &[TelemetryField],
    bucket: &Bucket,
    node: &str,
    if_name: &str,
    timestamp_ms: i64,
) {
    for field in fields {
        let desc = match field.name.as_str() {
            "out-octets" => &OUT_OCTETS,
            "in-octets" => &IN_OCTETS,
            "in-error-pkts" => &IN_ERROR_PKTS,
            "out-error-pkts" => &OUT_ERROR_PKTS,
            "in-discarded-pkts" => &IN_DISCARD_PKTS,
            "out-discarded-pkts" => &OUT_DISCARD_PKTS,
            _ => continue,
        };
        counter(bucket, desc, field, node, if_name, timestamp_ms);
    }
}

fn counter(
    bucket: &Bucket,
    desc: &'static Descriptor,
    field: &TelemetryField,
    node: &str,
    if_name: &str,
    timestamp_ms: i64,
) {
    let Some(value) = leaf_f64(field) else {
        warn!(
            "interface counter {} on {if_name} from {node} is not numeric",
            field.name
        );
        return;
    };

    bucket.record(
        desc,
        SampleKind::Counter,
        value,
        vec![node.to_string(), if_name.to_string()],
        timestamp_ms,
    );
}

fn parse_interface_meta(
    fields: &[TelemetryField],
    if_name: &str,
    node: &str,
    timestamp_ms: i64,
) -> InterfaceRow {
    let mut vrf = "Global".to_string();
    let mut description = "No description".to_string();
    let mut ipv4_address = "0.0.0.0".to_string();
    let mut ipv4_mask = "0.0.0.0".to_string();
    let mut row = InterfaceRow {
        device_id: node.to_string(),
        timestamps: row_timestamp(timestamp_ms),
        interface_name: if_name.to_string(),
        description: String::new(),
        ipv4: String::new(),
        admin_status: String::new(),
        oper_status: String::new(),
        speed: 0,
        mtu: 0,
        physical_address: String::new(),
        vrf: String::new(),
        last_change: String::new(),
    };

    for field in fields {
        match field.name.as_str() {
            "vrf" => {
                vrf = normalize_vrf(&leaf_string(field).unwrap_or_default());
            }
            "description" => {
                if let Some(text) = leaf_string(field) {
                    if !text.is_empty() {
                        description = text;
                    }
                }
            }
            "ipv4" => {
                if let Some(addr) = leaf_string(field) {
                    ipv4_address = addr;
                }
            }
            "ipv4-subnet-mask" => {
                if let Some(mask) = leaf_string(field) {
                    ipv4_mask = mask;
                }
            }
            "speed" => row.speed = leaf_f64(field).unwrap_or(0.0) as i64,
            "mtu" => row.mtu = leaf_f64(field).unwrap_or(0.0) as i64,
            "phys-address" => {
                row.physical_address = leaf_string(field).unwrap_or_default();
            }
            "admin-status" => {
                row.admin_status =
                    interface_status_to_integer(&leaf_string(field).unwrap_or_default())
                        .to_string();
            }
            "oper-status" => {
                row.oper_status =
                    interface_status_to_integer(&leaf_string(field).unwrap_or_default())
                        .to_string();
            }
            "last-change" => {
                row.last_change = leaf_string(field).unwrap_or_default();
            }
            _ => {}
        }
    }

    row.vrf = vrf;
    row.description = description;
    row.ipv4 = render_cidr(&ipv4_address, &ipv4_mask);
    row
}

/// Renders address + mask leaves as `a.b.c.d/len`; unparsable values fall
/// back to 0.0.0.0.
fn render_cidr(address: &str, mask: &str) -> String {
    let address: Ipv4Addr = address.parse().unwrap_or(Ipv4Addr::UNSPECIFIED);
    let mask: Ipv4Addr = mask.parse().unwrap_or(Ipv4Addr::UNSPECIFIED);
    let prefix_len: u32 = mask.octets().iter().map(|o| o.count_ones()).sum();
    format!("{address}/{prefix_len}")
}
