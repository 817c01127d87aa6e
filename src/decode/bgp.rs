//! BGP operational state decoder.
//!
//! One top-level entry per address family. Emits per-neighbor
//! prefixes-received and peer-status samples plus a global router-id/AS
//! marker, and reconciles the neighbor and AFI catalog tables.

use log::{error, warn};

use crate::cache::{Bucket, Descriptor, SampleKind};
use crate::decode::convert::{bgp_fsm_to_integer, normalize_vrf};
use crate::decode::extract::{leaf_f64, leaf_string};
use crate::decode::{entry_key_content, row_timestamp, DecodeContext};
use crate::metadb::{BgpAfiRow, BgpNeighborRow};
use crate::proto::telemetry::{Telemetry, TelemetryField};

pub(crate) const ENCODING_PATH: &str =
    "Cisco-IOS-XE-bgp-oper:bgp-state-data/address-families/address-family";

static NEIGHBOR_PREFIXES_RCVD: Descriptor = Descriptor {
    name: "cisco_iosxe_bgp_neighbor_prefixes_received",
    help: "The number of prefixes received from the BGP peer",
    labels: &["node", "neighbor_id", "address_family", "vrf"],
};

static NEIGHBOR_STATUS: Descriptor = Descriptor {
    name: "cisco_iosxe_bgp_neighbor_status",
    help: "The BGP peer FSM state mapped to an integer (established=5)",
    labels: &["node", "neighbor_id", "address_family", "vrf"],
};

static GLOBAL_META: Descriptor = Descriptor {
    name: "cisco_iosxe_bgp_global_meta",
    help: "Marker series carrying the local BGP router id and AS number",
    labels: &["node", "local_neighbor_id", "local_as"],
};

pub(crate) fn handle(ctx: DecodeContext) {
    let (neighbors, afis) = record(&ctx.msg, &ctx.bucket, ctx.timestamp_ms, &ctx.node);

    if !neighbors.is_empty() {
        let metadb = ctx.metadb.clone();
        let node = ctx.node.clone();
        tokio::spawn(async move {
            if let Err(e) = metadb.persist_bgp_neighbors(&neighbors, &node).await {
                error!("failed to persist BGP neighbor metadata for {node}: {e}");
            }
        });
    }

    if !afis.is_empty() {
        let metadb = ctx.metadb;
        let node = ctx.node;
        tokio::spawn(async move {
            if let Err(e) = metadb.persist_bgp_afis(&afis, &node).await {
                error!("failed to persist BGP AFI metadata for {node}: {e}");
            }
        });
    }
}

fn record(
    msg: &Telemetry,
    bucket: &Bucket,
    timestamp_ms: i64,
    node: &str,
) -> (Vec<BgpNeighborRow>, Vec<BgpAfiRow>) {
    if msg.data_gpbkv.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let mut neighbors = Vec::new();
    let mut afis = Vec::new();
    let mut local_router_id = String::new();
    let mut local_as: i64 = 0;

    for entry in &msg.data_gpbkv {
        let Some((key, content)) = entry_key_content(entry) else {
            warn!("BGP address-family entry from {node} has unexpected shape");
            continue;
        };

        let mut afi = BgpAfiRow {
            device_id: node.to_string(),
            timestamps: row_timestamp(timestamp_ms),
            afi_type: String::new(),
            vrf_name: String::new(),
            total_prefixes: 0,
            total_paths: 0,
        };

        for field in &key.fields {
            match field.name.as_str() {
                "afi-safi" => afi.afi_type = leaf_string(field).unwrap_or_default(),
                "vrf-name" => {
                    afi.vrf_name = normalize_vrf(&leaf_string(field).unwrap_or_default())
                }
                _ => {}
            }
        }

        for field in &content.fields {
            match field.name.as_str() {
                "router-id" => {
                    local_router_id = leaf_string(field).unwrap_or_default();
                }
                "local-as" => {
                    local_as = leaf_f64(field).unwrap_or(0.0) as i64;
                }
                "prefixes" => {
                    afi.total_prefixes = field
                        .fields
                        .first()
                        .and_then(leaf_f64)
                        .unwrap_or(0.0) as i64;
                }
                "path" => {
                    afi.total_paths = field
                        .fields
                        .first()
                        .and_then(leaf_f64)
                        .unwrap_or(0.0) as i64;
                }
                "bgp-neighbor-summary" => {
                    if let Some(neighbor) = parse_neighbor(
                        &field.fields,
                        &afi,
                        bucket,
                        node,
                        timestamp_ms,
                    ) {
                        neighbors.push(neighbor);
                    }
                }
                _ => {}
            }
        }

        afis.push(afi);
    }

    bucket.record(
        &GLOBAL_META,
        SampleKind::Gauge,
        1.0,
        vec![node.to_string(), local_router_id, local_as.to_string()],
        timestamp_ms,
    );

    (neighbors, afis)
}

fn parse_neighbor(
    fields: &[TelemetryField],
    afi: &BgpAfiRow,
    bucket: &Bucket,
    node: &str,
    timestamp_ms: i64,
) -> Option<BgpNeighborRow> {
    let mut neighbor = BgpNeighborRow {
        device_id: node.to_string(),
        timestamps: row_timestamp(timestamp_ms),
        neighbor_id: String::new(),
        address_family_type: afi.afi_type.clone(),
        address_family_vrf: afi.vrf_name.clone(),
        neighbor_status: String::new(),
        uptime: String::new(),
        remote_as: 0,
    };
    let mut prefixes_received = 0.0;
    let mut fsm_state: Option<i64> = None;

    for field in fields {
        match field.name.as_str() {
            "id" => neighbor.neighbor_id = leaf_string(field).unwrap_or_default(),
            "up-time" => neighbor.uptime = leaf_string(field).unwrap_or_default(),
            "prefixes-received" => prefixes_received = leaf_f64(field).unwrap_or(0.0),
            "as" => neighbor.remote_as = leaf_f64(field).unwrap_or(0.0) as i64,
            "state" => {
                fsm_state = bgp_fsm_to_integer(&leaf_string(field).unwrap_or_default());
            }
            _ => {}
        }
    }

    if neighbor.neighbor_id.is_empty() {
        warn!("BGP neighbor summary from {node} carries no neighbor id");
        return None;
    }

    neighbor.neighbor_status = fsm_state.map(|s| s.to_string()).unwrap_or_default();

    let labels = vec![
        node.to_string(),
        neighbor.neighbor_id.clone(),
        neighbor.address_family_type.clone(),
        neighbor.address_family_vrf.clone(),
    ];

    bucket.record(
        &NEIGHBOR_PREFIXES_RCVD,
        SampleKind::Counter,
        prefixes_received,
        labels.clone(),
        timestamp_ms,
    );

    if let Some(state) = fsm_state {
        bucket.record(
            &NEIGHBOR_STATUS,
            SampleKind::Gauge,
            state as f64,
            labels,
            timestamp_ms,
        );
    }

    Some(neighbor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::testutil::{container, entry, envelope, str_leaf, u32_leaf, u64_leaf};

    fn bgp_envelope() -> Telemetry {
        envelope(
            ENCODING_PATH,
            "10.0.0.1",
            1_700_000_000_000,
            vec![entry(
                vec![
                    str_leaf("afi-safi", "ipv4-unicast"),
                    str_leaf("vrf-name", "default"),
                ],
                vec![
                    str_leaf("router-id", "10.255.0.1"),
                    u32_leaf("local-as", 65001),
                    container("prefixes", vec![u64_leaf("total-entries", 120)]),
                    container("path", vec![u64_leaf("total-entries", 240)]),
                    container(
                        "bgp-neighbor-summary",
                        vec![
                            str_leaf("id", "10.0.0.2"),
                            str_leaf("up-time", "1w2d"),
                            u64_leaf("prefixes-received", 42),
                            u32_leaf("as", 65002),
                            str_leaf("state", "fsm-established"),
                        ],
                    ),
                ],
            )],
        )
    }

    #[test]
    fn established_neighbor_maps_to_five() {
        let msg = bgp_envelope();
        let bucket = Bucket::default();
        let (neighbors, afis) = record(&msg, &bucket, 1_700_000_000_000, "10.0.0.1");

        assert_eq!(neighbors.len(), 1);
        let neighbor = &neighbors[0];
        assert_eq!(neighbor.neighbor_id, "10.0.0.2");
        assert_eq!(neighbor.neighbor_status, "5");
        assert_eq!(neighbor.address_family_type, "ipv4-unicast");
        assert_eq!(neighbor.address_family_vrf, "Global");
        assert_eq!(neighbor.remote_as, 65002);
        assert_eq!(neighbor.uptime, "1w2d");

        let samples = bucket.samples();
        let status = samples
            .iter()
            .find(|s| s.desc.name == "cisco_iosxe_bgp_neighbor_status")
            .unwrap();
        assert_eq!(status.value, 5.0);

        let prefixes = samples
            .iter()
            .find(|s| s.desc.name == "cisco_iosxe_bgp_neighbor_prefixes_received")
            .unwrap();
        assert_eq!(prefixes.value, 42.0);
        assert_eq!(prefixes.kind, SampleKind::Counter);
        assert_eq!(
            prefixes.labels,
            vec![
                "10.0.0.1".to_string(),
                "10.0.0.2".to_string(),
                "ipv4-unicast".to_string(),
                "Global".to_string(),
            ]
        );

        assert_eq!(afis.len(), 1);
        assert_eq!(afis[0].total_prefixes, 120);
        assert_eq!(afis[0].total_paths, 240);
    }

    #[test]
    fn global_marker_carries_router_id_and_as() {
        let msg = bgp_envelope();
        let bucket = Bucket::default();
        record(&msg, &bucket, 1_700_000_000_000, "10.0.0.1");

        let global = bucket
            .samples()
            .into_iter()
            .find(|s| s.desc.name == "cisco_iosxe_bgp_global_meta")
            .unwrap();
        assert_eq!(global.value, 1.0);
        assert_eq!(
            global.labels,
            vec![
                "10.0.0.1".to_string(),
                "10.255.0.1".to_string(),
                "65001".to_string(),
            ]
        );
    }

    #[test]
    fn neighbor_without_id_is_dropped() {
        let msg = envelope(
            ENCODING_PATH,
            "10.0.0.1",
            1,
            vec![entry(
                vec![str_leaf("afi-safi", "ipv4-unicast"), str_leaf("vrf-name", "CUST-A")],
                vec![container(
                    "bgp-neighbor-summary",
                    vec![str_leaf("state", "fsm-idle")],
                )],
            )],
        );

        let bucket = Bucket::default();
        let (neighbors, afis) = record(&msg, &bucket, 1, "10.0.0.1");
        assert!(neighbors.is_empty());
        assert_eq!(afis.len(), 1);
        assert_eq!(afis[0].vrf_name, "CUST-A");
    }

    #[test]
    fn unknown_fsm_state_emits_no_status_sample() {
        let msg = envelope(
            ENCODING_PATH,
            "10.0.0.1",
            1,
            vec![entry(
                vec![str_leaf("afi-safi", "ipv4-unicast"), str_leaf("vrf-name", "")],
                vec![container(
                    "bgp-neighbor-summary",
                    vec![str_leaf("id", "10.0.0.9"), str_leaf("state", "fsm-mystery")],
                )],
            )],
        );

        let bucket = Bucket::default();
        let (neighbors, _) = record(&msg, &bucket, 1, "10.0.0.1");
        assert_eq!(neighbors[0].neighbor_status, "");
        assert!(bucket
            .samples()
            .iter()
            .all(|s| s.desc.name != "cisco_iosxe_bgp_neighbor_status"));
    }
}
