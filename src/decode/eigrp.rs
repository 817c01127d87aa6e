//! EIGRP adjacency decoder. The presence of a neighbor entry is the
//! signal; the gauge is a constant 1 keyed by neighbor labels.

use log::warn;

use crate::cache::{Bucket, Descriptor, SampleKind};
use crate::decode::convert::normalize_vrf;
use crate::decode::extract::leaf_string;
use crate::decode::{entry_key_content, DecodeContext};
use crate::proto::telemetry::Telemetry;

pub(crate) const ENCODING_PATH: &str =
    "Cisco-IOS-XE-eigrp-oper:eigrp-oper-data/eigrp-instance/eigrp-interface/eigrp-nbr";

static ADJACENCY_STATUS: Descriptor = Descriptor {
    name: "cisco_iosxe_eigrp_adjacency_status",
    help: "The current state of the EIGRP adjacency",
    labels: &["node", "neighbor_id", "address_family", "vrf", "interface"],
};

pub(crate) fn handle(ctx: DecodeContext) {
    record(&ctx.msg, &ctx.bucket, ctx.timestamp_ms, &ctx.node);
}

fn record(msg: &Telemetry, bucket: &Bucket, timestamp_ms: i64, node: &str) {
    for entry in &msg.data_gpbkv {
        let Some((key, _)) = entry_key_content(entry) else {
            warn!("EIGRP neighbor entry from {node} has unexpected shape");
            continue;
        };

        let mut afi = String::new();
        let mut vrf = String::new();
        let mut interface = String::new();
        let mut neighbor_id = String::new();

        for field in &key.fields {
            match field.name.as_str() {
                "afi" => afi = leaf_string(field).unwrap_or_default(),
                "vrf-name" => vrf = normalize_vrf(&leaf_string(field).unwrap_or_default()),
                "name" => interface = leaf_string(field).unwrap_or_default(),
                "nbr-address" => neighbor_id = leaf_string(field).unwrap_or_default(),
                _ => {}
            }
        }

        if neighbor_id.is_empty() {
            warn!("EIGRP neighbor entry from {node} carries no address");
            continue;
        }

        bucket.record(
            &ADJACENCY_STATUS,
            SampleKind::Gauge,
            1.0,
            vec![node.to_string(), neighbor_id, afi, vrf, interface],
            timestamp_ms,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::testutil::{entry, envelope, str_leaf};

    #[test]
    fn neighbor_presence_gauge() {
        let msg = envelope(
            ENCODING_PATH,
            "10.0.0.1",
            1_700_000_000_000,
            vec![entry(
                vec![
                    str_leaf("afi", "ipv4"),
                    str_leaf("vrf-name", ""),
                    str_leaf("name", "GigabitEthernet2"),
                    str_leaf("nbr-address", "192.168.34.4"),
                ],
                vec![],
            )],
        );

        let bucket = Bucket::default();
        record(&msg, &bucket, 1_700_000_000_000, "10.0.0.1");

        let samples = bucket.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 1.0);
        assert_eq!(
            samples[0].labels,
            vec![
                "10.0.0.1".to_string(),
                "192.168.34.4".to_string(),
                "ipv4".to_string(),
                "Global".to_string(),
                "GigabitEthernet2".to_string(),
            ]
        );
    }

    #[test]
    fn addressless_entry_is_skipped() {
        let msg = envelope(
            ENCODING_PATH,
            "10.0.0.1",
            1,
            vec![entry(vec![str_leaf("afi", "ipv4")], vec![])],
        );
        let bucket = Bucket::default();
        record(&msg, &bucket, 1, "10.0.0.1");
        assert!(bucket.is_empty());
    }
}
