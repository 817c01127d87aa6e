//! OSPFv2 adjacency decoder.

use log::warn;

use crate::cache::{Bucket, Descriptor, SampleKind};
use crate::decode::convert::{ospf_nbr_state_to_num, u32_to_dotted_quad};
use crate::decode::extract::{leaf_f64, leaf_string};
use crate::decode::{entry_key_content, DecodeContext};
use crate::proto::telemetry::Telemetry;

pub(crate) const ENCODING_PATH: &str =
    "Cisco-IOS-XE-ospf-oper:ospf-oper-data/ospfv2-instance/ospfv2-area/ospfv2-interface/ospfv2-neighbor";

static ADJACENCY_STATUS: Descriptor = Descriptor {
    name: "cisco_iosxe_ospf_adjacency_status",
    help: "The current state of the OSPF adjacency",
    labels: &["node", "neighbor_id", "neighbor_ip", "ospf_instance_id", "interface", "area_id"],
};

pub(crate) fn handle(ctx: DecodeContext) {
    record(&ctx.msg, &ctx.bucket, ctx.timestamp_ms, &ctx.node);
}

fn record(msg: &Telemetry, bucket: &Bucket, timestamp_ms: i64, node: &str) {
    for entry in &msg.data_gpbkv {
        let Some((key, content)) = entry_key_content(entry) else {
            warn!("OSPF neighbor entry from {node} has unexpected shape");
            continue;
        };

        let mut instance_id = String::new();
        let mut area_id = String::new();
        let mut interface = String::new();
        let mut neighbor_id = String::new();
        let mut neighbor_ip = String::new();
        let mut state: Option<f64> = None;

        for field in &key.fields {
            match field.name.as_str() {
                "instance-id" => {
                    instance_id = (leaf_f64(field).unwrap_or(0.0) as i64).to_string()
                }
                "area-id" => area_id = (leaf_f64(field).unwrap_or(0.0) as i64).to_string(),
                "name" => interface = leaf_string(field).unwrap_or_default(),
                "nbr-id" => {
                    neighbor_id =
                        u32_to_dotted_quad(leaf_f64(field).unwrap_or(0.0) as u32)
                }
                _ => {}
            }
        }

        for field in &content.fields {
            match field.name.as_str() {
                "address" => neighbor_ip = leaf_string(field).unwrap_or_default(),
                "state" => {
                    state = leaf_string(field)
                        .map(|s| ospf_nbr_state_to_num(&s));
                }
                _ => {}
            }
        }

        let Some(state) = state else {
            warn!("OSPF neighbor {neighbor_id} from {node} carries no state leaf");
            continue;
        };

        bucket.record(
            &ADJACENCY_STATUS,
            SampleKind::Gauge,
            state,
            vec![
                node.to_string(),
                neighbor_id,
                neighbor_ip,
                instance_id,
                interface,
                area_id,
            ],
            timestamp_ms,
        );
    }
}
