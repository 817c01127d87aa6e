//! QoS class statistics from the interface `diffserv-info` subtree.

use log::warn;

use crate::cache::{Bucket, Descriptor, SampleKind};
use crate::decode::extract::{leaf_f64, leaf_string};
use crate::proto::telemetry::TelemetryField;

static CLASSIFIED_BYTES: Descriptor = Descriptor {
    name: "cisco_iosxe_qos_class_map_classfied_bytes",
    help: "The number of total bytes which filtered to the classifier-entry",
    labels: &["node", "interface", "direction", "policy_map", "class_map", "parent_path"],
};

static QUEUE_OUTPUT_BYTES: Descriptor = Descriptor {
    name: "cisco_iosxe_qos_class_map_queued_bytes",
    help: "The number of bytes transmitted from queue",
    labels: &["node", "interface", "direction", "policy_map", "class_map", "parent_path"],
};

static QUEUE_SIZE_BYTES: Descriptor = Descriptor {
    name: "cisco_iosxe_qos_class_map_queue_size_bytes",
    help: "The number of bytes currently buffered",
    labels: &["node", "interface", "direction", "policy_map", "class_map", "parent_path"],
};

static QUEUE_DROP_BYTES: Descriptor = Descriptor {
    name: "cisco_iosxe_qos_class_map_queue_drops_bytes",
    help: "The total number of bytes dropped",
    labels: &["node", "interface", "direction", "policy_map", "class_map", "parent_path"],
};

pub(crate) fn record(
    fields: &[TelemetryField],
    bucket: &Bucket,
    node: &str,
    if_name: &str,
    timestamp_ms: i64,
) {
    let mut direction = String::new();
    let mut policy_name = String::new();

    for field in fields {
        match field.name.as_str() {
            "direction" => direction = leaf_string(field).unwrap_or_default(),
            "policy-name" => policy_name = leaf_string(field).unwrap_or_default(),
            "diffserv-target-classifier-stats" => record_classifier(
                &field.fields,
                bucket,
                node,
                if_name,
                &direction,
                &policy_name,
                timestamp_ms,
            ),
            _ => {}
        }
    }
}

fn record_classifier(
    fields: &[TelemetryField],
    bucket: &Bucket,
    node: &str,
    if_name: &str,
    direction: &str,
    policy_name: &str,
    timestamp_ms: i64,
) {
    let mut class_map = String::new();
    let mut parent_path = String::new();

    for field in fields {
        match field.name.as_str() {
            "classifier-entry-name" => class_map = leaf_string(field).unwrap_or_default(),
            "parent-path" => {
                // In a hierarchical policy the class sits one level below
                // the last policy name in the space-separated path.
                let raw = leaf_string(field).unwrap_or_default();
                let parts: Vec<&str> = raw.split(' ').collect();
                parent_path = parts
                    .len()
                    .checked_sub(2)
                    .and_then(|idx| parts.get(idx))
                    .map(|s| s.to_string())
                    .unwrap_or_default();
            }
            "classifier-entry-stats" => {
                for stat in &field.fields {
                    if stat.name == "classified-bytes" {
                        counter(
                            bucket,
                            &CLASSIFIED_BYTES,
                            stat,
                            node,
                            if_name,
                            direction,
                            policy_name,
                            &class_map,
                            &parent_path,
                            timestamp_ms,
                        );
                    }
                }
            }
            "queuing-stats" => {
                for stat in &field.fields {
                    let desc = match stat.name.as_str() {
                        "output-bytes" => &QUEUE_OUTPUT_BYTES,
                        "queue-size-bytes" => &QUEUE_SIZE_BYTES,
                        "drop-bytes" => &QUEUE_DROP_BYTES,
                        _ => continue,
                    };
                    counter(
                        bucket,
                        desc,
                        stat,
                        node,
                        if_name,
                        direction,
                        policy_name,
                        &class_map,
                        &parent_path,
                        timestamp_ms,
                    );
                }
            }
            _ => {}
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn counter(
    bucket: &Bucket,
    desc: &'static Descriptor,
    field: &TelemetryField,
    node: &str,
    if_name: &str,
    direction: &str,
    policy_name: &str,
    class_map: &str,
    parent_path: &str,
    timestamp_ms: i64,
) {
    let Some(value) = leaf_f64(field) else {
        warn!(
            "QoS counter {} on {if_name} from {node} is not numeric",
            field.name
        );
        return;
    };

    bucket.record(
        desc,
        SampleKind::Counter,
        value,
        vec![
            node.to_string(),
            if_name.to_string(),
            direction.to_string(),
            policy_name.to_string(),
            class_map.to_string(),
            parent_path.to_string(),
        ],
        timestamp_ms,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::testutil::{container, str_leaf, u64_leaf};

    #[test]
    fn classifier_and_queue_counters() {
        let fields = vec![
            str_leaf("direction", "qos-outbound"),
            str_leaf("policy-name", "WAN-EDGE"),
            container(
                "diffserv-target-classifier-stats",
                vec![
                    str_leaf("classifier-entry-name", "VOICE"),
                    str_leaf("parent-path", "WAN-EDGE SHAPER VOICE"),
                    container(
                        "classifier-entry-stats",
                        vec![u64_leaf("classified-bytes", 12345)],
                    ),
                    container(
                        "queuing-stats",
                        vec![
                            u64_leaf("output-bytes", 11111),
                            u64_leaf("queue-size-bytes", 64),
                            u64_leaf("drop-bytes", 9),
                        ],
                    ),
                ],
            ),
        ];

        let bucket = Bucket::default();
        record(&fields, &bucket, "10.0.0.1", "GigabitEthernet1", 1_700_000_000_000);

        let samples = bucket.samples();
        assert_eq!(samples.len(), 4);

        let classified = samples
            .iter()
            .find(|s| s.desc.name == "cisco_iosxe_qos_class_map_classfied_bytes")
            .unwrap();
        assert_eq!(classified.value, 12345.0);
        assert_eq!(
            classified.labels,
            vec![
                "10.0.0.1".to_string(),
                "GigabitEthernet1".to_string(),
                "qos-outbound".to_string(),
                "WAN-EDGE".to_string(),
                "VOICE".to_string(),
                "SHAPER".to_string(),
            ]
        );

        let drops = samples
            .iter()
            .find(|s| s.desc.name == "cisco_iosxe_qos_class_map_queue_drops_bytes")
            .unwrap();
        assert_eq!(drops.value, 9.0);
        assert_eq!(drops.kind, SampleKind::Counter);
    }

    #[test]
    fn flat_parent_path_is_tolerated() {
        let fields = vec![container(
            "diffserv-target-classifier-stats",
            vec![
                str_leaf("classifier-entry-name", "class-default"),
                str_leaf("parent-path", "solo"),
                container(
                    "classifier-entry-stats",
                    vec![u64_leaf("classified-bytes", 1)],
                ),
            ],
        )];

        let bucket = Bucket::default();
        record(&fields, &bucket, "10.0.0.1", "Gi1", 1);
        assert_eq!(bucket.samples()[0].labels[5], "");
    }
}
