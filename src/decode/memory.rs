//! IOSd memory pool statistics decoder (Processor pool).

use log::warn;

use crate::cache::{Bucket, Descriptor, SampleKind};
use crate::decode::extract::leaf_f64;
use crate::decode::{entry_key_content, DecodeContext};
use crate::proto::telemetry::Telemetry;

pub(crate) const ENCODING_PATH: &str =
    "Cisco-IOS-XE-memory-oper:memory-statistics/memory-statistic";

static TOTAL_MEMORY: Descriptor = Descriptor {
    name: "cisco_iosxe_iosd_total_memory_bytes",
    help: "The IOSd daemon total memory",
    labels: &["node"],
};

static USED_MEMORY: Descriptor = Descriptor {
    name: "cisco_iosxe_iosd_used_memory_bytes",
    help: "The IOSd daemon used memory",
    labels: &["node"],
};

static FREE_MEMORY: Descriptor = Descriptor {
    name: "cisco_iosxe_iosd_free_memory_bytes",
    help: "The IOSd daemon free memory",
    labels: &["node"],
};

pub(crate) fn handle(ctx: DecodeContext) {
    record(&ctx.msg, &ctx.bucket, ctx.timestamp_ms, &ctx.node);
}

fn record(msg: &Telemetry, bucket: &Bucket, timestamp_ms: i64, node: &str) {
    // The first entry is the Processor pool.
    let Some(entry) = msg.data_gpbkv.first() else {
        return;
    };
    let Some((_, content)) = entry_key_content(entry) else {
        warn!("memory statistic entry from {node} has unexpected shape");
        return;
    };

    for field in &content.fields {
        let desc = match field.name.as_str() {
            "total-memory" => &TOTAL_MEMORY,
            "used-memory" => &USED_MEMORY,
            "free-memory" => &FREE_MEMORY,
            _ => continue,
        };

        let Some(value) = leaf_f64(field) else {
            warn!("memory leaf {} from {node} is not numeric", field.name);
            continue;
        };

        bucket.record(
            desc,
            SampleKind::Gauge,
            value,
            vec![node.to_string()],
            timestamp_ms,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::testutil::{entry, envelope, str_leaf, u64_leaf};

    #[test]
    fn memory_gauges_are_emitted() {
        let msg = envelope(
            ENCODING_PATH,
            "10.0.0.1",
            1_700_000_000_000,
            vec![entry(
                vec![str_leaf("name", "Processor")],
                vec![
                    u64_leaf("total-memory", 2_000_000),
                    u64_leaf("used-memory", 1_200_000),
                    u64_leaf("free-memory", 800_000),
                ],
            )],
        );

        let bucket = Bucket::default();
        record(&msg, &bucket, 1_700_000_000_000, "10.0.0.1");

        let samples = bucket.samples();
        assert_eq!(samples.len(), 3);
        for (name, value) in [
            ("cisco_iosxe_iosd_total_memory_bytes", 2_000_000.0),
            ("cisco_iosxe_iosd_used_memory_bytes", 1_200_000.0),
            ("cisco_iosxe_iosd_free_memory_bytes", 800_000.0),
        ] {
            let sample = samples.iter().find(|s| s.desc.name == name).unwrap();
            assert_eq!(sample.value, value);
            assert_eq!(sample.kind, SampleKind::Gauge);
            assert_eq!(sample.timestamp_ms, 1_700_000_000_000);
        }
    }

    #[test]
    fn empty_envelope_is_a_no_op() {
        let msg = envelope(ENCODING_PATH, "10.0.0.1", 1, vec![]);
        let bucket = Bucket::default();
        record(&msg, &bucket, 1, "10.0.0.1");
        assert!(bucket.is_empty());
    }
}
