//! IOSd CPU utilization decoder.
//!
//! Emits the 5-second / 1-minute / 5-minute busy gauges and hands the
//! per-process CPU usage rows to the catalog.

use log::{error, warn};

use crate::cache::{Bucket, Descriptor, SampleKind};
use crate::decode::extract::{leaf_f64, leaf_string};
use crate::decode::{entry_key_content, row_timestamp, DecodeContext};
use crate::metadb::CpuProcessRow;
use crate::proto::telemetry::{Telemetry, TelemetryField};

pub(crate) const ENCODING_PATH: &str =
    "Cisco-IOS-XE-process-cpu-oper:cpu-usage/cpu-utilization";

const FIVE_SECONDS: &str = "five-seconds";
const ONE_MINUTE: &str = "one-minute";
const FIVE_MINUTES: &str = "five-minutes";
const CPU_USAGE_PROCESS: &str = "cpu-usage-process";

static CPU_BUSY_5_SEC: Descriptor = Descriptor {
    name: "cisco_iosxe_iosd_cpu_busy_5_sec_percentage",
    help: "The IOSd daemon CPU busy percentage over the last 5 seconds",
    labels: &["node"],
};

static CPU_BUSY_1_MIN: Descriptor = Descriptor {
    name: "cisco_iosxe_iosd_cpu_busy_1_min_percentage",
    help: "The IOSd daemon CPU busy percentage over the last minute",
    labels: &["node"],
};

static CPU_BUSY_5_MIN: Descriptor = Descriptor {
    name: "cisco_iosxe_iosd_cpu_busy_5_min_percentage",
    help: "The IOSd daemon CPU busy percentage over the last 5 minutes",
    labels: &["node"],
};

pub(crate) fn handle(ctx: DecodeContext) {
    let rows = record(&ctx.msg, &ctx.bucket, ctx.timestamp_ms, &ctx.node);

    if rows.is_empty() {
        return;
    }

    let metadb = ctx.metadb;
    let node = ctx.node;
    tokio::spawn(async move {
        if let Err(e) = metadb.persist_cpu_processes(&rows, &node).await {
            error!("failed to persist CPU process metadata for {node}: {e}");
        }
    });
}

fn record(msg: &Telemetry, bucket: &Bucket, timestamp_ms: i64, node: &str) -> Vec<CpuProcessRow> {
    let Some(entry) = msg.data_gpbkv.first() else {
        return Vec::new();
    };
    let Some((_, content)) = entry_key_content(entry) else {
        warn!("CPU utilization entry from {node} has unexpected shape");
        return Vec::new();
    };

    let mut rows = Vec::new();

    for field in &content.fields {
        match field.name.as_str() {
            FIVE_SECONDS => gauge(bucket, &CPU_BUSY_5_SEC, field, node, timestamp_ms),
            ONE_MINUTE => gauge(bucket, &CPU_BUSY_1_MIN, field, node, timestamp_ms),
            FIVE_MINUTES => gauge(bucket, &CPU_BUSY_5_MIN, field, node, timestamp_ms),
            CPU_USAGE_PROCESS => {
                rows.push(parse_process(&field.fields, node, timestamp_ms));
            }
            _ => {}
        }
    }

    rows
}

fn gauge(
    bucket: &Bucket,
    desc: &'static Descriptor,
    field: &TelemetryField,
    node: &str,
    timestamp_ms: i64,
) {
    let Some(value) = leaf_f64(field) else {
        warn!("CPU busy leaf {} from {node} is not numeric", field.name);
        return;
    };

    bucket.record(
        desc,
        SampleKind::Gauge,
        value,
        vec![node.to_string()],
        timestamp_ms,
    );
}

fn parse_process(fields: &[TelemetryField], node: &str, timestamp_ms: i64) -> CpuProcessRow {
    let mut row = CpuProcessRow {
        device_id: node.to_string(),
        timestamps: row_timestamp(timestamp_ms),
        name: String::new(),
        pid: 0,
        avg_runtime: 0,
        busy_5_sec: 0.0,
        busy_1_min: 0.0,
        busy_5_min: 0.0,
    };

    for field in fields {
        match field.name.as_str() {
            "pid" => row.pid = leaf_f64(field).unwrap_or(0.0) as i64,
            "name" => row.name = leaf_string(field).unwrap_or_default(),
            "avg-run-time" => row.avg_runtime = leaf_f64(field).unwrap_or(0.0) as i64,
            FIVE_SECONDS => row.busy_5_sec = leaf_f64(field).unwrap_or(0.0),
            ONE_MINUTE => row.busy_1_min = leaf_f64(field).unwrap_or(0.0),
            FIVE_MINUTES => row.busy_5_min = leaf_f64(field).unwrap_or(0.0),
            _ => {}
        }
    }

    row
}
