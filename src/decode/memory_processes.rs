//! Per-process memory usage decoder. Metadata only, no samples.

use log::{error, warn};

use crate::decode::extract::{leaf_f64, leaf_string};
use crate::decode::{entry_key_content, row_timestamp, DecodeContext};
use crate::metadb::MemProcessRow;
use crate::proto::telemetry::Telemetry;

pub(crate) const ENCODING_PATH: &str =
    "Cisco-IOS-XE-process-memory-oper:memory-usage-processes/memory-usage-process";

pub(crate) fn handle(ctx: DecodeContext) {
    let rows = record(&ctx.msg, ctx.timestamp_ms, &ctx.node);

    if rows.is_empty() {
        return;
    }

    let metadb = ctx.metadb;
    let node = ctx.node;
    tokio::spawn(async move {
        if let Err(e) = metadb.persist_mem_processes(&rows, &node).await {
            error!("failed to persist memory process metadata for {node}: {e}");
        }
    });
}

fn record(msg: &Telemetry, timestamp_ms: i64, node: &str) -> Vec<MemProcessRow> {
    let mut rows = Vec::new();

    for entry in &msg.data_gpbkv {
        let Some((key, content)) = entry_key_content(entry) else {
            warn!("memory process entry from {node} has unexpected shape");
            continue;
        };

        let mut row = MemProcessRow {
            device_id: node.to_string(),
            timestamps: row_timestamp(timestamp_ms),
            name: String::new(),
            pid: 0,
            allocated_memory: 0,
            freed_memory: 0,
            holding_memory: 0,
        };

        for field in &key.fields {
            match field.name.as_str() {
                "pid" => row.pid = leaf_f64(field).unwrap_or(0.0) as i64,
                "name" => row.name = leaf_string(field).unwrap_or_default(),
                _ => {}
            }
        }

        for field in &content.fields {
            match field.name.as_str() {
                "allocated-memory" => {
                    row.allocated_memory = leaf_f64(field).unwrap_or(0.0) as i64
                }
                "freed-memory" => row.freed_memory = leaf_f64(field).unwrap_or(0.0) as i64,
                "holding-memory" => row.holding_memory = leaf_f64(field).unwrap_or(0.0) as i64,
                _ => {}
            }
        }

        rows.push(row);
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::testutil::{entry, envelope, str_leaf, u32_leaf, u64_leaf};
    use crate::proto::telemetry::TelemetryField;

    #[test]
    fn process_rows_are_built() {
        let msg = envelope(
            ENCODING_PATH,
            "10.0.0.1",
            1_700_000_000_000,
            vec![
                entry(
                    vec![u32_leaf("pid", 1), str_leaf("name", "Chunk Manager")],
                    vec![
                        u64_leaf("allocated-memory", 100),
                        u64_leaf("freed-memory", 40),
                        u64_leaf("holding-memory", 60),
                    ],
                ),
                entry(
                    vec![u32_leaf("pid", 2), str_leaf("name", "Load Meter")],
                    vec![
                        u64_leaf("allocated-memory", 10),
                        u64_leaf("freed-memory", 5),
                        u64_leaf("holding-memory", 5),
                    ],
                ),
            ],
        );

        let rows = record(&msg, 1_700_000_000_000, "10.0.0.1");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Chunk Manager");
        assert_eq!(rows[0].pid, 1);
        assert_eq!(rows[0].allocated_memory, 100);
        assert_eq!(rows[0].holding_memory, 60);
        assert_eq!(rows[0].timestamps, 1_700_000_000);
        assert_eq!(rows[1].name, "Load Meter");
    }

    #[test]
    fn malformed_entry_is_skipped() {
        let mut msg = envelope(ENCODING_PATH, "10.0.0.1", 1, vec![]);
        msg.data_gpbkv.push(TelemetryField::default());
        msg.data_gpbkv.push(entry(
            vec![u32_leaf("pid", 7), str_leaf("name", "BGP Router")],
            vec![u64_leaf("holding-memory", 9)],
        ));

        let rows = record(&msg, 1, "10.0.0.1");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "BGP Router");
        assert_eq!(rows[0].holding_memory, 9);
    }
}
