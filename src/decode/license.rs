//! Device license decoder: one catalog row per device, no samples.

use log::{error, warn};

use crate::decode::extract::leaf_string;
use crate::decode::{entry_key_content, row_timestamp, DecodeContext};
use crate::metadb::LicenseRow;
use crate::proto::telemetry::Telemetry;

pub(crate) const ENCODING_PATH: &str = "Cisco-IOS-XE-native:native/license";

pub(crate) fn handle(ctx: DecodeContext) {
    let Some(row) = record(&ctx.msg, ctx.timestamp_ms, &ctx.node) else {
        return;
    };

    let metadb = ctx.metadb;
    let node = ctx.node;
    tokio::spawn(async move {
        if let Err(e) = metadb.persist_license(&row).await {
            error!("failed to persist device license data for {node}: {e}");
        }
    });
}

fn record(msg: &Telemetry, timestamp_ms: i64, node: &str) -> Option<LicenseRow> {
    let entry = msg.data_gpbkv.first()?;
    let Some((_, content)) = entry_key_content(entry) else {
        warn!("license entry from {node} has unexpected shape");
        return None;
    };

    let mut row = LicenseRow {
        device_id: node.to_string(),
        timestamps: row_timestamp(timestamp_ms),
        product_id: "N/A".to_string(),
        serial_number: "N/A".to_string(),
        boot_license: "N/A".to_string(),
    };

    for field in &content.fields {
        match field.name.as_str() {
            "udi" => {
                for udi_field in &field.fields {
                    match udi_field.name.as_str() {
                        "pid" => {
                            row.product_id = leaf_string(udi_field).unwrap_or(row.product_id)
                        }
                        "sn" => {
                            row.serial_number =
                                leaf_string(udi_field).unwrap_or(row.serial_number)
                        }
                        _ => {}
                    }
                }
            }
            "boot" => {
                // The boot license level is encoded as the name of the
                // innermost container, e.g. boot/level/network-advantage.
                if let Some(level) = field
                    .fields
                    .first()
                    .and_then(|f| f.fields.first())
                    .map(|f| f.name.clone())
                {
                    row.boot_license = level;
                }
            }
            _ => {}
        }
    }

    Some(row)
}
