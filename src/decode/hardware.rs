//! Device hardware inventory decoder.
//!
//! The hardware tree nests inventory and system-data containers at varying
//! depths depending on platform, so the walk is recursive.

use log::{error, warn};

use crate::decode::convert::{ios_xe_version, rfc3339_to_epoch};
use crate::decode::extract::{leaf_bool, leaf_string};
use crate::decode::{row_timestamp, DecodeContext};
use crate::metadb::{HwInventoryRow, SystemDataRow};
use crate::proto::telemetry::{Telemetry, TelemetryField};

pub(crate) const ENCODING_PATH: &str =
    "Cisco-IOS-XE-device-hardware-oper:device-hardware-data";

pub(crate) fn handle(ctx: DecodeContext) {
    let (hw_rows, sys_rows) = record(&ctx.msg, ctx.timestamp_ms, &ctx.node);

    if !hw_rows.is_empty() {
        let metadb = ctx.metadb.clone();
        let node = ctx.node.clone();
        tokio::spawn(async move {
            if let Err(e) = metadb.persist_hw_inventory(&hw_rows, &node).await {
                error!("failed to persist hardware inventory for {node}: {e}");
            }
        });
    }

    if !sys_rows.is_empty() {
        let metadb = ctx.metadb;
        let node = ctx.node;
        tokio::spawn(async move {
            if let Err(e) = metadb.persist_system_data(&sys_rows).await {
                error!("failed to persist device system data for {node}: {e}");
            }
        });
    }
}

fn record(
    msg: &Telemetry,
    timestamp_ms: i64,
    node: &str,
) -> (Vec<HwInventoryRow>, Vec<SystemDataRow>) {
    let mut hw_rows = Vec::new();
    let mut sys_rows = Vec::new();

    for entry in &msg.data_gpbkv {
        walk(entry, node, timestamp_ms, &mut hw_rows, &mut sys_rows);
    }

    (hw_rows, sys_rows)
}

fn walk(
    field: &TelemetryField,
    node: &str,
    timestamp_ms: i64,
    hw_rows: &mut Vec<HwInventoryRow>,
    sys_rows: &mut Vec<SystemDataRow>,
) {
    for child in &field.fields {
        match child.name.as_str() {
            "device-inventory" => hw_rows.push(parse_inventory(&child.fields, node, timestamp_ms)),
            "device-system-data" => {
                sys_rows.push(parse_system_data(&child.fields, node, timestamp_ms))
            }
            _ => {}
        }

        walk(child, node, timestamp_ms, hw_rows, sys_rows);
    }
}

fn parse_inventory(fields: &[TelemetryField], node: &str, timestamp_ms: i64) -> HwInventoryRow {
    let mut row = HwInventoryRow {
        device_id: node.to_string(),
        timestamps: row_timestamp(timestamp_ms),
        hw_type: "N/A".to_string(),
        part_number: "N/A".to_string(),
        description: "N/A".to_string(),
        dev_name: "N/A".to_string(),
        field_replaceable: false,
        version: "N/A".to_string(),
        serial_number: "N/A".to_string(),
    };

    for field in fields {
        if field.name == "field-replaceable" {
            row.field_replaceable = leaf_bool(field).unwrap_or(false);
            continue;
        }

        // Empty string leaves keep the N/A placeholder.
        let Some(value) = leaf_string(field).filter(|v| !v.is_empty()) else {
            continue;
        };

        match field.name.as_str() {
            "hw-type" => row.hw_type = value,
            "part-number" => row.part_number = value,
            "hw-description" => row.description = value,
            "dev-name" => row.dev_name = value,
            "version" => row.version = value,
            "serial-number" => row.serial_number = value,
            _ => {}
        }
    }

    row
}

fn parse_system_data(fields: &[TelemetryField], node: &str, timestamp_ms: i64) -> SystemDataRow {
    let mut row = SystemDataRow {
        device_id: node.to_string(),
        timestamps: row_timestamp(timestamp_ms),
        last_seen_epoch: 0,
        boot_time_epoch: 0,
        sw_version: "N/A".to_string(),
    };

    for field in fields {
        match field.name.as_str() {
            "software-version" => {
                if let Some(banner) = leaf_string(field) {
                    row.sw_version = ios_xe_version(&banner);
                }
            }
            "current-time" => {
                match leaf_string(field).as_deref().and_then(rfc3339_to_epoch) {
                    Some(epoch) => row.last_seen_epoch = epoch,
                    None => warn!("device system data from {node} has unparsable current-time"),
                }
            }
            "boot-time" => {
                match leaf_string(field).as_deref().and_then(rfc3339_to_epoch) {
                    Some(epoch) => row.boot_time_epoch = epoch,
                    None => warn!("device system data from {node} has unparsable boot-time"),
                }
            }
            _ => {}
        }
    }

    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::testutil::{bool_leaf, container, envelope, str_leaf};

    #[test]
    fn nested_inventory_and_system_data() {
        let msg = envelope(
            ENCODING_PATH,
            "10.0.0.1",
            1_700_000_000_000,
            vec![container(
                "device-hardware-data",
                vec![container(
                    "device-hardware",
                    vec![
                        container(
                            "device-inventory",
                            vec![
                                str_leaf("hw-type", "hw-type-chassis"),
                                str_leaf("version", "V04"),
                                str_leaf("part-number", "ISR4331/K9"),
                                str_leaf("serial-number", "FDO21520TBB"),
                                str_leaf("hw-description", "Cisco ISR4331 chassis"),
                                str_leaf("dev-name", "chassis"),
                                bool_leaf("field-replaceable", true),
                            ],
                        ),
                        container(
                            "device-system-data",
                            vec![
                                str_leaf(
                                    "software-version",
                                    "Cisco IOS XE Software, Version 16.11.1, RELEASE",
                                ),
                                str_leaf("current-time", "2023-11-14T22:13:20+00:00"),
                                str_leaf("boot-time", "2023-11-01T00:00:00+00:00"),
                            ],
                        ),
                    ],
                )],
            )],
        );

        let (hw_rows, sys_rows) = record(&msg, 1_700_000_000_000, "10.0.0.1");

        assert_eq!(hw_rows.len(), 1);
        let hw = &hw_rows[0];
        assert_eq!(hw.hw_type, "hw-type-chassis");
        assert_eq!(hw.part_number, "ISR4331/K9");
        assert_eq!(hw.serial_number, "FDO21520TBB");
        assert!(hw.field_replaceable);
        assert_eq!(hw.timestamps, 1_700_000_000);

        assert_eq!(sys_rows.len(), 1);
        let sys = &sys_rows[0];
        assert_eq!(sys.sw_version, "16.11.1");
        assert_eq!(sys.last_seen_epoch, 1_700_000_000);
        assert_eq!(sys.boot_time_epoch, 1_698_796_800);
    }

    #[test]
    fn empty_leaves_keep_placeholders() {
        let msg = envelope(
            ENCODING_PATH,
            "10.0.0.1",
            1,
            vec![container(
                "device-hardware-data",
                vec![container(
                    "device-inventory",
                    vec![str_leaf("hw-type", ""), str_leaf("serial-number", "X")],
                )],
            )],
        );

        let (hw_rows, _) = record(&msg, 1, "10.0.0.1");
        assert_eq!(hw_rows[0].hw_type, "N/A");
        assert_eq!(hw_rows[0].serial_number, "X");
    }

    #[test]
    fn bad_timestamps_default_to_zero() {
        let msg = envelope(
            ENCODING_PATH,
            "10.0.0.1",
            1,
            vec![container(
                "device-hardware-data",
                vec![container(
                    "device-system-data",
                    vec![str_leaf("current-time", "yesterday-ish")],
                )],
            )],
        );

        let (_, sys_rows) = record(&msg, 1, "10.0.0.1");
        assert_eq!(sys_rows[0].last_seen_epoch, 0);
    }
}
