//! Hardware inventory rows, keyed on `(device_id, hardware_type,
//! hardware_part_number, serial_number)`, plus the single per-device system
//! data row.

use log::error;

use super::{stale_keys, DbError, MetaDb};

#[derive(Debug, Clone, PartialEq)]
pub struct HwInventoryRow {
    pub device_id: String,
    pub timestamps: i64,
    pub hw_type: String,
    pub part_number: String,
    pub description: String,
    pub dev_name: String,
    pub field_replaceable: bool,
    pub version: String,
    pub serial_number: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemDataRow {
    pub device_id: String,
    pub timestamps: i64,
    pub last_seen_epoch: i64,
    pub boot_time_epoch: i64,
    pub sw_version: String,
}

const UPSERT_HW: &str = "INSERT INTO device_hw_info \
                         (device_id, timestamps, hardware_type, hardware_part_number, hardware_description, \
                         hardware_device_name, hardware_field_replaceable, hardware_version, serial_number) \
                         VALUES \
                         ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                         ON CONFLICT (device_id, hardware_type, hardware_part_number, serial_number) \
                         DO UPDATE SET \
                         hardware_description = EXCLUDED.hardware_description, \
                         hardware_device_name = EXCLUDED.hardware_device_name, \
                         hardware_field_replaceable = EXCLUDED.hardware_field_replaceable, \
                         hardware_version = EXCLUDED.hardware_version, \
                         timestamps = EXCLUDED.timestamps";

const FETCH_HW_KEYS: &str = "SELECT hardware_type, hardware_part_number, serial_number \
                             FROM device_hw_info WHERE device_id = $1";

const DELETE_HW: &str = "DELETE FROM device_hw_info \
                         WHERE device_id = $1 \
                         AND hardware_type = $2 \
                         AND hardware_part_number = $3 \
                         AND serial_number = $4";

const UPSERT_SYS: &str = "INSERT INTO device_sys_data \
                          (device_id, timestamps, last_seen_epoch, boot_time_epoch, sw_version) \
                          VALUES \
                          ($1, $2, $3, $4, $5) \
                          ON CONFLICT (device_id) \
                          DO UPDATE SET \
                          last_seen_epoch = EXCLUDED.last_seen_epoch, \
                          boot_time_epoch = EXCLUDED.boot_time_epoch, \
                          sw_version = EXCLUDED.sw_version, \
                          timestamps = EXCLUDED.timestamps";

impl MetaDb {
    pub async fn persist_hw_inventory(
        &self,
        rows: &[HwInventoryRow],
        device: &str,
    ) -> Result<(), DbError> {
        if rows.is_empty() {
            return Ok(());
        }

        let existing = match self.fetch_hw_inventory_keys(device).await {
            Ok(keys) => Some(keys),
            Err(e) => {
                error!("failed to fetch hardware inventory rows for {device}: {e}");
                None
            }
        };

        let mut conn = self.conn().await?;
        self.deadline(async {
            let tx = conn.transaction().await?;
            let stmt = tx.prepare(UPSERT_HW).await?;
            for row in rows {
                tx.execute(
                    &stmt,
                    &[
                        &row.device_id,
                        &row.timestamps,
                        &row.hw_type,
                        &row.part_number,
                        &row.description,
                        &row.dev_name,
                        &row.field_replaceable,
                        &row.version,
                        &row.serial_number,
                    ],
                )
                .await?;
            }
            tx.commit().await
        })
        .await?;

        if let Some(existing) = existing {
            let observed: Vec<(String, String, String)> = rows
                .iter()
                .map(|r| {
                    (
                        r.hw_type.clone(),
                        r.part_number.clone(),
                        r.serial_number.clone(),
                    )
                })
                .collect();
            for (hw_type, part, serial) in stale_keys(existing, &observed) {
                if let Err(e) = self
                    .delete_hw_inventory(device, &hw_type, &part, &serial)
                    .await
                {
                    error!("failed to delete hardware {hw_type}/{serial} on {device}: {e}");
                }
            }
        }

        Ok(())
    }

    pub async fn persist_system_data(&self, rows: &[SystemDataRow]) -> Result<(), DbError> {
        let conn = self.conn().await?;
        for row in rows {
            self.deadline(conn.execute(
                UPSERT_SYS,
                &[
                    &row.device_id,
                    &row.timestamps,
                    &row.last_seen_epoch,
                    &row.boot_time_epoch,
                    &row.sw_version,
                ],
            ))
            .await?;
        }
        Ok(())
    }

    async fn fetch_hw_inventory_keys(
        &self,
        device: &str,
    ) -> Result<Vec<(String, String, String)>, DbError> {
        let conn = self.conn().await?;
        let rows = self
            .deadline(conn.query(FETCH_HW_KEYS, &[&device]))
            .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get(0), r.get(1), r.get(2)))
            .collect())
    }

    async fn delete_hw_inventory(
        &self,
        device: &str,
        hw_type: &str,
        part: &str,
        serial: &str,
    ) -> Result<(), DbError> {
        let conn = self.conn().await?;
        self.deadline(conn.execute(DELETE_HW, &[&device, &hw_type, &part, &serial]))
            .await?;
        Ok(())
    }
}
