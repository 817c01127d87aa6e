//! Device license row, one per device.

use super::{DbError, MetaDb};

#[derive(Debug, Clone, PartialEq)]
pub struct LicenseRow {
    pub device_id: String,
    pub timestamps: i64,
    pub product_id: String,
    pub serial_number: String,
    pub boot_license: String,
}

const UPSERT: &str = "INSERT INTO device_license_meta \
                      (device_id, timestamps, product_id, \
                      serial_number, boot_license) \
                      VALUES \
                      ($1, $2, $3, $4, $5) \
                      ON CONFLICT (device_id) \
                      DO UPDATE SET \
                      product_id = EXCLUDED.product_id, \
                      serial_number = EXCLUDED.serial_number, \
                      boot_license = EXCLUDED.boot_license, \
                      timestamps = EXCLUDED.timestamps";

impl MetaDb {
    pub async fn persist_license(&self, row: &LicenseRow) -> Result<(), DbError> {
        let conn = self.conn().await?;
        self.deadline(conn.execute(
            UPSERT,
            &[
                &row.device_id,
                &row.timestamps,
                &row.product_id,
                &row.serial_number,
                &row.boot_license,
            ],
        ))
        .await?;
        Ok(())
    }
}
