//! Interface attribute rows, keyed on `(device_id, interface_name)`.

use log::error;

use super::{stale_keys, DbError, MetaDb};

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceRow {
    pub device_id: String,
    pub timestamps: i64,
    pub interface_name: String,
    pub description: String,
    /// Rendered as `address/prefix-length` text.
    pub ipv4: String,
    pub admin_status: String,
    pub oper_status: String,
    pub speed: i64,
    pub mtu: i64,
    pub physical_address: String,
    pub vrf: String,
    pub last_change: String,
}

const UPSERT: &str = "INSERT INTO interface_meta \
                      (device_id, timestamps, interface_name, description, \
                      ipv4_address, admin_status, oper_status, \
                      speed, mtu, physical_address, \
                      vrf_attached, last_status_change) \
                      VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
                      ON CONFLICT (device_id, interface_name) \
                      DO UPDATE SET \
                      description = EXCLUDED.description, \
                      ipv4_address = EXCLUDED.ipv4_address, \
                      admin_status = EXCLUDED.admin_status, \
                      oper_status = EXCLUDED.oper_status, \
                      speed = EXCLUDED.speed, \
                      mtu = EXCLUDED.mtu, \
                      physical_address = EXCLUDED.physical_address, \
                      vrf_attached = EXCLUDED.vrf_attached, \
                      last_status_change = EXCLUDED.last_status_change, \
                      timestamps = EXCLUDED.timestamps";

const FETCH_KEYS: &str = "SELECT interface_name FROM interface_meta WHERE device_id = $1";

const DELETE: &str = "DELETE FROM interface_meta \
                      WHERE device_id = $1 AND interface_name = $2";

impl MetaDb {
    /// Reconciles the device's interface set: upserts every observed
    /// interface, then deletes catalog interfaces the device no longer
    /// reports.
    pub async fn persist_interfaces(
        &self,
        rows: &[InterfaceRow],
        device: &str,
    ) -> Result<(), DbError> {
        if rows.is_empty() {
            return Ok(());
        }

        let existing = match self.fetch_interface_names(device).await {
            Ok(names) => Some(names),
            Err(e) => {
                error!("failed to fetch interface rows for {device}: {e}");
                None
            }
        };

        let mut conn = self.conn().await?;
        self.deadline(async {
            let tx = conn.transaction().await?;
            let stmt = tx.prepare(UPSERT).await?;
            for row in rows {
                tx.execute(
                    &stmt,
                    &[
                        &row.device_id,
                        &row.timestamps,
                        &row.interface_name,
                        &row.description,
                        &row.ipv4,
                        &row.admin_status,
                        &row.oper_status,
                        &row.speed,
                        &row.mtu,
                        &row.physical_address,
                        &row.vrf,
                        &row.last_change,
                    ],
                )
                .await?;
            }
            tx.commit().await
        })
        .await?;

        if let Some(existing) = existing {
            let observed: Vec<String> = rows.iter().map(|r| r.interface_name.clone()).collect();
            for name in stale_keys(existing, &observed) {
                if let Err(e) = self.delete_interface(device, &name).await {
                    error!("failed to delete interface {name} on {device}: {e}");
                }
            }
        }

        Ok(())
    }

    async fn fetch_interface_names(&self, device: &str) -> Result<Vec<String>, DbError> {
        let conn = self.conn().await?;
        let rows = self
            .deadline(conn.query(FETCH_KEYS, &[&device]))
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn delete_interface(&self, device: &str, name: &str) -> Result<(), DbError> {
        let conn = self.conn().await?;
        self.deadline(conn.execute(DELETE, &[&device, &name]))
            .await?;
        Ok(())
    }
}
