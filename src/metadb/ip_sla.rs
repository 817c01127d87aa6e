//! IP SLA configuration rows, keyed on `(device_id, entry_id)`.

use log::error;

use super::{stale_keys, DbError, MetaDb};

#[derive(Debug, Clone, PartialEq)]
pub struct IpSlaEntryRow {
    pub device_id: String,
    pub timestamps: i64,
    pub entry_id: i64,
    pub destination_ip: String,
    pub destination_port: i64,
    pub source_ip: String,
    pub source_port: i64,
    pub vrf: String,
    pub frequency: i64,
    pub sla_type: String,
    pub dscp: String,
    pub class_of_service: String,
    pub req_data_size: i64,
    pub http_url: String,
    pub http_version: String,
    pub http_proxy: String,
    pub http_dns_server: String,
    pub destination_host: String,
}

const UPSERT: &str = "INSERT INTO ip_sla_config_meta \
                      (device_id, timestamps, entry_id, destination_ip, \
                      destination_port, source_ip, source_port, \
                      vrf, frequency, type, \
                      dscp, class_of_service, req_data_size, \
                      http_url, http_version, http_proxy, http_dns_server, destination_host) \
                      VALUES \
                      ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
                      ON CONFLICT (device_id, entry_id) \
                      DO UPDATE SET \
                      destination_ip = EXCLUDED.destination_ip, \
                      destination_port = EXCLUDED.destination_port, \
                      source_ip = EXCLUDED.source_ip, \
                      source_port = EXCLUDED.source_port, \
                      vrf = EXCLUDED.vrf, \
                      frequency = EXCLUDED.frequency, \
                      type = EXCLUDED.type, \
                      dscp = EXCLUDED.dscp, \
                      class_of_service = EXCLUDED.class_of_service, \
                      req_data_size = EXCLUDED.req_data_size, \
                      http_url = EXCLUDED.http_url, \
                      http_proxy = EXCLUDED.http_proxy, \
                      http_dns_server = EXCLUDED.http_dns_server, \
                      http_version = EXCLUDED.http_version, \
                      timestamps = EXCLUDED.timestamps, \
                      destination_host = EXCLUDED.destination_host";

const FETCH_KEYS: &str = "SELECT entry_id FROM ip_sla_config_meta WHERE device_id = $1";

const DELETE: &str = "DELETE FROM ip_sla_config_meta \
                      WHERE device_id = $1 AND entry_id = $2";

impl MetaDb {
    pub async fn persist_ip_sla_entries(
        &self,
        rows: &[IpSlaEntryRow],
        device: &str,
    ) -> Result<(), DbError> {
        if rows.is_empty() {
            return Ok(());
        }

        let existing = match self.fetch_ip_sla_entry_ids(device).await {
            Ok(ids) => Some(ids),
            Err(e) => {
                error!("failed to fetch IP SLA rows for {device}: {e}");
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
                        &row.entry_id,
                        &row.destination_ip,
                        &row.destination_port,
                        &row.source_ip,
                        &row.source_port,
                        &row.vrf,
                        &row.frequency,
                        &row.sla_type,
                        &row.dscp,
                        &row.class_of_service,
                        &row.req_data_size,
                        &row.http_url,
                        &row.http_version,
                        &row.http_proxy,
                        &row.http_dns_server,
                        &row.destination_host,
                    ],
                )
                .await?;
            }
            tx.commit().await
        })
        .await?;

        if let Some(existing) = existing {
            let observed: Vec<i64> = rows.iter().map(|r| r.entry_id).collect();
            for entry in stale_keys(existing, &observed) {
                if let Err(e) = self.delete_ip_sla_entry(device, entry).await {
                    error!("failed to delete IP SLA entry {entry} on {device}: {e}");
                }
            }
        }

        Ok(())
    }

    async fn fetch_ip_sla_entry_ids(&self, device: &str) -> Result<Vec<i64>, DbError> {
        let conn = self.conn().await?;
        let rows = self
            .deadline(conn.query(FETCH_KEYS, &[&device]))
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn delete_ip_sla_entry(&self, device: &str, entry: i64) -> Result<(), DbError> {
        let conn = self.conn().await?;
        self.deadline(conn.execute(DELETE, &[&device, &entry]))
            .await?;
        Ok(())
    }
}
