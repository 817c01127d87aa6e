//! BGP neighbor and address-family rows.
//!
//! Neighbors key on `(device_id, neighbor_id, address_family_type,
//! address_family_vrf)`; address families on `(device_id, afi_type,
//! vrf_name)`.

use log::error;

use super::{stale_keys, DbError, MetaDb};

#[derive(Debug, Clone, PartialEq)]
pub struct BgpNeighborRow {
    pub device_id: String,
    pub timestamps: i64,
    pub neighbor_id: String,
    pub address_family_type: String,
    pub address_family_vrf: String,
    /// FSM state rendered as its dashboard integer ("0".."5").
    pub neighbor_status: String,
    pub uptime: String,
    pub remote_as: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BgpAfiRow {
    pub device_id: String,
    pub timestamps: i64,
    pub afi_type: String,
    pub vrf_name: String,
    pub total_prefixes: i64,
    pub total_paths: i64,
}

const UPSERT_NEIGHBOR: &str = "INSERT INTO bgp_neighbors_meta \
                               (device_id, neighbor_id, address_family_type, timestamps, \
                               address_family_vrf, neighbor_status, uptime, remote_as) \
                               VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                               ON CONFLICT (device_id, neighbor_id, address_family_type, address_family_vrf) \
                               DO UPDATE SET \
                               neighbor_status = EXCLUDED.neighbor_status, \
                               uptime = EXCLUDED.uptime, \
                               remote_as = EXCLUDED.remote_as, \
                               timestamps = EXCLUDED.timestamps";

const FETCH_NEIGHBOR_KEYS: &str = "SELECT neighbor_id, address_family_type, address_family_vrf \
                                   FROM bgp_neighbors_meta WHERE device_id = $1";

const DELETE_NEIGHBOR: &str = "DELETE FROM bgp_neighbors_meta \
                               WHERE device_id = $1 \
                               AND neighbor_id = $2 \
                               AND address_family_type = $3 \
                               AND address_family_vrf = $4";

const UPSERT_AFI: &str = "INSERT INTO bgp_afi_meta \
                          (device_id, timestamps, afi_type, vrf_name, \
                          total_prefixes, total_paths) \
                          VALUES ($1, $2, $3, $4, $5, $6) \
                          ON CONFLICT (device_id, afi_type, vrf_name) \
                          DO UPDATE SET \
                          total_prefixes = EXCLUDED.total_prefixes, \
                          total_paths = EXCLUDED.total_paths, \
                          timestamps = EXCLUDED.timestamps";

const FETCH_AFI_KEYS: &str =
    "SELECT afi_type, vrf_name FROM bgp_afi_meta WHERE device_id = $1";

const DELETE_AFI: &str = "DELETE FROM bgp_afi_meta \
                          WHERE device_id = $1 AND afi_type = $2 AND vrf_name = $3";

impl MetaDb {
    pub async fn persist_bgp_neighbors(
        &self,
        rows: &[BgpNeighborRow],
        device: &str,
    ) -> Result<(), DbError> {
        if rows.is_empty() {
            return Ok(());
        }

        let existing = match self.fetch_bgp_neighbor_keys(device).await {
            Ok(keys) => Some(keys),
            Err(e) => {
                error!("failed to fetch BGP neighbor rows for {device}: {e}");
                None
            }
        };

        let mut conn = self.conn().await?;
        self.deadline(async {
            let tx = conn.transaction().await?;
            let stmt = tx.prepare(UPSERT_NEIGHBOR).await?;
            for row in rows {
                tx.execute(
                    &stmt,
                    &[
                        &row.device_id,
                        &row.neighbor_id,
                        &row.address_family_type,
                        &row.timestamps,
                        &row.address_family_vrf,
                        &row.neighbor_status,
                        &row.uptime,
                        &row.remote_as,
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
                        r.neighbor_id.clone(),
                        r.address_family_type.clone(),
                        r.address_family_vrf.clone(),
                    )
                })
                .collect();
            for (neighbor, afi, vrf) in stale_keys(existing, &observed) {
                if let Err(e) = self.delete_bgp_neighbor(device, &neighbor, &afi, &vrf).await {
                    error!("failed to delete BGP neighbor {neighbor} on {device}: {e}");
                }
            }
        }

        Ok(())
    }

    pub async fn persist_bgp_afis(
        &self,
        rows: &[BgpAfiRow],
        device: &str,
    ) -> Result<(), DbError> {
        if rows.is_empty() {
            return Ok(());
        }

        let existing = match self.fetch_bgp_afi_keys(device).await {
            Ok(keys) => Some(keys),
            Err(e) => {
                error!("failed to fetch BGP AFI rows for {device}: {e}");
                None
            }
        };

        let mut conn = self.conn().await?;
        self.deadline(async {
            let tx = conn.transaction().await?;
            let stmt = tx.prepare(UPSERT_AFI).await?;
            for row in rows {
                tx.execute(
                    &stmt,
                    &[
                        &row.device_id,
                        &row.timestamps,
                        &row.afi_type,
                        &row.vrf_name,
                        &row.total_prefixes,
                        &row.total_paths,
                    ],
                )
                .await?;
            }
            tx.commit().await
        })
        .await?;

        if let Some(existing) = existing {
            let observed: Vec<(String, String)> = rows
                .iter()
                .map(|r| (r.afi_type.clone(), r.vrf_name.clone()))
                .collect();
            for (afi, vrf) in stale_keys(existing, &observed) {
                if let Err(e) = self.delete_bgp_afi(device, &afi, &vrf).await {
                    error!("failed to delete BGP AFI {afi}/{vrf} on {device}: {e}");
                }
            }
        }

        Ok(())
    }

    async fn fetch_bgp_neighbor_keys(
        &self,
        device: &str,
    ) -> Result<Vec<(String, String, String)>, DbError> {
        let conn = self.conn().await?;
        let rows = self
            .deadline(conn.query(FETCH_NEIGHBOR_KEYS, &[&device]))
            .await?;
        Ok(rows
            .iter()
            .map(|r| (r.get(0), r.get(1), r.get(2)))
            .collect())
    }

    async fn delete_bgp_neighbor(
        &self,
        device: &str,
        neighbor: &str,
        afi: &str,
        vrf: &str,
    ) -> Result<(), DbError> {
        let conn = self.conn().await?;
        self.deadline(conn.execute(DELETE_NEIGHBOR, &[&device, &neighbor, &afi, &vrf]))
            .await?;
        Ok(())
    }

    async fn fetch_bgp_afi_keys(&self, device: &str) -> Result<Vec<(String, String)>, DbError> {
        let conn = self.conn().await?;
        let rows = self
            .deadline(conn.query(FETCH_AFI_KEYS, &[&device]))
            .await?;
        Ok(rows.iter().map(|r| (r.get(0), r.get(1))).collect())
    }

    async fn delete_bgp_afi(&self, device: &str, afi: &str, vrf: &str) -> Result<(), DbError> {
        let conn = self.conn().await?;
        self.deadline(conn.execute(DELETE_AFI, &[&device, &afi, &vrf]))
            .await?;
        Ok(())
    }
}
