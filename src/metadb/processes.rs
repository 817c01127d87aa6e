//! Per-process CPU and memory rows, keyed on `(device_id, process name)`.

use log::error;

use super::{stale_keys, DbError, MetaDb};

#[derive(Debug, Clone, PartialEq)]
pub struct CpuProcessRow {
    pub device_id: String,
    pub timestamps: i64,
    pub name: String,
    pub pid: i64,
    pub avg_runtime: i64,
    pub busy_5_sec: f64,
    pub busy_1_min: f64,
    pub busy_5_min: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemProcessRow {
    pub device_id: String,
    pub timestamps: i64,
    pub name: String,
    pub pid: i64,
    pub allocated_memory: i64,
    pub freed_memory: i64,
    pub holding_memory: i64,
}

const UPSERT_CPU: &str = "INSERT INTO cpu_processes_meta \
                          (device_id, timestamps, cpu_process_name, cpu_process_pid, \
                          cpu_proc_avg_runtime, cpu_proc_busy_avg_5_sec, \
                          cpu_proc_busy_avg_1_min, cpu_proc_busy_avg_5_min) \
                          VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                          ON CONFLICT (device_id, cpu_process_name) \
                          DO UPDATE SET \
                          cpu_process_pid = EXCLUDED.cpu_process_pid, \
                          cpu_proc_avg_runtime = EXCLUDED.cpu_proc_avg_runtime, \
                          cpu_proc_busy_avg_5_sec = EXCLUDED.cpu_proc_busy_avg_5_sec, \
                          cpu_proc_busy_avg_1_min = EXCLUDED.cpu_proc_busy_avg_1_min, \
                          cpu_proc_busy_avg_5_min = EXCLUDED.cpu_proc_busy_avg_5_min, \
                          timestamps = EXCLUDED.timestamps";

const FETCH_CPU_KEYS: &str =
    "SELECT cpu_process_name FROM cpu_processes_meta WHERE device_id = $1";

const DELETE_CPU: &str = "DELETE FROM cpu_processes_meta \
                          WHERE device_id = $1 AND cpu_process_name = $2";

const UPSERT_MEM: &str = "INSERT INTO mem_processes_meta \
                          (device_id, timestamps, mem_process_name, mem_process_pid, \
                          allocated_memory, freed_memory, holding_memory) \
                          VALUES ($1, $2, $3, $4, $5, $6, $7) \
                          ON CONFLICT (device_id, mem_process_name) \
                          DO UPDATE SET \
                          mem_process_pid = EXCLUDED.mem_process_pid, \
                          allocated_memory = EXCLUDED.allocated_memory, \
                          freed_memory = EXCLUDED.freed_memory, \
                          holding_memory = EXCLUDED.holding_memory, \
                          timestamps = EXCLUDED.timestamps";

const FETCH_MEM_KEYS: &str =
    "SELECT mem_process_name FROM mem_processes_meta WHERE device_id = $1";

const DELETE_MEM: &str = "DELETE FROM mem_processes_meta \
                          WHERE device_id = $1 AND mem_process_name = $2";

impl MetaDb {
    pub async fn persist_cpu_processes(
        &self,
        rows: &[CpuProcessRow],
        device: &str,
    ) -> Result<(), DbError> {
        if rows.is_empty() {
            return Ok(());
        }

        let existing = match self.fetch_cpu_process_names(device).await {
            Ok(names) => Some(names),
            Err(e) => {
                error!("failed to fetch CPU process rows for {device}: {e}");
                None
            }
        };

        let mut conn = self.conn().await?;
        self.deadline(async {
            let tx = conn.transaction().await?;
            let stmt = tx.prepare(UPSERT_CPU).await?;
            for row in rows {
                tx.execute(
                    &stmt,
                    &[
                        &row.device_id,
                        &row.timestamps,
                        &row.name,
                        &row.pid,
                        &row.avg_runtime,
                        &row.busy_5_sec,
                        &row.busy_1_min,
                        &row.busy_5_min,
                    ],
                )
                .await?;
            }
            tx.commit().await
        })
        .await?;

        if let Some(existing) = existing {
            let observed: Vec<String> = rows.iter().map(|r| r.name.clone()).collect();
            for name in stale_keys(existing, &observed) {
                if let Err(e) = self.delete_cpu_process(device, &name).await {
                    error!("failed to delete CPU process {name} on {device}: {e}");
                }
            }
        }

        Ok(())
    }

    pub async fn persist_mem_processes(
        &self,
        rows: &[MemProcessRow],
        device: &str,
    ) -> Result<(), DbError> {
        if rows.is_empty() {
            return Ok(());
        }

        let existing = match self.fetch_mem_process_names(device).await {
            Ok(names) => Some(names),
            Err(e) => {
                error!("failed to fetch memory process rows for {device}: {e}");
                None
            }
        };

        let mut conn = self.conn().await?;
        self.deadline(async {
            let tx = conn.transaction().await?;
            let stmt = tx.prepare(UPSERT_MEM).await?;
            for row in rows {
                tx.execute(
                    &stmt,
                    &[
                        &row.device_id,
                        &row.timestamps,
                        &row.name,
                        &row.pid,
                        &row.allocated_memory,
                        &row.freed_memory,
                        &row.holding_memory,
                    ],
                )
                .await?;
            }
            tx.commit().await
        })
        .await?;

        if let Some(existing) = existing {
            let observed: Vec<String> = rows.iter().map(|r| r.name.clone()).collect();
            for name in stale_keys(existing, &observed) {
                if let Err(e) = self.delete_mem_process(device, &name).await {
                    error!("failed to delete memory process {name} on {device}: {e}");
                }
            }
        }

        Ok(())
    }

    async fn fetch_cpu_process_names(&self, device: &str) -> Result<Vec<String>, DbError> {
        let conn = self.conn().await?;
        let rows = self
            .deadline(conn.query(FETCH_CPU_KEYS, &[&device]))
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn delete_cpu_process(&self, device: &str, name: &str) -> Result<(), DbError> {
        let conn = self.conn().await?;
        self.deadline(conn.execute(DELETE_CPU, &[&device, &name]))
            .await?;
        Ok(())
    }

    async fn fetch_mem_process_names(&self, device: &str) -> Result<Vec<String>, DbError> {
        let conn = self.conn().await?;
        let rows = self
            .deadline(conn.query(FETCH_MEM_KEYS, &[&device]))
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn delete_mem_process(&self, device: &str, name: &str) -> Result<(), DbError> {
        let conn = self.conn().await?;
        self.deadline(conn.execute(DELETE_MEM, &[&device, &name]))
            .await?;
        Ok(())
    }
}
