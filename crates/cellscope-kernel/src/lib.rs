use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Storage layer for the battery-cycling study database.
///
/// Holds only the database path; each call opens a short-lived connection so
/// the handle is cheap to clone and safe to share across tasks. Blocking
/// rusqlite work is wrapped in `spawn_blocking` for async callers.
#[derive(Clone)]
pub struct Store {
    db_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CellMetadata {
    pub file_name: String,
    pub cycle_index_end_of_life: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimeSeriesSample {
    pub file_name: String,
    pub test_time: f64,
    pub voltage: f64,
    pub cell_current: f64,
    pub cycle_index: i64,
    pub step_type: String,
    pub discharge_capacity: f64,
    pub charge_capacity: f64,
}

/// Per-cycle maximum discharge capacity for one file.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CycleCapacity {
    pub file_name: String,
    pub cycle_index: i64,
    pub discharge_capacity: f64,
}

/// Discharge capacity re-indexed by voltage within one cycle.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VoltageSample {
    pub file_name: String,
    pub cycle_index: i64,
    pub voltage: f64,
    pub discharge_capacity: f64,
}

impl Store {
    pub fn open(dir: &Path) -> Result<Self> {
        let db_path = if dir.extension().is_some() {
            dir.to_path_buf()
        } else {
            dir.join("cellscope.sqlite")
        };
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        // Busy timeout (default 5000ms; override with CELLSCOPE_SQLITE_BUSY_MS)
        let busy_ms: u64 = std::env::var("CELLSCOPE_SQLITE_BUSY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5000);
        conn.busy_timeout(std::time::Duration::from_millis(busy_ms))?;
        let _ = conn.pragma_update(None, "temp_store", "MEMORY");
        Self::init_schema(&conn)?;
        tracing::debug!(db = %db_path.display(), "schema ready");
        Ok(Self { db_path })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            -- Dimension: one row per test specimen
            CREATE TABLE IF NOT EXISTS dim_cell_metadata (
              file_name TEXT NOT NULL,
              cycle_index_end_of_life INTEGER NOT NULL,
              source_tag TEXT NOT NULL,
              PRIMARY KEY (file_name, source_tag)
            );

            -- Fact: raw cycler samples, ordered by test_time within a cycle
            CREATE TABLE IF NOT EXISTS fct_time_series (
              file_name TEXT NOT NULL,
              cycle_index INTEGER NOT NULL,
              test_time REAL NOT NULL,
              voltage REAL NOT NULL,
              cell_current REAL NOT NULL,
              step_type TEXT NOT NULL,
              discharge_capacity REAL NOT NULL,
              charge_capacity REAL NOT NULL,
              source_tag TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ts_file_cycle
              ON fct_time_series(file_name, cycle_index);
            CREATE INDEX IF NOT EXISTS idx_ts_source ON fct_time_series(source_tag);

            -- Fact: capacity re-indexed by voltage for cross-cycle alignment
            CREATE TABLE IF NOT EXISTS fct_voltage_series (
              file_name TEXT NOT NULL,
              cycle_index INTEGER NOT NULL,
              voltage REAL NOT NULL,
              discharge_capacity REAL NOT NULL,
              source_tag TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_vs_cycle
              ON fct_voltage_series(source_tag, cycle_index);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<Connection> {
        Ok(Connection::open(&self.db_path)?)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Distinct file names present in the time-series fact table for one
    /// source tag, in database order.
    pub fn list_files(&self, source_tag: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT file_name FROM fct_time_series WHERE source_tag=?")?;
        let mut rows = stmt.query([source_tag])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            out.push(r.get::<_, String>(0)?);
        }
        Ok(out)
    }

    /// Raw samples for one file and cycle, ordered by test time. An unknown
    /// file or cycle yields an empty vec, not an error.
    pub fn time_series(&self, file_name: &str, cycle_index: i64) -> Result<Vec<TimeSeriesSample>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_name,test_time,voltage,cell_current,cycle_index,step_type,discharge_capacity,charge_capacity \
             FROM fct_time_series WHERE file_name=? AND cycle_index=? ORDER BY test_time ASC",
        )?;
        let mut rows = stmt.query(params![file_name, cycle_index])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            out.push(TimeSeriesSample {
                file_name: r.get(0)?,
                test_time: r.get(1)?,
                voltage: r.get(2)?,
                cell_current: r.get(3)?,
                cycle_index: r.get(4)?,
                step_type: r.get(5)?,
                discharge_capacity: r.get(6)?,
                charge_capacity: r.get(7)?,
            });
        }
        Ok(out)
    }

    /// Per (file, cycle) maximum discharge capacity, ordered by file then
    /// cycle. Range filtering and the cycle-life join happen downstream.
    pub fn max_discharge_by_cycle(&self, source_tag: &str) -> Result<Vec<CycleCapacity>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_name, cycle_index, MAX(discharge_capacity) \
             FROM fct_time_series WHERE source_tag=? \
             GROUP BY file_name, cycle_index ORDER BY file_name, cycle_index",
        )?;
        let mut rows = stmt.query([source_tag])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            out.push(CycleCapacity {
                file_name: r.get(0)?,
                cycle_index: r.get(1)?,
                discharge_capacity: r.get(2)?,
            });
        }
        Ok(out)
    }

    /// Voltage-aligned capacity rows for every file at one cycle.
    pub fn voltage_series_at_cycle(
        &self,
        source_tag: &str,
        cycle_index: i64,
    ) -> Result<Vec<VoltageSample>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_name, cycle_index, voltage, discharge_capacity \
             FROM fct_voltage_series WHERE source_tag=? AND cycle_index=? \
             ORDER BY file_name, voltage",
        )?;
        let mut rows = stmt.query(params![source_tag, cycle_index])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            out.push(VoltageSample {
                file_name: r.get(0)?,
                cycle_index: r.get(1)?,
                voltage: r.get(2)?,
                discharge_capacity: r.get(3)?,
            });
        }
        Ok(out)
    }

    /// End-of-life cycle index per file.
    pub fn cell_metadata(&self, source_tag: &str) -> Result<Vec<CellMetadata>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_name, cycle_index_end_of_life FROM dim_cell_metadata WHERE source_tag=?",
        )?;
        let mut rows = stmt.query([source_tag])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            out.push(CellMetadata {
                file_name: r.get(0)?,
                cycle_index_end_of_life: r.get(1)?,
            });
        }
        Ok(out)
    }

    pub fn insert_cell_metadata(
        &self,
        file_name: &str,
        cycle_index_end_of_life: i64,
        source_tag: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO dim_cell_metadata(file_name,cycle_index_end_of_life,source_tag) VALUES(?,?,?)",
            params![file_name, cycle_index_end_of_life, source_tag],
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_time_series_sample(
        &self,
        file_name: &str,
        cycle_index: i64,
        test_time: f64,
        voltage: f64,
        cell_current: f64,
        step_type: &str,
        discharge_capacity: f64,
        charge_capacity: f64,
        source_tag: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO fct_time_series(file_name,cycle_index,test_time,voltage,cell_current,step_type,discharge_capacity,charge_capacity,source_tag) \
             VALUES(?,?,?,?,?,?,?,?,?)",
            params![
                file_name,
                cycle_index,
                test_time,
                voltage,
                cell_current,
                step_type,
                discharge_capacity,
                charge_capacity,
                source_tag
            ],
        )?;
        Ok(())
    }

    pub fn insert_voltage_sample(
        &self,
        file_name: &str,
        cycle_index: i64,
        voltage: f64,
        discharge_capacity: f64,
        source_tag: &str,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO fct_voltage_series(file_name,cycle_index,voltage,discharge_capacity,source_tag) VALUES(?,?,?,?,?)",
            params![file_name, cycle_index, voltage, discharge_capacity, source_tag],
        )?;
        Ok(())
    }

    pub async fn list_files_async(&self, source_tag: &str) -> Result<Vec<String>> {
        let store = self.clone();
        let tag = source_tag.to_string();
        tokio::task::spawn_blocking(move || store.list_files(&tag))
            .await
            .map_err(|e| anyhow!("join error: {}", e))?
    }

    pub async fn time_series_async(
        &self,
        file_name: &str,
        cycle_index: i64,
    ) -> Result<Vec<TimeSeriesSample>> {
        let store = self.clone();
        let file = file_name.to_string();
        tokio::task::spawn_blocking(move || store.time_series(&file, cycle_index))
            .await
            .map_err(|e| anyhow!("join error: {}", e))?
    }

    pub async fn max_discharge_by_cycle_async(&self, source_tag: &str) -> Result<Vec<CycleCapacity>> {
        let store = self.clone();
        let tag = source_tag.to_string();
        tokio::task::spawn_blocking(move || store.max_discharge_by_cycle(&tag))
            .await
            .map_err(|e| anyhow!("join error: {}", e))?
    }

    pub async fn voltage_series_at_cycle_async(
        &self,
        source_tag: &str,
        cycle_index: i64,
    ) -> Result<Vec<VoltageSample>> {
        let store = self.clone();
        let tag = source_tag.to_string();
        tokio::task::spawn_blocking(move || store.voltage_series_at_cycle(&tag, cycle_index))
            .await
            .map_err(|e| anyhow!("join error: {}", e))?
    }

    pub async fn cell_metadata_async(&self, source_tag: &str) -> Result<Vec<CellMetadata>> {
        let store = self.clone();
        let tag = source_tag.to_string();
        tokio::task::spawn_blocking(move || store.cell_metadata(&tag))
            .await
            .map_err(|e| anyhow!("join error: {}", e))?
    }
}
