//! SQLite-backed time series storage for telemetry snapshots.
//!
//! Six append-only series tables (cpu, mem, gpu, disk, net, fan), each keyed
//! by epoch-second `ts`. The store owns the schema lifecycle, writes whole
//! snapshots atomically, serves windowed history reads, and prunes by
//! retention cutoff.
//!
//! A dashboard process reads concurrently by opening its own store on the
//! same path; WAL journal mode plus a busy timeout cover that without any
//! isolation guarantee beyond SQLite's own.


use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::Result;
use crate::snapshot::Snapshot;

/// Series and lookup table definitions. Everything is `IF NOT EXISTS` so the
/// schema converges no matter how many times it runs.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS cpu_samples (
    ts INTEGER NOT NULL,
    total_util REAL,
    iowait REAL,
    per_core TEXT,
    cpu_temp REAL,
    load1 REAL,
    load5 REAL,
    load15 REAL,
    uptime_sec REAL
);
CREATE TABLE IF NOT EXISTS mem_samples (
    ts INTEGER NOT NULL,
    used_percent REAL,
    used_bytes INTEGER,
    total_bytes INTEGER,
    swap_used_percent REAL
);
CREATE TABLE IF NOT EXISTS gpu_samples (
    ts INTEGER NOT NULL,
    gpu_index INTEGER,
    temp REAL,
    util REAL,
    power_w REAL,
    vram_used_mb INTEGER,
    vram_total_mb INTEGER,
    fan_percent REAL
);
CREATE TABLE IF NOT EXISTS disk_samples (
    ts INTEGER NOT NULL,
    device TEXT,
    read_bps REAL,
    write_bps REAL,
    usage_percent REAL
);
CREATE TABLE IF NOT EXISTS net_samples (
    ts INTEGER NOT NULL,
    iface TEXT,
    rx_bps REAL,
    tx_bps REAL
);
CREATE TABLE IF NOT EXISTS fan_samples (
    ts INTEGER NOT NULL,
    label TEXT,
    rpm REAL
);
CREATE TABLE IF NOT EXISTS dashboard_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS gpu_labels (
    gpu_index INTEGER PRIMARY KEY,
    label TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS gpu_visibility (
    gpu_index INTEGER PRIMARY KEY,
    hidden INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cpu_ts ON cpu_samples(ts);
CREATE INDEX IF NOT EXISTS idx_mem_ts ON mem_samples(ts);
CREATE INDEX IF NOT EXISTS idx_gpu_ts ON gpu_samples(ts);
CREATE INDEX IF NOT EXISTS idx_disk_ts ON disk_samples(ts);
CREATE INDEX IF NOT EXISTS idx_net_ts ON net_samples(ts);
CREATE INDEX IF NOT EXISTS idx_fan_ts ON fan_samples(ts);
";

/// The six series tables, in purge order.
const SERIES_TABLES: [&str; 6] =
    ["cpu_samples", "mem_samples", "gpu_samples", "disk_samples", "net_samples", "fan_samples"];

/// One joined CPU+memory history row.
///
/// A `ts` present in only one of the two series still appears; the other
/// series' columns are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuMemPoint {
    pub ts: i64,
    /// Human-readable rendering of `ts`, for plotting.
    pub timestamp: String,
    pub total_util: Option<f64>,
    pub cpu_temp: Option<f64>,
    pub used_percent: Option<f64>,
    pub swap_used_percent: Option<f64>,
}

/// One GPU history row.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuPoint {
    pub ts: i64,
    pub timestamp: String,
    pub gpu_index: u32,
    pub temp: f64,
    pub util: f64,
    pub power_w: f64,
    pub vram_used_mb: i64,
    pub vram_total_mb: i64,
    pub fan_percent: f64,
}

/// Per-table deleted-row counts from a purge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PurgeResult {
    pub cpu: usize,
    pub mem: usize,
    pub gpu: usize,
    pub disk: usize,
    pub net: usize,
    pub fan: usize,
}

impl PurgeResult {
    /// Total rows deleted across all series.
    pub fn total(&self) -> usize {
        self.cpu + self.mem + self.gpu + self.disk + self.net + self.fan
    }
}

/// Handle to the telemetry database.
///
/// Construction runs schema initialization, so a live store is always fully
/// initialized; there is no separate "is the schema ready" state to go stale
/// across reconnects.
pub struct MetricsStore {
    conn: Connection,
}

impl MetricsStore {
    /// Open (creating if necessary) the database at `path` and converge the
    /// schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        let store = MetricsStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = MetricsStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create tables and indexes if they don't already exist, and apply
    /// additive column evolution. Safe to invoke any number of times.
    pub fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;

        // user_pct/system_pct were added after cpu_samples first shipped, so
        // they are grown in-place on databases that predate them.
        self.ensure_column("cpu_samples", "user_pct", "REAL")?;
        self.ensure_column("cpu_samples", "system_pct", "REAL")?;

        debug!("telemetry schema initialized");
        Ok(())
    }

    /// Additive-only schema evolution: add `column` to `table`, swallowing
    /// the duplicate-column error from databases that already have it.
    fn ensure_column(&self, table: &str, column: &str, definition: &str) -> Result<()> {
        let sql = format!("ALTER TABLE {table} ADD COLUMN {column} {definition}");
        match self.conn.execute(&sql, []) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(_, Some(ref msg)))
                if msg.contains("duplicate column name") =>
            {
                Ok(())
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Append a whole snapshot as one atomic unit.
    ///
    /// Writes one CPU row, one memory row, one row per valid GPU reading
    /// (failed readings are skipped individually), one row per disk device,
    /// one per network interface, and one per fan label, all tagged with the
    /// snapshot's `ts`. All-or-nothing: if any statement fails the
    /// transaction rolls back and no row of this snapshot becomes visible.
    pub fn insert_snapshot(&mut self, snap: &Snapshot) -> Result<()> {
        let tx = self.conn.transaction()?;

        let per_core = serde_json::to_string(&snap.cpu.per_core).unwrap_or_else(|_| "[]".to_string());
        tx.execute(
            "INSERT INTO cpu_samples
             (ts, total_util, iowait, per_core, cpu_temp, load1, load5, load15, uptime_sec, user_pct, system_pct)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                snap.ts,
                snap.cpu.total_util,
                snap.cpu.iowait,
                per_core,
                snap.cpu.temp,
                snap.cpu.load1,
                snap.cpu.load5,
                snap.cpu.load15,
                snap.cpu.uptime_sec,
                snap.cpu.user_pct,
                snap.cpu.system_pct,
            ],
        )?;

        tx.execute(
            "INSERT INTO mem_samples (ts, used_percent, used_bytes, total_bytes, swap_used_percent)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snap.ts,
                snap.mem.used_percent,
                snap.mem.used_bytes as i64,
                snap.mem.total_bytes as i64,
                snap.mem.swap_used_percent,
            ],
        )?;

        {
            let mut gpu_stmt = tx.prepare(
                "INSERT INTO gpu_samples
                 (ts, gpu_index, temp, util, power_w, vram_used_mb, vram_total_mb, fan_percent)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for gpu in snap.valid_gpus() {
                gpu_stmt.execute(params![
                    snap.ts,
                    gpu.index,
                    gpu.temp,
                    gpu.util,
                    gpu.power_w,
                    gpu.vram_used_mb,
                    gpu.vram_total_mb,
                    gpu.fan_percent,
                ])?;
            }

            let mut disk_stmt = tx.prepare(
                "INSERT INTO disk_samples (ts, device, read_bps, write_bps, usage_percent)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (device, tp) in &snap.disk.throughput {
                disk_stmt.execute(params![
                    snap.ts,
                    device,
                    tp.read_bps,
                    tp.write_bps,
                    snap.disk.usage_percent,
                ])?;
            }

            let mut net_stmt = tx.prepare(
                "INSERT INTO net_samples (ts, iface, rx_bps, tx_bps) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (iface, tp) in &snap.net.throughput {
                net_stmt.execute(params![snap.ts, iface, tp.rx_bps, tp.tx_bps])?;
            }

            let mut fan_stmt =
                tx.prepare("INSERT INTO fan_samples (ts, label, rpm) VALUES (?1, ?2, ?3)")?;
            for (label, rpm) in &snap.fans {
                fan_stmt.execute(params![snap.ts, label, rpm])?;
            }
        }

        tx.commit()?;
        debug!(ts = snap.ts, "snapshot committed");
        Ok(())
    }

    /// CPU+memory history for the last `window_minutes` minutes.
    pub fn cpu_mem_history(&self, window_minutes: u32) -> Result<Vec<CpuMemPoint>> {
        self.cpu_mem_history_since(now_epoch() - i64::from(window_minutes) * 60)
    }

    /// CPU+memory history for `ts >= since_ts`, ordered ascending.
    ///
    /// The two series are combined by equal `ts` with full outer join
    /// semantics: a tick present in only one series still appears, with the
    /// other side's columns `None`.
    pub fn cpu_mem_history_since(&self, since_ts: i64) -> Result<Vec<CpuMemPoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT ts, total_util, cpu_temp, used_percent, swap_used_percent
             FROM cpu_samples
             FULL OUTER JOIN mem_samples USING (ts)
             WHERE ts >= ?1
             ORDER BY ts ASC",
        )?;
        let rows = stmt.query_map([since_ts], |row| {
            let ts: i64 = row.get(0)?;
            Ok(CpuMemPoint {
                ts,
                timestamp: human_timestamp(ts),
                total_util: row.get(1)?,
                cpu_temp: row.get(2)?,
                used_percent: row.get(3)?,
                swap_used_percent: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// GPU history for the last `window_minutes` minutes.
    pub fn gpu_history(&self, window_minutes: u32) -> Result<Vec<GpuPoint>> {
        self.gpu_history_since(now_epoch() - i64::from(window_minutes) * 60)
    }

    /// GPU history for `ts >= since_ts`: one row per `(ts, gpu_index)`,
    /// ordered ascending by `ts`.
    pub fn gpu_history_since(&self, since_ts: i64) -> Result<Vec<GpuPoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT ts, gpu_index, temp, util, power_w, vram_used_mb, vram_total_mb, fan_percent
             FROM gpu_samples
             WHERE ts >= ?1
             ORDER BY ts ASC, gpu_index ASC",
        )?;
        let rows = stmt.query_map([since_ts], |row| {
            let ts: i64 = row.get(0)?;
            Ok(GpuPoint {
                ts,
                timestamp: human_timestamp(ts),
                gpu_index: row.get(1)?,
                temp: row.get(2)?,
                util: row.get(3)?,
                power_w: row.get(4)?,
                vram_used_mb: row.get(5)?,
                vram_total_mb: row.get(6)?,
                fan_percent: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Delete all rows strictly older than `cutoff_ts` from every series.
    ///
    /// Each table is its own unit of work rather than one spanning
    /// transaction; a crash mid-purge leaves a partially pruned set of
    /// tables, which a re-run completes. Idempotent.
    pub fn purge_before(&self, cutoff_ts: i64) -> Result<PurgeResult> {
        let mut result = PurgeResult::default();
        for table in SERIES_TABLES {
            let deleted =
                self.conn.execute(&format!("DELETE FROM {table} WHERE ts < ?1"), [cutoff_ts])?;
            match table {
                "cpu_samples" => result.cpu = deleted,
                "mem_samples" => result.mem = deleted,
                "gpu_samples" => result.gpu = deleted,
                "disk_samples" => result.disk = deleted,
                "net_samples" => result.net = deleted,
                _ => result.fan = deleted,
            }
        }
        if result.total() > 0 {
            info!(cutoff = cutoff_ts, deleted = result.total(), "purged telemetry rows");
        }
        Ok(result)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Row count per series table. Diagnostic surface for the dashboard.
    pub fn series_counts(&self) -> Result<BTreeMap<String, i64>> {
        let mut counts = BTreeMap::new();
        for table in SERIES_TABLES {
            let n: i64 =
                self.conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            counts.insert(table.to_string(), n);
        }
        Ok(counts)
    }
}

/// Current wall clock as epoch seconds.
pub(crate) fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Render epoch seconds as a UTC timestamp string for display.
fn human_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}
