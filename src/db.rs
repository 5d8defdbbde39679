//! SQLite connection management with daily file rotation.
//!
//! The store writes to `co-atc-YYYY-MM-DD.sqlite` under the configured base
//! path. `Database::pool()` hands out the pool for the current UTC date,
//! opening (and initializing) a fresh file when the date rolls over.
//! Retention is rotation: old files are simply left behind.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use diesel::SqliteConnection;
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS adsb_targets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hex TEXT NOT NULL,
    flight TEXT NOT NULL DEFAULT '',
    lat DOUBLE NOT NULL,
    lon DOUBLE NOT NULL,
    alt_baro DOUBLE NOT NULL DEFAULT 0,
    alt_geom DOUBLE NOT NULL DEFAULT 0,
    gs DOUBLE NOT NULL DEFAULT 0,
    tas DOUBLE NOT NULL DEFAULT 0,
    true_heading DOUBLE NOT NULL DEFAULT 0,
    mag_heading DOUBLE NOT NULL DEFAULT 0,
    track DOUBLE NOT NULL DEFAULT 0,
    baro_rate DOUBLE NOT NULL DEFAULT 0,
    squawk TEXT NOT NULL DEFAULT '',
    category TEXT NOT NULL DEFAULT '',
    on_ground BOOLEAN NOT NULL DEFAULT 0,
    source TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_adsb_targets_hex_ts ON adsb_targets (hex, timestamp);

CREATE TABLE IF NOT EXISTS phase_changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    hex TEXT NOT NULL,
    flight TEXT NOT NULL DEFAULT '',
    phase TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    event_type TEXT,
    adsb_id INTEGER
);
CREATE INDEX IF NOT EXISTS idx_phase_changes_hex_ts ON phase_changes (hex, timestamp);
"#;

/// Daily-rotating database handle. Cheap to clone via the pool inside.
pub struct Database {
    base_path: PathBuf,
    current: Mutex<(NaiveDate, SqlitePool)>,
}

impl Database {
    /// Open (or create) today's database file. Failure here is fatal at
    /// startup.
    pub fn open(base_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("failed to create storage dir {}", base_path.display()))?;
        let today = Utc::now().date_naive();
        let pool = open_pool(base_path, today)?;
        Ok(Self {
            base_path: base_path.to_path_buf(),
            current: Mutex::new((today, pool)),
        })
    }

    /// Pool for the current UTC date, rotating the file when the day rolls
    /// over. Rotation failure keeps the previous day's pool so writes keep
    /// landing somewhere.
    pub fn pool(&self) -> SqlitePool {
        let today = Utc::now().date_naive();
        let mut guard = self.current.lock().expect("database mutex poisoned");
        if guard.0 != today {
            match open_pool(&self.base_path, today) {
                Ok(pool) => {
                    info!("rotated database to {}", file_name(today));
                    *guard = (today, pool);
                }
                Err(e) => {
                    tracing::error!("database rotation failed, staying on {}: {e:#}", guard.0);
                }
            }
        }
        guard.1.clone()
    }

    /// Path of the file currently being written
    pub fn current_path(&self) -> PathBuf {
        let guard = self.current.lock().expect("database mutex poisoned");
        self.base_path.join(file_name(guard.0))
    }
}

fn file_name(date: NaiveDate) -> String {
    format!("co-atc-{}.sqlite", date.format("%Y-%m-%d"))
}

/// Applied to every pooled connection. WAL keeps the single writer from
/// blocking API readers; the busy timeout covers writer/reader overlap.
#[derive(Debug)]
struct ConnectionOptions;

impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error>
    for ConnectionOptions
{
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

fn open_pool(base_path: &Path, date: NaiveDate) -> Result<SqlitePool> {
    let path = base_path.join(file_name(date));
    let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy().to_string());
    let pool = Pool::builder()
        .max_size(4)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .with_context(|| format!("failed to open database {}", path.display()))?;

    let mut conn = pool.get().context("failed to check out connection")?;
    conn.batch_execute(SCHEMA_DDL)
        .context("failed to initialize schema")?;

    Ok(pool)
}
