use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::models::RequestKind;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS generation_calls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded_at INTEGER NOT NULL,
    kind TEXT NOT NULL,
    latency_ms INTEGER NOT NULL,
    ok INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_generation_calls_recorded_at ON generation_calls(recorded_at);
"#;

const SECS_PER_DAY: i64 = 86_400;

/// Per-call latency and outcome of the generative backend, grouped by request kind.
pub struct MetricsStore {
    conn: Mutex<Connection>,
}

impl MetricsStore {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Best effort; a failed write never affects the request it describes.
    pub fn record(&self, kind: RequestKind, latency_ms: u64, ok: bool) {
        let result = self.lock().execute(
            "INSERT INTO generation_calls (recorded_at, kind, latency_ms, ok) VALUES (?1, ?2, ?3, ?4)",
            params![
                chrono::Utc::now().timestamp(),
                kind.to_string(),
                latency_ms as i64,
                ok
            ],
        );
        if let Err(e) = result {
            tracing::debug!("failed to record generation metrics: {e}");
        }
    }

    /// Aggregate the calls recorded in the last `days` days.
    pub fn summary(&self, days: u32) -> MetricsSummary {
        match self.per_kind(cutoff(days)) {
            Ok(by_kind) => MetricsSummary::from_kinds(by_kind),
            Err(e) => {
                tracing::debug!("failed to read generation metrics: {e}");
                MetricsSummary::default()
            }
        }
    }

    fn per_kind(&self, since: i64) -> Result<Vec<KindMetrics>, rusqlite::Error> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT kind, COUNT(*), SUM(CASE WHEN ok THEN 0 ELSE 1 END), AVG(latency_ms)
             FROM generation_calls
             WHERE recorded_at >= ?1
             GROUP BY kind
             ORDER BY kind",
        )?;
        let rows = stmt.query_map([since], |row| {
            Ok(KindMetrics {
                kind: row.get(0)?,
                requests: row.get::<_, i64>(1)? as u64,
                failures: row.get::<_, i64>(2)? as u64,
                avg_latency_ms: row.get::<_, f64>(3)?.round() as u64,
            })
        })?;
        rows.collect()
    }

    /// Drop rows older than `days` days. Returns how many were removed.
    pub fn prune(&self, days: u32) -> usize {
        self.lock()
            .execute(
                "DELETE FROM generation_calls WHERE recorded_at < ?1",
                [cutoff(days)],
            )
            .unwrap_or(0)
    }
}

fn cutoff(days: u32) -> i64 {
    chrono::Utc::now().timestamp() - i64::from(days) * SECS_PER_DAY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindMetrics {
    pub kind: String,
    pub requests: u64,
    pub failures: u64,
    pub avg_latency_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub avg_latency_ms: u64,
    /// Percentage of failed calls.
    pub error_rate: f32,
    #[serde(default)]
    pub by_kind: Vec<KindMetrics>,
}

impl MetricsSummary {
    fn from_kinds(by_kind: Vec<KindMetrics>) -> Self {
        let total: u64 = by_kind.iter().map(|k| k.requests).sum();
        if total == 0 {
            return Self::default();
        }
        let failures: u64 = by_kind.iter().map(|k| k.failures).sum();
        let weighted: u64 = by_kind.iter().map(|k| k.avg_latency_ms * k.requests).sum();
        Self {
            total_requests: total,
            avg_latency_ms: weighted / total,
            error_rate: failures as f32 * 100.0 / total as f32,
            by_kind,
        }
    }
}
