//! SQLite run ledger
//!
//! This module provides a SQLite-based implementation of the RunLedger trait.

use crate::crawler::FrontierEntry;
use crate::state::{RunPhase, StopReason, VisitCounts, VisitStatus, VisitedRecord};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    RunLedger, RunRecord, SnapshotRow, StorageError, StorageResult, VisitDetails, VisitRow,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const RUN_COLUMNS: &str = "id, seed_url, intent, config_hash, phase, stop_reason, started_at, \
     finished_at, success_count, failure_count, skipped_count";

/// SQLite ledger backend
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Opens (or creates) the ledger at `path`, creating parent directories
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteLedger)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn require_run(&self, run_id: i64) -> StorageResult<()> {
        let exists: Option<i64> = self
            .conn
            .query_row("SELECT id FROM runs WHERE id = ?1", params![run_id], |row| row.get(0))
            .optional()?;
        exists.map(|_| ()).ok_or(StorageError::RunNotFound(run_id))
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<(RunRecord, String, Option<String>)> {
    let phase: String = row.get(4)?;
    let stop_reason: Option<String> = row.get(5)?;
    let record = RunRecord {
        id: row.get(0)?,
        seed_url: row.get(1)?,
        intent: row.get(2)?,
        config_hash: row.get(3)?,
        phase: RunPhase::Idle,
        stop_reason: None,
        started_at: row.get(6)?,
        finished_at: row.get(7)?,
        counts: VisitCounts {
            success: row.get(8)?,
            failed: row.get(9)?,
            skipped: row.get(10)?,
        },
    };
    Ok((record, phase, stop_reason))
}

/// Decodes the enum columns the row closure leaves as text
fn decode_run(
    (mut record, phase, stop_reason): (RunRecord, String, Option<String>),
) -> StorageResult<RunRecord> {
    record.phase = RunPhase::from_db_string(&phase)
        .ok_or_else(|| StorageError::Corrupt(format!("run phase '{}'", phase)))?;
    record.stop_reason = match stop_reason {
        Some(s) => Some(
            StopReason::from_db_string(&s)
                .ok_or_else(|| StorageError::Corrupt(format!("stop reason '{}'", s)))?,
        ),
        None => None,
    };
    Ok(record)
}

impl RunLedger for SqliteLedger {
    fn create_run(&mut self, seed_url: &str, intent: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (seed_url, intent, config_hash, phase, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![seed_url, intent, config_hash, RunPhase::Running.to_db_string(), now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))?;
        decode_run(row)
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS),
                [],
                run_from_row,
            )
            .optional()?;
        row.map(decode_run).transpose()
    }

    fn record_visit(
        &mut self,
        run_id: i64,
        record: &VisitedRecord,
        details: VisitDetails<'_>,
    ) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO visits
                (run_id, url, status, depth, fetched_at, error, title, relevance)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run_id,
                record.url.as_str(),
                record.status.to_db_string(),
                record.depth,
                record.fetched_at.to_rfc3339(),
                record.error,
                details.title,
                details.relevance,
            ],
        )?;
        Ok(inserted > 0)
    }

    fn get_visits(&self, run_id: i64) -> StorageResult<Vec<VisitRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, status, depth, fetched_at, error, title, relevance
             FROM visits WHERE run_id = ?1 ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    VisitRow {
                        url: row.get(0)?,
                        status: VisitStatus::Success,
                        depth: row.get(2)?,
                        fetched_at: row.get(3)?,
                        error: row.get(4)?,
                        title: row.get(5)?,
                        relevance: row.get(6)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(status, mut visit)| {
                visit.status = VisitStatus::from_db_string(&status)
                    .ok_or_else(|| StorageError::Corrupt(format!("visit status '{}'", status)))?;
                Ok(visit)
            })
            .collect()
    }

    fn save_frontier_snapshot(&mut self, run_id: i64, entries: &[FrontierEntry]) -> StorageResult<()> {
        self.require_run(run_id)?;
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM frontier_snapshot WHERE run_id = ?1", params![run_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO frontier_snapshot
                    (run_id, position, url, priority, depth, discovered_from)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, entry) in entries.iter().enumerate() {
                stmt.execute(params![
                    run_id,
                    position as i64,
                    entry.url.as_str(),
                    entry.priority.rank(),
                    entry.depth,
                    entry.discovered_from.as_ref().map(|u| u.as_str()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_frontier_snapshot(&self, run_id: i64) -> StorageResult<Vec<SnapshotRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, priority, depth, discovered_from
             FROM frontier_snapshot WHERE run_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(SnapshotRow {
                    url: row.get(0)?,
                    priority: row.get(1)?,
                    depth: row.get(2)?,
                    discovered_from: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        phase: RunPhase,
        stop_reason: StopReason,
        counts: VisitCounts,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs
             SET phase = ?1, stop_reason = ?2, finished_at = ?3,
                 success_count = ?4, failure_count = ?5, skipped_count = ?6
             WHERE id = ?7",
            params![
                phase.to_db_string(),
                stop_reason.to_db_string(),
                now,
                counts.success,
                counts.failed,
                counts.skipped,
                run_id,
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }
}
