// src/db/models.rs

//! Data models for the sync history database

use crate::error::Result;
use crate::mirror::SyncOutcome;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

/// Final status of a recorded sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Committed,
    Aborted,
}

impl SyncStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SyncStatus::Committed => "committed",
            SyncStatus::Aborted => "aborted",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "committed" => Ok(SyncStatus::Committed),
            "aborted" => Ok(SyncStatus::Aborted),
            _ => Err(format!("Invalid sync status: {}", s)),
        }
    }
}

/// One finished sync attempt of a repository
#[derive(Debug, Clone)]
pub struct SyncRecord {
    pub id: Option<i64>,
    pub repo_id: String,
    pub revision: Option<i64>,
    pub status: SyncStatus,
    pub fetched: i64,
    pub carried: i64,
    pub dropped: i64,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}

const COLUMNS: &str =
    "id, repo_id, revision, status, fetched, carried, dropped, error, started_at, finished_at";

impl SyncRecord {
    /// Record of a committed attempt
    pub fn committed(repo_id: &str, started_at: String, outcome: &SyncOutcome) -> Self {
        Self {
            id: None,
            repo_id: repo_id.to_string(),
            revision: Some(outcome.manifest.revision() as i64),
            status: SyncStatus::Committed,
            fetched: outcome.fetched.len() as i64,
            carried: outcome.carried.len() as i64,
            dropped: outcome.dropped.len() as i64,
            error: None,
            started_at,
            finished_at: current_timestamp(),
        }
    }

    /// Record of an aborted attempt
    pub fn aborted(repo_id: &str, started_at: String, error: &crate::Error) -> Self {
        Self {
            id: None,
            repo_id: repo_id.to_string(),
            revision: None,
            status: SyncStatus::Aborted,
            fetched: 0,
            carried: 0,
            dropped: 0,
            error: Some(error.to_string()),
            started_at,
            finished_at: current_timestamp(),
        }
    }

    /// Insert this record into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO sync_history (repo_id, revision, status, fetched, carried, dropped, error, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &self.repo_id,
                &self.revision,
                self.status.as_str(),
                self.fetched,
                self.carried,
                self.dropped,
                &self.error,
                &self.started_at,
                &self.finished_at,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// List all records, newest first
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sync_history ORDER BY id DESC",
            COLUMNS
        ))?;

        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// List the records of one repository, newest first
    pub fn list_by_repo(conn: &Connection, repo_id: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sync_history WHERE repo_id = ?1 ORDER BY id DESC",
            COLUMNS
        ))?;

        let records = stmt
            .query_map([repo_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// The most recent record of a repository
    pub fn latest_for_repo(conn: &Connection, repo_id: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sync_history WHERE repo_id = ?1 ORDER BY id DESC LIMIT 1",
            COLUMNS
        ))?;

        let record = stmt.query_row([repo_id], Self::from_row).optional()?;

        Ok(record)
    }

    /// Convert a database row to a SyncRecord
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let status_str: String = row.get(3)?;
        let status = status_str.parse::<SyncStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            repo_id: row.get(1)?,
            revision: row.get(2)?,
            status,
            fetched: row.get(4)?,
            carried: row.get(5)?,
            dropped: row.get(6)?,
            error: row.get(7)?,
            started_at: row.get(8)?,
            finished_at: row.get(9)?,
        })
    }
}

/// Get current timestamp as ISO 8601 string
pub fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
