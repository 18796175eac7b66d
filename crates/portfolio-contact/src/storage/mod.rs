//! Storage layer for portfolio-contact.
//!
//! This module provides `SQLite`-based persistent storage for contact
//! submissions, including the windowed queries the admission policy relies on,
//! inbox statistics and retention pruning.

pub mod migrations;
pub mod schema;

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::submission::{Submission, SubmissionStatus};

const SELECT_COLUMNS: &str = r"
    SELECT id, name, email, subject, message, ip_address, user_agent,
           timestamp, status, is_spam, fingerprint
    FROM submissions
";

/// Storage engine for contact submissions.
///
/// Provides persistent storage using `SQLite` with support for:
/// - Submission insertion and lookup
/// - Per-IP and per-fingerprint counts within a time window
/// - Inbox status and spam flag updates
/// - Aggregate statistics and age-based pruning
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a submission and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert(&self, submission: &Submission) -> Result<Submission> {
        self.conn.execute(
            r"
            INSERT INTO submissions
                (name, email, subject, message, ip_address, user_agent,
                 timestamp, status, is_spam, fingerprint)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
            params![
                submission.name,
                submission.email,
                submission.subject,
                submission.message,
                submission.ip_address.to_string(),
                submission.user_agent,
                encode_timestamp(submission.timestamp),
                submission.status.as_str(),
                submission.is_spam,
                submission.fingerprint,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        debug!(id, fingerprint = submission.short_fingerprint(), "Inserted submission");

        let mut stored = submission.clone();
        stored.id = Some(id);
        Ok(stored)
    }

    /// Get a submission by its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, id: i64) -> Result<Option<Submission>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let result = self
            .conn
            .query_row(&sql, [id], Self::row_to_submission)
            .optional()?;
        Ok(result)
    }

    /// Get the most recent submissions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_recent(&self, limit: usize) -> Result<Vec<Submission>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY timestamp DESC, id DESC LIMIT ?1");
        let mut stmt = self.conn.prepare(&sql)?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let submissions = stmt
            .query_map([limit_i64], Self::row_to_submission)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(submissions)
    }

    /// Get submissions with the given inbox status, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_by_status(&self, status: SubmissionStatus, limit: usize) -> Result<Vec<Submission>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE status = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let submissions = stmt
            .query_map(params![status.as_str(), limit_i64], Self::row_to_submission)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(submissions)
    }

    /// Count submissions from `ip` accepted at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_recent_by_ip(&self, ip: IpAddr, since: DateTime<Utc>) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM submissions WHERE ip_address = ?1 AND timestamp >= ?2",
            params![ip.to_string(), encode_timestamp(since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Find the most recent submission with `fingerprint` accepted at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_duplicate(
        &self,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Submission>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE fingerprint = ?1 AND timestamp >= ?2
             ORDER BY timestamp DESC LIMIT 1"
        );
        let result = self
            .conn
            .query_row(
                &sql,
                params![fingerprint, encode_timestamp(since)],
                Self::row_to_submission,
            )
            .optional()?;
        Ok(result)
    }

    /// Update the inbox status of a submission.
    ///
    /// Returns `true` if a submission was updated, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_status(&self, id: i64, status: SubmissionStatus) -> Result<bool> {
        let affected = self.conn.execute(
            r"
            UPDATE submissions
            SET status = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?2
            ",
            params![status.as_str(), id],
        )?;
        Ok(affected > 0)
    }

    /// Set or clear the spam flag on a submission.
    ///
    /// Returns `true` if a submission was updated, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn mark_spam(&self, id: i64, is_spam: bool) -> Result<bool> {
        let affected = self.conn.execute(
            r"
            UPDATE submissions
            SET is_spam = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?2
            ",
            params![is_spam, id],
        )?;
        Ok(affected > 0)
    }

    /// Count total submissions in storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete a submission by ID.
    ///
    /// Returns `true` if a submission was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM submissions WHERE id = ?1", [id])?;
        Ok(affected > 0)
    }

    /// Prune submissions older than the given duration.
    ///
    /// Returns the number of submissions deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_older_than(&self, max_age: Duration) -> Result<usize> {
        let cutoff = encode_timestamp(Utc::now() - max_age);

        let affected = self
            .conn
            .execute("DELETE FROM submissions WHERE timestamp < ?1", [cutoff])?;

        if affected > 0 {
            info!("Pruned {} old submissions", affected);
        }
        Ok(affected)
    }

    /// Aggregate inbox statistics relative to `now`.
    ///
    /// "Today" starts at UTC midnight; "this week" is the trailing seven days.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self, now: DateTime<Utc>) -> Result<SubmissionStats> {
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(now, |dt| dt.and_utc());
        let week_ago = now - Duration::days(7);

        let (total, today, this_week, spam): (i64, i64, i64, i64) = self.conn.query_row(
            r"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN timestamp >= ?1 THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN timestamp >= ?2 THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(is_spam), 0)
            FROM submissions
            ",
            params![encode_timestamp(midnight), encode_timestamp(week_ago)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        let mut by_status: BTreeMap<SubmissionStatus, i64> =
            SubmissionStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM submissions GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (status, count) in rows {
            match status.parse::<SubmissionStatus>() {
                Ok(status) => {
                    by_status.insert(status, count);
                }
                Err(e) => warn!("Skipping unknown status in stats: {}", e),
            }
        }

        let oldest: Option<String> = self
            .conn
            .query_row("SELECT MIN(timestamp) FROM submissions", [], |row| row.get(0))?;
        let newest: Option<String> = self
            .conn
            .query_row("SELECT MAX(timestamp) FROM submissions", [], |row| row.get(0))?;

        Ok(SubmissionStats {
            total,
            today,
            this_week,
            spam,
            by_status,
            oldest: oldest.as_deref().and_then(decode_timestamp),
            newest: newest.as_deref().and_then(decode_timestamp),
        })
    }

    /// Check that the database answers a trivial query.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is unusable.
    pub fn ping(&self) -> Result<()> {
        self.conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    /// Convert a database row to a Submission struct.
    fn row_to_submission(row: &rusqlite::Row) -> rusqlite::Result<Submission> {
        let id: i64 = row.get(0)?;
        let ip_str: String = row.get(5)?;
        let timestamp_str: String = row.get(7)?;
        let status_str: String = row.get(8)?;

        let ip_address = ip_str.parse().unwrap_or_else(|_| {
            warn!("Submission {} has unparsable IP '{}', using 0.0.0.0", id, ip_str);
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        });

        let timestamp = decode_timestamp(&timestamp_str).unwrap_or_else(|| {
            warn!("Submission {} has unparsable timestamp '{}'", id, timestamp_str);
            DateTime::<Utc>::default()
        });

        let status = status_str.parse().unwrap_or_else(|e| {
            warn!("Submission {}: {}, defaulting to new", id, e);
            SubmissionStatus::New
        });

        Ok(Submission {
            id: Some(id),
            name: row.get(1)?,
            email: row.get(2)?,
            subject: row.get(3)?,
            message: row.get(4)?,
            ip_address,
            user_agent: row.get(6)?,
            timestamp,
            status,
            is_spam: row.get(9)?,
            fingerprint: row.get(10)?,
        })
    }
}

/// Fixed-width UTC form so that text comparison orders chronologically.
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Aggregate statistics about stored submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionStats {
    /// Total number of submissions stored.
    pub total: i64,
    /// Submissions since UTC midnight.
    pub today: i64,
    /// Submissions in the trailing seven days.
    pub this_week: i64,
    /// Submissions flagged as spam.
    pub spam: i64,
    /// Submission count per inbox status.
    pub by_status: BTreeMap<SubmissionStatus, i64>,
    /// Timestamp of the oldest submission.
    pub oldest: Option<DateTime<Utc>>,
    /// Timestamp of the newest submission.
    pub newest: Option<DateTime<Utc>>,
}
