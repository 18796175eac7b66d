//! `SQLite` schema definitions for portfolio-contact.

/// SQL statement to create the submissions table.
pub const CREATE_SUBMISSIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    subject TEXT NOT NULL,
    message TEXT NOT NULL,
    ip_address TEXT NOT NULL,
    user_agent TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'new'
        CHECK (status IN ('new', 'read', 'replied', 'archived')),
    is_spam INTEGER NOT NULL DEFAULT 0,
    fingerprint TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
)
";

/// Index backing the per-sender lookups.
pub const CREATE_EMAIL_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_submissions_email ON submissions(email, timestamp DESC)
";

/// Index backing the per-IP rate limit count.
pub const CREATE_IP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_submissions_ip ON submissions(ip_address, timestamp DESC)
";

/// Index on timestamp for recency queries and pruning.
pub const CREATE_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_submissions_timestamp ON submissions(timestamp DESC)
";

/// Index on status for inbox filtering.
pub const CREATE_STATUS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_submissions_status ON submissions(status)
";

/// Index on fingerprint for duplicate detection.
pub const CREATE_FINGERPRINT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_submissions_fingerprint ON submissions(fingerprint, timestamp DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_SUBMISSIONS_TABLE,
    CREATE_EMAIL_INDEX,
    CREATE_IP_INDEX,
    CREATE_TIMESTAMP_INDEX,
    CREATE_STATUS_INDEX,
    CREATE_FINGERPRINT_INDEX,
    CREATE_METADATA_TABLE,
];
