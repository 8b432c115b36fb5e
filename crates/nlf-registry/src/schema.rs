//! Registry table layout and version handshake.

use nlf_core::{ErrorInfo, FitError};
use rusqlite::Connection;

/// Version of the registry table layout.
pub const SCHEMA_VERSION: i64 = 1;

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS fit (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    path_prefix   TEXT NOT NULL,
    unique_tag    TEXT,
    model_class   TEXT NOT NULL,
    model         BLOB NOT NULL,
    search_class  TEXT NOT NULL,
    search_config BLOB NOT NULL,
    status        TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS fit_info (
    fit_id TEXT NOT NULL REFERENCES fit(id) ON DELETE CASCADE,
    key    TEXT NOT NULL,
    value  TEXT NOT NULL,
    UNIQUE (fit_id, key)
);
CREATE TABLE IF NOT EXISTS attached_object (
    fit_id TEXT NOT NULL REFERENCES fit(id) ON DELETE CASCADE,
    name   TEXT NOT NULL,
    blob   BLOB NOT NULL,
    UNIQUE (fit_id, name)
);
CREATE TABLE IF NOT EXISTS sample (
    fit_id         TEXT NOT NULL REFERENCES fit(id) ON DELETE CASCADE,
    idx            INTEGER NOT NULL,
    unit           BLOB NOT NULL,
    params         BLOB NOT NULL,
    log_likelihood REAL NOT NULL,
    weight         REAL NOT NULL,
    UNIQUE (fit_id, idx)
);
CREATE INDEX IF NOT EXISTS idx_fit_info_key ON fit_info (key, value);
";

pub(crate) fn init_schema(conn: &Connection) -> Result<(), FitError> {
    conn.execute_batch(CREATE_TABLES)
        .map_err(|err| sqlite_error("schema-create", &err))?;

    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|err| match err {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(sqlite_error("schema-version", &other)),
        })?;
    match stored {
        None => {
            conn.execute(
                "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)",
                [SCHEMA_VERSION.to_string()],
            )
            .map_err(|err| sqlite_error("schema-version", &err))?;
            Ok(())
        }
        Some(value) if value == SCHEMA_VERSION.to_string() => Ok(()),
        Some(value) => Err(FitError::Persistence(
            ErrorInfo::new("schema-version", "registry schema version mismatch")
                .with_context("expected", SCHEMA_VERSION.to_string())
                .with_context("found", value),
        )),
    }
}

pub(crate) fn sqlite_error(code: &str, err: &rusqlite::Error) -> FitError {
    FitError::Persistence(
        ErrorInfo::new(code, "sqlite operation failed").with_context("error", err.to_string()),
    )
}
