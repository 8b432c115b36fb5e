//! Connection handle for one registry database.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use nlf_core::{from_json_slice, to_canonical_json_bytes, ErrorInfo, FitError};
use nlf_model::Model;
use nlf_search::{FitRecord, FitSink, FitStatus, Sample, SampleSet};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use crate::schema::{init_schema, sqlite_error};

/// A registry session backed by one sqlite database.
///
/// The session is the explicit persistence context: every operation that
/// touches the database goes through a `Session` value, and dropping it
/// closes the connection. It doubles as the driver's [`FitSink`].
pub struct Session {
    conn: Mutex<Connection>,
}

impl Session {
    /// Opens (or creates) a registry database at `path`.
    pub fn open(path: &Path) -> Result<Self, FitError> {
        let conn = Connection::open(path).map_err(|err| sqlite_error("open", &err))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory registry, useful for tests and scratch work.
    pub fn in_memory() -> Result<Self, FitError> {
        let conn = Connection::open_in_memory().map_err(|err| sqlite_error("open", &err))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, FitError> {
        self.conn.lock().map_err(|_| {
            FitError::Persistence(ErrorInfo::new(
                "lock-poisoned",
                "registry connection lock was poisoned",
            ))
        })
    }

    /// Inserts or replaces a fit record without touching samples or objects.
    pub fn save_fit(&self, record: &FitRecord) -> Result<(), FitError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|err| sqlite_error("transaction", &err))?;
        upsert_fit(&tx, record)?;
        replace_info(&tx, &record.identifier, &record.info)?;
        tx.commit().map_err(|err| sqlite_error("commit", &err))
    }

    /// Replaces the stored samples of a fit.
    pub fn save_samples(&self, identifier: &str, samples: &SampleSet) -> Result<(), FitError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|err| sqlite_error("transaction", &err))?;
        replace_samples(&tx, identifier, samples)?;
        tx.commit().map_err(|err| sqlite_error("commit", &err))
    }

    /// Inserts or replaces one attached object.
    pub fn save_object(&self, identifier: &str, name: &str, value: &Value) -> Result<(), FitError> {
        let conn = self.lock()?;
        let blob = to_canonical_json_bytes(value)?;
        conn.execute(
            "INSERT INTO attached_object (fit_id, name, blob) VALUES (?1, ?2, ?3)
             ON CONFLICT (fit_id, name) DO UPDATE SET blob = excluded.blob",
            params![identifier, name, blob],
        )
        .map_err(|err| sqlite_error("save-object", &err))?;
        Ok(())
    }

    /// Loads the record of a fit. Unknown identifiers are query errors.
    pub fn load_fit(&self, identifier: &str) -> Result<FitRecord, FitError> {
        let conn = self.lock()?;
        load_fit_locked(&conn, identifier)
    }

    /// Loads the samples of a fit in their original append order.
    pub fn load_samples(&self, identifier: &str) -> Result<SampleSet, FitError> {
        let conn = self.lock()?;
        let record = load_fit_locked(&conn, identifier)?;
        let dim = record.model.prior_count();
        let mut stmt = conn
            .prepare(
                "SELECT unit, params, log_likelihood, weight FROM sample
                 WHERE fit_id = ?1 ORDER BY idx",
            )
            .map_err(|err| sqlite_error("load-samples", &err))?;
        let rows = stmt
            .query_map([identifier], |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })
            .map_err(|err| sqlite_error("load-samples", &err))?;
        let mut samples = SampleSet::new(dim);
        for row in rows {
            let (unit, params, log_likelihood, weight) =
                row.map_err(|err| sqlite_error("load-samples", &err))?;
            samples.append(Sample {
                unit: from_json_slice(&unit)?,
                params: from_json_slice(&params)?,
                log_likelihood,
                weight,
            })?;
        }
        Ok(samples)
    }

    /// Loads one attached object of a fit.
    pub fn load_object(&self, identifier: &str, name: &str) -> Result<Value, FitError> {
        let conn = self.lock()?;
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT blob FROM attached_object WHERE fit_id = ?1 AND name = ?2",
                params![identifier, name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| sqlite_error("load-object", &err))?;
        match blob {
            Some(blob) => from_json_slice(&blob),
            None => Err(FitError::Query(
                ErrorInfo::new("object-unknown", "no such attached object")
                    .with_context("identifier", identifier.to_string())
                    .with_context("name", name.to_string()),
            )),
        }
    }

    /// All stored fit records, ordered by creation time.
    pub fn all_fits(&self) -> Result<Vec<FitRecord>, FitError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id FROM fit ORDER BY created_at, id")
            .map_err(|err| sqlite_error("list-fits", &err))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|err| sqlite_error("list-fits", &err))?;
        let mut out = Vec::new();
        for id in ids {
            let id = id.map_err(|err| sqlite_error("list-fits", &err))?;
            out.push(load_fit_locked(&conn, &id)?);
        }
        Ok(out)
    }
}

impl FitSink for Session {
    fn commit_fit(
        &self,
        record: &FitRecord,
        samples: &SampleSet,
        objects: &[(String, Value)],
    ) -> Result<(), FitError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|err| sqlite_error("transaction", &err))?;
        upsert_fit(&tx, record)?;
        replace_info(&tx, &record.identifier, &record.info)?;
        replace_samples(&tx, &record.identifier, samples)?;
        for (name, value) in objects {
            let blob = to_canonical_json_bytes(value)?;
            tx.execute(
                "INSERT INTO attached_object (fit_id, name, blob) VALUES (?1, ?2, ?3)
                 ON CONFLICT (fit_id, name) DO UPDATE SET blob = excluded.blob",
                params![record.identifier, name, blob],
            )
            .map_err(|err| sqlite_error("save-object", &err))?;
        }
        tx.commit().map_err(|err| sqlite_error("commit", &err))?;
        debug!(
            identifier = %record.identifier,
            samples = samples.len(),
            objects = objects.len(),
            "committed fit"
        );
        Ok(())
    }
}

fn upsert_fit(conn: &Connection, record: &FitRecord) -> Result<(), FitError> {
    let model_blob = to_canonical_json_bytes(&record.model)?;
    let config_blob = to_canonical_json_bytes(&record.search_config)?;
    conn.execute(
        "INSERT INTO fit (id, name, path_prefix, unique_tag, model_class, model,
                          search_class, search_config, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT (id) DO UPDATE SET
             name = excluded.name,
             path_prefix = excluded.path_prefix,
             unique_tag = excluded.unique_tag,
             model_class = excluded.model_class,
             model = excluded.model,
             search_class = excluded.search_class,
             search_config = excluded.search_config,
             status = excluded.status,
             updated_at = excluded.updated_at",
        params![
            record.identifier,
            record.name,
            record.path_prefix,
            record.unique_tag,
            record.model.class_label(),
            model_blob,
            record.search_class,
            config_blob,
            record.status.as_str(),
            record.created_at,
            record.updated_at,
        ],
    )
    .map_err(|err| sqlite_error("save-fit", &err))?;
    Ok(())
}

fn replace_info(
    conn: &Connection,
    identifier: &str,
    info: &BTreeMap<String, String>,
) -> Result<(), FitError> {
    conn.execute("DELETE FROM fit_info WHERE fit_id = ?1", [identifier])
        .map_err(|err| sqlite_error("save-info", &err))?;
    for (key, value) in info {
        conn.execute(
            "INSERT INTO fit_info (fit_id, key, value) VALUES (?1, ?2, ?3)",
            params![identifier, key, value],
        )
        .map_err(|err| sqlite_error("save-info", &err))?;
    }
    Ok(())
}

fn replace_samples(
    conn: &Connection,
    identifier: &str,
    samples: &SampleSet,
) -> Result<(), FitError> {
    conn.execute("DELETE FROM sample WHERE fit_id = ?1", [identifier])
        .map_err(|err| sqlite_error("save-samples", &err))?;
    let mut stmt = conn
        .prepare(
            "INSERT INTO sample (fit_id, idx, unit, params, log_likelihood, weight)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .map_err(|err| sqlite_error("save-samples", &err))?;
    for (idx, sample) in samples.samples().iter().enumerate() {
        let unit = serde_json::to_vec(&sample.unit).map_err(json_error)?;
        let params_blob = serde_json::to_vec(&sample.params).map_err(json_error)?;
        stmt.execute(params![
            identifier,
            idx as i64,
            unit,
            params_blob,
            sample.log_likelihood,
            sample.weight,
        ])
        .map_err(|err| sqlite_error("save-samples", &err))?;
    }
    Ok(())
}

fn load_fit_locked(conn: &Connection, identifier: &str) -> Result<FitRecord, FitError> {
    let row = conn
        .query_row(
            "SELECT name, path_prefix, unique_tag, model, search_class, search_config,
                    status, created_at, updated_at
             FROM fit WHERE id = ?1",
            [identifier],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Vec<u8>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            },
        )
        .optional()
        .map_err(|err| sqlite_error("load-fit", &err))?;
    let Some((
        name,
        path_prefix,
        unique_tag,
        model_blob,
        search_class,
        config_blob,
        status,
        created_at,
        updated_at,
    )) = row
    else {
        return Err(FitError::Query(
            ErrorInfo::new("fit-unknown", "no fit is stored under this identifier")
                .with_context("identifier", identifier.to_string()),
        ));
    };

    let model: Model = from_json_slice(&model_blob)?;
    let search_config: Value = from_json_slice(&config_blob)?;

    let mut stmt = conn
        .prepare("SELECT key, value FROM fit_info WHERE fit_id = ?1")
        .map_err(|err| sqlite_error("load-info", &err))?;
    let rows = stmt
        .query_map([identifier], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|err| sqlite_error("load-info", &err))?;
    let mut info = BTreeMap::new();
    for row in rows {
        let (key, value) = row.map_err(|err| sqlite_error("load-info", &err))?;
        info.insert(key, value);
    }

    Ok(FitRecord {
        identifier: identifier.to_string(),
        name,
        path_prefix,
        unique_tag,
        model,
        search_class,
        search_config,
        info,
        status: FitStatus::parse(&status)?,
        created_at,
        updated_at,
    })
}

fn json_error(err: serde_json::Error) -> FitError {
    FitError::Serde(
        ErrorInfo::new("json", "failed to serialize sample vectors")
            .with_context("error", err.to_string()),
    )
}
