use crate::db;
use crate::error::RepositoryError;
use crate::filter::{Constraint, Predicate};
use crate::model::{Bundle, SchoolSummary, Term};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use std::path::Path;

/// The store operations the lifecycle controller depends on.
#[async_trait]
pub trait BackupRepository: Send + Sync {
    /// Bundles matching `predicate`, in repository order.
    async fn list_bundles(&self, predicate: &Predicate) -> Result<Vec<Bundle>, RepositoryError>;
    async fn get_bundle(&self, id: &str) -> Result<Bundle, RepositoryError>;
    async fn delete_bundle(&self, id: &str) -> Result<(), RepositoryError>;
    async fn list_schools(&self) -> Result<Vec<SchoolSummary>, RepositoryError>;
}

/// Renders a predicate as a parameterized `WHERE` clause. An unconstrained
/// predicate renders to an empty clause.
pub fn where_clause(predicate: &Predicate) -> (String, Vec<Value>) {
    let mut parts = Vec::new();
    let mut params = Vec::new();
    for c in &predicate.constraints {
        match c {
            Constraint::Equals { field, value } => {
                parts.push(format!("{} = ?", field.column()));
                params.push(Value::Text(value.clone()));
            }
            Constraint::TimestampRange { start_ms, end_ms } => {
                parts.push("timestamp >= ? AND timestamp < ?".to_string());
                params.push(Value::Integer(*start_ms));
                params.push(Value::Integer(*end_ms));
            }
        }
    }
    if parts.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", parts.join(" AND ")), params)
    }
}

pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self::from_connection(db::open_db(workspace)?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

type RawRow = (String, String, String, String, i64, Option<String>);

fn read_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
    ))
}

fn row_to_bundle(row: RawRow) -> Result<Bundle, RepositoryError> {
    let (id, school_id, term, academic_year, timestamp, data) = row;
    let term: Term = term
        .parse()
        .map_err(|e: String| RepositoryError::Unavailable(format!("backup {id}: {e}")))?;
    let data = match data {
        Some(text) => Some(serde_json::from_str(&text).map_err(|e| {
            RepositoryError::Unavailable(format!("backup {id}: invalid payload JSON: {e}"))
        })?),
        None => None,
    };
    Ok(Bundle {
        id,
        school_id,
        term,
        academic_year,
        timestamp,
        data,
    })
}

const BUNDLE_COLUMNS: &str = "id, school_id, term, academic_year, timestamp, data";

#[async_trait]
impl BackupRepository for SqliteRepository {
    async fn list_bundles(&self, predicate: &Predicate) -> Result<Vec<Bundle>, RepositoryError> {
        let (clause, params) = where_clause(predicate);
        let sql = format!("SELECT {BUNDLE_COLUMNS} FROM backups{clause} ORDER BY rowid");
        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params), read_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut bundles = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.0.clone();
            match row_to_bundle(row) {
                Ok(b) => bundles.push(b),
                Err(e) => tracing::warn!(backup_id = %id, error = %e, "skipping unreadable backup row"),
            }
        }
        Ok(bundles)
    }

    async fn get_bundle(&self, id: &str) -> Result<Bundle, RepositoryError> {
        let row = {
            let conn = self.conn.lock();
            conn.query_row(
                &format!("SELECT {BUNDLE_COLUMNS} FROM backups WHERE id = ?"),
                [id],
                read_row,
            )
            .optional()?
        };
        match row {
            Some(row) => row_to_bundle(row),
            None => Err(RepositoryError::NotFound(id.to_string())),
        }
    }

    async fn delete_bundle(&self, id: &str) -> Result<(), RepositoryError> {
        let changed = self
            .conn
            .lock()
            .execute("DELETE FROM backups WHERE id = ?", [id])?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list_schools(&self) -> Result<Vec<SchoolSummary>, RepositoryError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, name FROM schools ORDER BY name, id")?;
        let schools = stmt
            .query_map([], |r| {
                Ok(SchoolSummary {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(schools)
    }
}
