use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gosling_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dialect::Dialect;
use crate::executor::{Database, Executor, Row, Transaction, Value};
use crate::migration::Direction;

/// One row of the version table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version_id: i64,
    /// `None` when the row carries no timestamp.
    pub applied_at: Option<DateTime<Utc>>,
    pub is_applied: bool,
}

/// A bookkeeping statement with its bound parameters. The engine executes it
/// without looking inside.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl VersionStatement {
    pub fn execute(&self, db: &mut dyn Executor) -> Result<()> {
        db.execute(&self.sql, &self.params)
    }
}

/// The persisted record of which versions are applied.
#[derive(Clone)]
pub struct VersionStore {
    dialect: Arc<dyn Dialect>,
    table: String,
}

impl VersionStore {
    pub fn new(dialect: Arc<dyn Dialect>, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Statement marking `version` as applied in `direction`.
    pub fn record_applied(&self, version: i64, direction: Direction) -> VersionStatement {
        VersionStatement {
            sql: self.dialect.insert_version_sql(&self.table),
            params: vec![Value::Integer(version), Value::Bool(direction == Direction::Up)],
        }
    }

    /// Statement removing every record of `version`.
    pub fn remove_applied(&self, version: i64) -> VersionStatement {
        VersionStatement {
            sql: self.dialect.delete_version_sql(&self.table),
            params: vec![Value::Integer(version)],
        }
    }

    /// The bookkeeping statement that completes a run in `direction`.
    pub fn statement_for(&self, version: i64, direction: Direction) -> VersionStatement {
        match direction {
            Direction::Up => self.record_applied(version, direction),
            Direction::Down => self.remove_applied(version),
        }
    }

    /// Create the version table if needed and seed it with version 0. Returns
    /// the current version.
    pub fn ensure_version_table<D: Database>(&self, db: &mut D) -> Result<i64> {
        {
            // Dropping the transaction on error rolls the seed back.
            let mut tx = db.begin()?;
            tx.execute(&self.dialect.create_version_table_sql(&self.table), &[])?;
            let rows = tx.query(&self.dialect.list_versions_sql(&self.table), &[])?;
            if rows.is_empty() {
                info!("creating version table {}", self.table);
                self.record_applied(0, Direction::Up).execute(&mut tx)?;
            }
            tx.commit()?;
        }
        self.current_version(db)
    }

    /// All version rows, newest first.
    pub fn records(&self, db: &mut dyn Executor) -> Result<Vec<VersionRecord>> {
        db.query(&self.dialect.list_versions_sql(&self.table), &[])?
            .into_iter()
            .map(parse_record)
            .collect()
    }

    /// Highest applied version that has not been superseded by a later
    /// "not applied" row for the same version. 0 when nothing is applied.
    pub fn current_version(&self, db: &mut dyn Executor) -> Result<i64> {
        let mut skip = HashSet::new();
        for record in self.records(db)? {
            if skip.contains(&record.version_id) {
                continue;
            }
            if record.is_applied {
                return Ok(record.version_id);
            }
            skip.insert(record.version_id);
        }
        Ok(0)
    }

    /// The newest record of `version`, if that record marks it applied.
    pub fn applied_record(
        &self,
        db: &mut dyn Executor,
        version: i64,
    ) -> Result<Option<VersionRecord>> {
        Ok(self
            .records(db)?
            .into_iter()
            .find(|r| r.version_id == version)
            .filter(|r| r.is_applied))
    }

    pub fn is_applied(&self, db: &mut dyn Executor, version: i64) -> Result<bool> {
        Ok(self.applied_record(db, version)?.is_some())
    }

    /// When `version` was applied. `None` if it is not applied or the row has
    /// no timestamp; use [`Self::is_applied`] to tell the two apart.
    pub fn applied_at(
        &self,
        db: &mut dyn Executor,
        version: i64,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .applied_record(db, version)?
            .and_then(|r| r.applied_at))
    }
}

fn parse_record(row: Row) -> Result<VersionRecord> {
    let mut cols = row.into_iter();
    let (Some(version), Some(applied), Some(tstamp)) = (cols.next(), cols.next(), cols.next())
    else {
        return Err(Error::Database("version row has too few columns".into()));
    };

    let version_id = version
        .as_i64()
        .ok_or_else(|| Error::Database(format!("invalid version_id: {version:?}")))?;
    let is_applied = applied
        .as_bool()
        .ok_or_else(|| Error::Database(format!("invalid is_applied: {applied:?}")))?;

    let applied_at = match &tstamp {
        Value::Null => None,
        Value::Text(s) => Some(parse_datetime(s).ok_or_else(|| {
            Error::Database(format!("invalid tstamp for version {version_id}: {s:?}"))
        })?),
        other => {
            return Err(Error::Database(format!(
                "invalid tstamp for version {version_id}: {other:?}"
            )));
        }
    };

    Ok(VersionRecord {
        version_id,
        applied_at,
        is_applied,
    })
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite CURRENT_TIMESTAMP produces "YYYY-MM-DD HH:MM:SS"
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
