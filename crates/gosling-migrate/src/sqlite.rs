use std::path::Path;

use gosling_common::{Error, Result};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, InterruptHandle, params_from_iter};
use tracing::{debug, info};

use crate::executor::{Database, Executor, Row, Transaction, Value};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(SqlValue::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
        })
    }
}

impl From<SqlValue> for Value {
    fn from(v: SqlValue) -> Self {
        match v {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::Integer(i),
            SqlValue::Real(r) => Value::Real(r),
            SqlValue::Text(s) => Value::Text(s),
            SqlValue::Blob(b) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
        }
    }
}

/// SQLite connection implementing the engine's execution capability.
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening sqlite database at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;
        Self::with_pragmas(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::with_pragmas(conn)
    }

    fn with_pragmas(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Handle that aborts the statement currently running on this connection,
    /// from any thread. The interrupted run fails and its transaction is
    /// rolled back.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.conn.get_interrupt_handle()
    }
}

impl Executor for SqliteDatabase {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        execute_on(&self.conn, sql, params)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        query_on(&self.conn, sql, params)
    }
}

impl Database for SqliteDatabase {
    type Transaction<'a> = SqliteTransaction<'a>;

    fn begin(&mut self) -> Result<SqliteTransaction<'_>> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;
        debug!("transaction started");
        Ok(SqliteTransaction { tx })
    }
}

pub struct SqliteTransaction<'a> {
    tx: rusqlite::Transaction<'a>,
}

impl Executor for SqliteTransaction<'_> {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()> {
        execute_on(&self.tx, sql, params)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        query_on(&self.tx, sql, params)
    }
}

impl Transaction for SqliteTransaction<'_> {
    fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .map_err(|e| Error::Database(format!("failed to commit: {e}")))
    }

    fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .map_err(|e| Error::Database(format!("failed to roll back: {e}")))
    }
}

fn execute_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<()> {
    // Parameterless statements go through `execute_batch` so that bracketed
    // blocks holding several statements, and statements returning rows, work.
    let result = if params.is_empty() {
        conn.execute_batch(sql)
    } else {
        conn.execute(sql, params_from_iter(params.iter())).map(|_| ())
    };
    result.map_err(|e| Error::Database(format!("failed to execute statement: {e}")))
}

fn query_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;
    let columns = stmt.column_count();

    let mut rows = stmt
        .query(params_from_iter(params.iter()))
        .map_err(|e| Error::Database(format!("failed to run query: {e}")))?;

    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| Error::Database(format!("failed to read row: {e}")))?
    {
        let mut values = Vec::with_capacity(columns);
        for i in 0..columns {
            let value: SqlValue = row
                .get(i)
                .map_err(|e| Error::Database(format!("failed to read column {i}: {e}")))?;
            values.push(value.into());
        }
        out.push(values);
    }
    Ok(out)
}
