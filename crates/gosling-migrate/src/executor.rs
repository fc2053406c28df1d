//! The database capability the engine runs against.
//!
//! `Executor` is what migration functions see: both a bare connection and an
//! open transaction implement it, so the same function body works in either
//! mode.

use gosling_common::Result;

/// A bound statement parameter or a fetched column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

pub type Row = Vec<Value>;

/// Execute statements and run queries.
pub trait Executor {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<()>;

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;
}

/// A connection that can open transactions.
pub trait Database: Executor {
    type Transaction<'a>: Transaction
    where
        Self: 'a;

    fn begin(&mut self) -> Result<Self::Transaction<'_>>;
}

/// An open transaction. Dropping it without committing rolls it back.
pub trait Transaction: Executor {
    fn commit(self) -> Result<()>;

    fn rollback(self) -> Result<()>;
}
