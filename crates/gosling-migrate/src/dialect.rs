//! SQL text for the version table, per database engine.

use gosling_common::{Error, Result};

/// Statements the version store needs from a database engine.
///
/// `insert_version_sql` binds `(version_id, is_applied)`; `delete_version_sql`
/// binds `(version_id)`.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn create_version_table_sql(&self, table: &str) -> String;

    fn insert_version_sql(&self, table: &str) -> String;

    fn delete_version_sql(&self, table: &str) -> String;

    /// `version_id, is_applied, tstamp`, newest row first.
    fn list_versions_sql(&self, table: &str) -> String {
        format!("SELECT version_id, is_applied, tstamp FROM {table} ORDER BY id DESC")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                version_id INTEGER NOT NULL,
                is_applied INTEGER NOT NULL,
                tstamp TIMESTAMP DEFAULT (datetime('now'))
            );"
        )
    }

    fn insert_version_sql(&self, table: &str) -> String {
        format!("INSERT INTO {table} (version_id, is_applied) VALUES (?, ?)")
    }

    fn delete_version_sql(&self, table: &str) -> String {
        format!("DELETE FROM {table} WHERE version_id = ?")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id serial NOT NULL,
                version_id bigint NOT NULL,
                is_applied boolean NOT NULL,
                tstamp timestamp NULL default now(),
                PRIMARY KEY(id)
            );"
        )
    }

    fn insert_version_sql(&self, table: &str) -> String {
        format!("INSERT INTO {table} (version_id, is_applied) VALUES ($1, $2)")
    }

    fn delete_version_sql(&self, table: &str) -> String {
        format!("DELETE FROM {table} WHERE version_id = $1")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id serial NOT NULL,
                version_id bigint NOT NULL,
                is_applied boolean NOT NULL,
                tstamp timestamp NULL default now(),
                PRIMARY KEY(id)
            );"
        )
    }

    fn insert_version_sql(&self, table: &str) -> String {
        format!("INSERT INTO {table} (version_id, is_applied) VALUES (?, ?)")
    }

    fn delete_version_sql(&self, table: &str) -> String {
        format!("DELETE FROM {table} WHERE version_id = ?")
    }
}

/// Look a dialect up by name (`sqlite3` and `postgresql` are accepted aliases).
pub fn dialect_from_name(name: &str) -> Result<Box<dyn Dialect>> {
    match name.to_ascii_lowercase().as_str() {
        "sqlite" | "sqlite3" => Ok(Box::new(SqliteDialect)),
        "postgres" | "postgresql" => Ok(Box::new(PostgresDialect)),
        "mysql" => Ok(Box::new(MySqlDialect)),
        other => Err(Error::Config(format!("unsupported dialect: {other}"))),
    }
}
