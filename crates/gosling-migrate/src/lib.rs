//! Versioned schema migrations.
//!
//! Migrations are `.sql` scripts annotated with `-- +goose` directives, or
//! Rust functions registered in a [`FunctionRegistry`]. The [`Engine`] applies
//! one migration in one direction and records the result in a version table;
//! the [`Migrator`] drives batches over a directory.

pub mod collect;
pub mod dialect;
pub mod engine;
pub mod executor;
pub mod migration;
pub mod migrator;
pub mod parser;
pub mod registry;
pub mod sqlite;
pub mod store;
pub mod version;

pub use collect::collect_migrations;
pub use dialect::{Dialect, MySqlDialect, PostgresDialect, SqliteDialect, dialect_from_name};
pub use engine::{CancellationToken, Engine, RunObserver, RunOutcome};
pub use executor::{Database, Executor, Row, Transaction, Value};
pub use migration::{Direction, Migration, MigrationBody, Migrations};
pub use migrator::{MigrationStatus, Migrator, RunReport, Step};
pub use parser::{ParsedScript, Statements, parse, parse_script};
pub use registry::{FunctionMigration, FunctionRegistry, MigrationFn};
pub use sqlite::{SqliteDatabase, SqliteTransaction};
pub use store::{VersionRecord, VersionStatement, VersionStore};
pub use version::{MigrationKind, numeric_component};
