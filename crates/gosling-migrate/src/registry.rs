use std::collections::BTreeMap;
use std::path::Path;

use gosling_common::{Error, Result};
use tracing::debug;

use crate::executor::Executor;
use crate::migration::{Direction, Migration};
use crate::version::{MigrationKind, numeric_component};

/// Body of a function migration. Receives the open transaction, or the bare
/// connection for non-transactional migrations.
pub type MigrationFn = fn(&mut dyn Executor) -> Result<()>;

/// Up/down functions registered for one version.
#[derive(Debug, Clone)]
pub struct FunctionMigration {
    pub version: i64,
    pub source: String,
    pub up: Option<MigrationFn>,
    pub down: Option<MigrationFn>,
    pub transactional: bool,
}

impl FunctionMigration {
    /// The function for `direction`; `None` means the direction is a no-op.
    pub fn body(&self, direction: Direction) -> Option<MigrationFn> {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
        }
    }
}

/// Function migrations known to an engine, keyed by version.
///
/// ```
/// use gosling_migrate::{Executor, FunctionRegistry};
///
/// fn up(db: &mut dyn Executor) -> gosling_common::Result<()> {
///     db.execute("UPDATE users SET username = 'admin' WHERE username = 'root';", &[])
/// }
///
/// let mut registry = FunctionRegistry::new();
/// registry.add_migration("00002_rename_root.rs", Some(up), None).unwrap();
/// assert!(registry.get(2).is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    entries: BTreeMap<i64, FunctionMigration>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transactional migration. `source` is the file name of the
    /// module (usually `file!()`); its numeric prefix is the version.
    pub fn add_migration(
        &mut self,
        source: &str,
        up: Option<MigrationFn>,
        down: Option<MigrationFn>,
    ) -> Result<i64> {
        self.insert(source, up, down, true)
    }

    /// Register a migration that runs outside a transaction.
    pub fn add_migration_no_tx(
        &mut self,
        source: &str,
        up: Option<MigrationFn>,
        down: Option<MigrationFn>,
    ) -> Result<i64> {
        self.insert(source, up, down, false)
    }

    fn insert(
        &mut self,
        source: &str,
        up: Option<MigrationFn>,
        down: Option<MigrationFn>,
        transactional: bool,
    ) -> Result<i64> {
        if MigrationKind::from_path(source)? != MigrationKind::Function {
            return Err(Error::UnrecognizedKind(format!(
                "{source} (function migrations must be registered from a .rs source)"
            )));
        }
        let version = numeric_component(source)?;

        if let Some(existing) = self.entries.get(&version) {
            return Err(Error::DuplicateVersion {
                version,
                first: existing.source.clone(),
                second: source.to_string(),
            });
        }

        debug!("registered function migration {version} from {source}");
        self.entries.insert(
            version,
            FunctionMigration {
                version,
                source: source.to_string(),
                up,
                down,
                transactional,
            },
        );
        Ok(version)
    }

    pub fn get(&self, version: i64) -> Option<&FunctionMigration> {
        self.entries.get(&version)
    }

    /// Whether a migration with this source file name is registered,
    /// regardless of the directory it was registered from.
    pub fn contains_source(&self, file_name: &str) -> bool {
        self.entries
            .values()
            .any(|m| Path::new(&m.source).file_name().and_then(|n| n.to_str()) == Some(file_name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered migrations as model values, in version order.
    pub fn migrations(&self) -> impl Iterator<Item = Migration> + '_ {
        self.entries
            .values()
            .map(|m| Migration::function(m.version, m.source.clone(), m.transactional))
    }
}
