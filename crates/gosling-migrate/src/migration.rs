use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use gosling_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::parser;
use crate::version::{MigrationKind, numeric_component};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// Where the payload of a migration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationBody {
    /// A `.sql` file, re-read and re-parsed on every run.
    Script { path: PathBuf },
    /// Up/down functions looked up by version in the engine's registry.
    Function,
}

/// One versioned unit of change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    /// Adjacent versions in the collected set; not persisted.
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub source: String,
    pub body: MigrationBody,
    /// When false, payload and version bookkeeping run as separate operations.
    pub transactional: bool,
}

impl Migration {
    pub fn script(version: i64, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            version,
            next: None,
            previous: None,
            source: path.display().to_string(),
            body: MigrationBody::Script { path },
            transactional: true,
        }
    }

    pub fn function(version: i64, source: impl Into<String>, transactional: bool) -> Self {
        Self {
            version,
            next: None,
            previous: None,
            source: source.into(),
            body: MigrationBody::Function,
            transactional,
        }
    }

    /// Build a migration from a file path, resolving version and kind from
    /// the file name. Scripts are read once here to pick up
    /// `-- +goose NO TRANSACTION`; the full parse waits until the run.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path.to_string_lossy();
        let version = numeric_component(&name)?;
        Ok(match MigrationKind::from_path(&name)? {
            MigrationKind::Script => {
                let text = fs::read_to_string(path).map_err(|e| Error::SourceUnavailable {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                Self {
                    transactional: !parser::declares_no_transaction(&text),
                    ..Self::script(version, path)
                }
            }
            MigrationKind::Function => Self::function(version, name, true),
        })
    }

    pub fn kind(&self) -> MigrationKind {
        match self.body {
            MigrationBody::Script { .. } => MigrationKind::Script,
            MigrationBody::Function => MigrationKind::Function,
        }
    }

    /// Base file name of the source, used in log lines.
    pub fn file_name(&self) -> &str {
        Path::new(&self.source)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.source)
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Migrations sorted by version, with `next`/`previous` links filled in.
#[derive(Debug, Clone, Default)]
pub struct Migrations {
    items: Vec<Migration>,
}

impl Migrations {
    /// Sort, reject duplicate versions, and link neighbours.
    pub fn new(mut items: Vec<Migration>) -> Result<Self> {
        items.sort_by_key(|m| m.version);

        for pair in items.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(Error::DuplicateVersion {
                    version: pair[0].version,
                    first: pair[0].source.clone(),
                    second: pair[1].source.clone(),
                });
            }
        }

        let versions: Vec<i64> = items.iter().map(|m| m.version).collect();
        for (i, m) in items.iter_mut().enumerate() {
            m.previous = i.checked_sub(1).map(|p| versions[p]);
            m.next = versions.get(i + 1).copied();
        }

        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Migration> {
        self.items.iter()
    }

    /// The migration with exactly this version.
    pub fn current(&self, version: i64) -> Option<&Migration> {
        self.items
            .binary_search_by_key(&version, |m| m.version)
            .ok()
            .map(|i| &self.items[i])
    }

    /// First migration with a version greater than `version`.
    pub fn next(&self, version: i64) -> Option<&Migration> {
        self.items.iter().find(|m| m.version > version)
    }

    /// Last migration with a version lower than `version`.
    pub fn previous(&self, version: i64) -> Option<&Migration> {
        self.items.iter().rev().find(|m| m.version < version)
    }

    pub fn last(&self) -> Option<&Migration> {
        self.items.last()
    }
}

impl<'a> IntoIterator for &'a Migrations {
    type Item = &'a Migration;
    type IntoIter = std::slice::Iter<'a, Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
