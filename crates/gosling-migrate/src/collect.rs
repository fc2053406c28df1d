use std::fs;
use std::path::Path;

use gosling_common::{Error, Result};
use tracing::debug;

use crate::migration::{Migration, Migrations};
use crate::registry::FunctionRegistry;

/// Gather the migrations with versions in `(current, target]`.
///
/// `.sql` files in `dir` become script migrations. Registered functions are
/// added from `registry`; a `.rs` file in `dir` with no registration is still
/// collected so that running it reports `NotRegistered`. Other files are
/// ignored.
pub fn collect_migrations(
    dir: &Path,
    registry: &FunctionRegistry,
    current: i64,
    target: i64,
) -> Result<Migrations> {
    let in_range = |v: i64| v > current && v <= target;
    let mut found = Vec::new();

    let entries = fs::read_dir(dir).map_err(|e| Error::SourceUnavailable {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;

    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let (Some(name), Some(ext)) = (
            path.file_name().and_then(|n| n.to_str()),
            path.extension().and_then(|e| e.to_str()),
        ) else {
            continue;
        };

        match ext {
            "sql" => {}
            "rs" if !registry.contains_source(name) => {}
            _ => continue,
        }

        let migration = Migration::from_path(&path)?;
        if in_range(migration.version) {
            found.push(migration);
        }
    }

    found.extend(registry.migrations().filter(|m| in_range(m.version)));

    let migrations = Migrations::new(found)?;
    debug!(
        "collected {} migrations from {} in ({current}, {target}]",
        migrations.len(),
        dir.display()
    );
    Ok(migrations)
}
