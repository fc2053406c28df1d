use std::path::Path;

use gosling_common::{Error, Result};

/// What a migration file contains, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationKind {
    /// `.sql` script with `-- +goose` directives.
    Script,
    /// `.rs` module whose up/down functions are registered in code.
    Function,
}

impl MigrationKind {
    pub fn from_path(name: &str) -> Result<Self> {
        match Path::new(name).extension().and_then(|e| e.to_str()) {
            Some("sql") => Ok(Self::Script),
            Some("rs") => Ok(Self::Function),
            _ => Err(Error::UnrecognizedKind(name.to_string())),
        }
    }
}

/// Extract the version from a migration file name of the form
/// `NNN_description.ext`.
pub fn numeric_component(name: &str) -> Result<i64> {
    let base = Path::new(name)
        .file_name()
        .and_then(|b| b.to_str())
        .unwrap_or(name);

    MigrationKind::from_path(base)?;

    // The separator has to close a numeric prefix; `add_users.sql` has an
    // underscore but no version in front of it.
    let digits = match base.find('_') {
        Some(idx) if base[..idx].bytes().any(|b| b.is_ascii_digit()) => &base[..idx],
        _ => return Err(Error::MissingSeparator(base.to_string())),
    };
    let version: i64 = digits.parse().map_err(|e| Error::InvalidVersion {
        name: base.to_string(),
        reason: format!("{digits:?} is not a number: {e}"),
    })?;

    if version <= 0 {
        return Err(Error::InvalidVersion {
            name: base.to_string(),
            reason: "migration versions must be greater than zero".to_string(),
        });
    }

    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_zeros_are_ignored() {
        assert_eq!(numeric_component("007_add_users.sql").unwrap(), 7);
        assert_eq!(numeric_component("00002_rename_root.rs").unwrap(), 2);
    }

    #[test]
    fn directories_are_stripped() {
        assert_eq!(
            numeric_component("db/migrations/20240101_init.sql").unwrap(),
            20_240_101
        );
    }

    #[test]
    fn only_first_separator_counts() {
        assert_eq!(numeric_component("12_add_user_table.sql").unwrap(), 12);
    }

    #[test]
    fn missing_separator() {
        assert!(matches!(
            numeric_component("add_users.sql"),
            Err(Error::MissingSeparator(_))
        ));
        assert!(matches!(
            numeric_component("001.sql"),
            Err(Error::MissingSeparator(_))
        ));
    }

    #[test]
    fn zero_and_negative_versions_are_invalid() {
        assert!(matches!(
            numeric_component("0_init.sql"),
            Err(Error::InvalidVersion { .. })
        ));
        assert!(matches!(
            numeric_component("-4_init.sql"),
            Err(Error::InvalidVersion { .. })
        ));
        assert!(matches!(
            numeric_component("99999999999999999999_huge.sql"),
            Err(Error::InvalidVersion { .. })
        ));
        assert!(matches!(
            numeric_component("12b_typo.sql"),
            Err(Error::InvalidVersion { .. })
        ));
    }

    #[test]
    fn unknown_extensions_are_rejected_first() {
        assert!(matches!(
            numeric_component("001_init.txt"),
            Err(Error::UnrecognizedKind(_))
        ));
        assert!(matches!(
            numeric_component("README"),
            Err(Error::UnrecognizedKind(_))
        ));
    }

    #[test]
    fn kind_follows_extension() {
        assert_eq!(
            MigrationKind::from_path("1_a.sql").unwrap(),
            MigrationKind::Script
        );
        assert_eq!(
            MigrationKind::from_path("1_a.rs").unwrap(),
            MigrationKind::Function
        );
    }
}
