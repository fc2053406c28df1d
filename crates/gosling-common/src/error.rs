use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle of a single migration run.
///
/// Every run starts `Pending`, becomes `Running` once the engine takes the
/// connection, and ends in one of the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running,
    Applied,
    Failed,
    /// The commit (or rollback) outcome could not be confirmed. Needs manual
    /// verification; never retried automatically.
    Indeterminate,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::Failed | Self::Indeterminate)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("unrecognized migration kind: {0}")]
    UnrecognizedKind(String),

    #[error("no version separator found in {0}")]
    MissingSeparator(String),

    #[error("invalid version in {name}: {reason}")]
    InvalidVersion { name: String, reason: String },

    #[error("malformed script at line {line}: {message} (near `{context}`)")]
    MalformedScript {
        line: usize,
        context: String,
        message: String,
    },

    #[error("migration source unavailable: {path}: {reason}")]
    SourceUnavailable { path: String, reason: String },

    #[error("migration {version} ({origin}) has no registered functions")]
    NotRegistered { version: i64, origin: String },

    #[error("duplicate migration version {version}: {first} and {second}")]
    DuplicateVersion {
        version: i64,
        first: String,
        second: String,
    },

    #[error("migration {version} failed: {cause}{}", rollback_note(.rollback_error))]
    MigrationFailed {
        version: i64,
        cause: String,
        rollback_error: Option<String>,
        /// Set for non-transactional runs where earlier statements may already
        /// be durable.
        partially_applied: bool,
    },

    #[error("migration {version} commit failed, applied state is indeterminate: {cause}")]
    CommitFailed { version: i64, cause: String },

    #[error("migration {version} ran but its version record failed{}: {cause}", schema_note(.schema_changed))]
    VersionRecordFailed {
        version: i64,
        cause: String,
        schema_changed: bool,
    },

    #[error("migration {version} outcome is indeterminate: {cause}")]
    Indeterminate { version: i64, cause: String },

    #[error("no migration found for version {0}")]
    NoMigration(i64),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

fn rollback_note(rollback_error: &Option<String>) -> String {
    match rollback_error {
        Some(e) => format!(" (rollback also failed: {e})"),
        None => String::new(),
    }
}

fn schema_note(schema_changed: &bool) -> &'static str {
    if *schema_changed {
        " (schema changes are already durable)"
    } else {
        ""
    }
}

impl Error {
    /// Terminal state a run ends in when it returns this error.
    pub fn run_state(&self) -> RunState {
        match self {
            Self::CommitFailed { .. } | Self::Indeterminate { .. } => RunState::Indeterminate,
            _ => RunState::Failed,
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        self.run_state() == RunState::Indeterminate
    }

    /// True when the database may hold effects of a run that did not finish:
    /// partial non-transactional runs, orphaned schema changes, or unknown
    /// commit outcomes.
    pub fn may_have_changed_state(&self) -> bool {
        match self {
            Self::MigrationFailed {
                partially_applied, ..
            } => *partially_applied,
            Self::VersionRecordFailed { schema_changed, .. } => *schema_changed,
            Self::CommitFailed { .. } | Self::Indeterminate { .. } => true,
            _ => false,
        }
    }
}
