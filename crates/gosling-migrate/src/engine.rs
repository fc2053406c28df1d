//! Applies one migration in one direction against a database capability.
//!
//! A run either commits both the payload and its version record, or (in
//! transactional mode) leaves nothing behind. Non-transactional runs execute
//! directly on the connection and record the version afterwards.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use gosling_common::{Error, Result, RunState};
use tracing::{debug, info, warn};

use crate::dialect::Dialect;
use crate::executor::{Database, Executor, Transaction};
use crate::migration::{Direction, Migration, MigrationBody};
use crate::parser;
use crate::registry::{FunctionRegistry, MigrationFn};
use crate::store::VersionStore;

/// Cooperative cancellation flag shared between a run and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Successful result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The payload ran. A function migration counts as one statement.
    Applied { statements: usize },
    /// Nothing to execute in this direction; the version was still recorded.
    AppliedEmpty,
}

impl RunOutcome {
    pub fn state(&self) -> RunState {
        RunState::Applied
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::AppliedEmpty)
    }
}

enum Payload {
    Statements(Vec<String>),
    Function(MigrationFn),
    Empty,
}

/// Why a payload stopped before completing.
struct Halt {
    cause: String,
    cancelled: bool,
    /// Earlier work may already have been executed.
    partial: bool,
}

/// Called as a run moves through `Pending`, `Running` and a terminal state.
pub type RunObserver = Arc<dyn Fn(&Migration, Direction, RunState) + Send + Sync>;

pub struct Engine {
    store: VersionStore,
    registry: FunctionRegistry,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    observer: Option<RunObserver>,
}

impl Engine {
    pub fn new(
        dialect: Arc<dyn Dialect>,
        registry: FunctionRegistry,
        table: impl Into<String>,
    ) -> Self {
        Self {
            store: VersionStore::new(dialect, table),
            registry,
            cancel: CancellationToken::new(),
            timeout: None,
            observer: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Upper bound on a single run, measured from the start of `run`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_observer(mut self, observer: RunObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Apply `migration` in `direction`. Does not consult the version table;
    /// deciding whether the run is needed is the caller's job.
    pub fn run<D: Database>(
        &self,
        db: &mut D,
        migration: &Migration,
        direction: Direction,
    ) -> Result<RunOutcome> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        self.notify(migration, direction, RunState::Pending);
        let (payload, use_tx) = match self.load(migration, direction) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.notify(migration, direction, e.run_state());
                return Err(e);
            }
        };
        self.notify(migration, direction, RunState::Running);
        debug!(
            "running {} {direction} (transaction: {use_tx})",
            migration.file_name()
        );

        let result = if use_tx {
            self.run_in_transaction(db, migration.version, direction, &payload, deadline)
        } else {
            self.run_direct(db, migration.version, direction, &payload, deadline)
        };

        match &result {
            Ok(RunOutcome::AppliedEmpty) => info!("EMPTY {}", migration.file_name()),
            Ok(RunOutcome::Applied { .. }) => info!("OK    {}", migration.file_name()),
            Err(e) => warn!("FAIL  {} ({direction}): {e}", migration.file_name()),
        }
        let state = match &result {
            Ok(outcome) => outcome.state(),
            Err(e) => e.run_state(),
        };
        self.notify(migration, direction, state);
        result
    }

    fn notify(&self, migration: &Migration, direction: Direction, state: RunState) {
        if let Some(observer) = &self.observer {
            observer(migration, direction, state);
        }
    }

    fn load(&self, migration: &Migration, direction: Direction) -> Result<(Payload, bool)> {
        match &migration.body {
            MigrationBody::Script { path } => {
                let text = fs::read_to_string(path).map_err(|e| Error::SourceUnavailable {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                let parsed = parser::parse(&text, direction)?;
                let payload = if parsed.is_empty() {
                    Payload::Empty
                } else {
                    Payload::Statements(parsed.statements)
                };
                Ok((payload, migration.transactional && parsed.use_tx))
            }
            MigrationBody::Function => {
                let entry =
                    self.registry
                        .get(migration.version)
                        .ok_or_else(|| Error::NotRegistered {
                            version: migration.version,
                            origin: migration.source.clone(),
                        })?;
                let payload = entry
                    .body(direction)
                    .map_or(Payload::Empty, Payload::Function);
                Ok((payload, migration.transactional && entry.transactional))
            }
        }
    }

    fn run_in_transaction<D: Database>(
        &self,
        db: &mut D,
        version: i64,
        direction: Direction,
        payload: &Payload,
        deadline: Option<Instant>,
    ) -> Result<RunOutcome> {
        let mut tx = db.begin().map_err(|e| Error::MigrationFailed {
            version,
            cause: e.to_string(),
            rollback_error: None,
            partially_applied: false,
        })?;

        let applied = match self
            .apply(&mut tx, payload, deadline)
            .and_then(|applied| self.checkpoint(deadline, true).map(|()| applied))
        {
            Ok(applied) => applied,
            Err(halt) => return Err(abort(tx, version, halt)),
        };

        if let Err(e) = self.store.statement_for(version, direction).execute(&mut tx) {
            let cause = match tx.rollback() {
                Ok(()) => e.to_string(),
                Err(rb) => format!("{e} (rollback also failed: {rb})"),
            };
            return Err(Error::VersionRecordFailed {
                version,
                cause,
                schema_changed: false,
            });
        }

        if let Err(halt) = self.checkpoint(deadline, true) {
            return Err(abort(tx, version, halt));
        }

        tx.commit().map_err(|e| Error::CommitFailed {
            version,
            cause: e.to_string(),
        })?;
        Ok(outcome(applied))
    }

    fn run_direct(
        &self,
        db: &mut dyn Executor,
        version: i64,
        direction: Direction,
        payload: &Payload,
        deadline: Option<Instant>,
    ) -> Result<RunOutcome> {
        let applied =
            self.apply(db, payload, deadline)
                .map_err(|halt| Error::MigrationFailed {
                    version,
                    cause: halt.cause,
                    rollback_error: None,
                    partially_applied: halt.partial,
                })?;

        self.store
            .statement_for(version, direction)
            .execute(db)
            .map_err(|e| Error::VersionRecordFailed {
                version,
                cause: e.to_string(),
                schema_changed: true,
            })?;
        Ok(outcome(applied))
    }

    /// Execute the payload, returning how many statements ran.
    fn apply(
        &self,
        exec: &mut dyn Executor,
        payload: &Payload,
        deadline: Option<Instant>,
    ) -> std::result::Result<usize, Halt> {
        match payload {
            Payload::Empty => Ok(0),
            Payload::Function(f) => {
                self.checkpoint(deadline, false)?;
                f(exec).map_err(|e| Halt {
                    cause: e.to_string(),
                    cancelled: false,
                    partial: true,
                })?;
                Ok(1)
            }
            Payload::Statements(statements) => {
                for (i, sql) in statements.iter().enumerate() {
                    self.checkpoint(deadline, i > 0)?;
                    exec.execute(sql, &[]).map_err(|e| Halt {
                        cause: format!("statement {} of {}: {e}", i + 1, statements.len()),
                        cancelled: false,
                        partial: i > 0,
                    })?;
                }
                Ok(statements.len())
            }
        }
    }

    fn checkpoint(
        &self,
        deadline: Option<Instant>,
        partial: bool,
    ) -> std::result::Result<(), Halt> {
        let reason = if self.cancel.is_cancelled() {
            "run cancelled"
        } else if deadline.is_some_and(|d| Instant::now() >= d) {
            "run timed out"
        } else {
            return Ok(());
        };
        Err(Halt {
            cause: reason.to_string(),
            cancelled: true,
            partial,
        })
    }
}

fn outcome(applied: usize) -> RunOutcome {
    if applied == 0 {
        RunOutcome::AppliedEmpty
    } else {
        RunOutcome::Applied {
            statements: applied,
        }
    }
}

/// Roll back after a halted payload. An interrupted run whose rollback also
/// fails cannot be classified.
fn abort<T: Transaction>(tx: T, version: i64, halt: Halt) -> Error {
    match tx.rollback() {
        Ok(()) => Error::MigrationFailed {
            version,
            cause: halt.cause,
            rollback_error: None,
            partially_applied: false,
        },
        Err(rb) if halt.cancelled => Error::Indeterminate {
            version,
            cause: format!("{}; rollback failed: {rb}", halt.cause),
        },
        Err(rb) => Error::MigrationFailed {
            version,
            cause: halt.cause,
            rollback_error: Some(rb.to_string()),
            partially_applied: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::dialect::SqliteDialect;
    use crate::executor::Row;
    use crate::sqlite::SqliteDatabase;

    const TABLE: &str = "goose_db_version";

    fn engine(registry: FunctionRegistry) -> Engine {
        Engine::new(Arc::new(SqliteDialect), registry, TABLE)
    }

    fn sqlite() -> SqliteDatabase {
        let mut db = SqliteDatabase::in_memory().unwrap();
        engine(FunctionRegistry::new())
            .store()
            .ensure_version_table(&mut db)
            .unwrap();
        db
    }

    fn write_script(dir: &Path, name: &str, body: &str) -> Migration {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        Migration::from_path(&path).unwrap()
    }

    fn table_exists(db: &mut SqliteDatabase, name: &str) -> bool {
        !db.query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            &[name.into()],
        )
        .unwrap()
        .is_empty()
    }

    fn current(db: &mut SqliteDatabase) -> i64 {
        engine(FunctionRegistry::new())
            .store()
            .current_version(db)
            .unwrap()
    }

    #[test]
    fn script_up_and_down_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let m = write_script(
            dir.path(),
            "003_posts.sql",
            "-- +goose Up\nCREATE TABLE post (id INTEGER);\nINSERT INTO post VALUES (1);\n\n-- +goose Down\nDROP TABLE post;\n",
        );
        let mut db = sqlite();
        let engine = engine(FunctionRegistry::new());

        let up = engine.run(&mut db, &m, Direction::Up).unwrap();
        assert_eq!(up, RunOutcome::Applied { statements: 2 });
        assert!(table_exists(&mut db, "post"));
        assert_eq!(current(&mut db), 3);

        let down = engine.run(&mut db, &m, Direction::Down).unwrap();
        assert_eq!(down, RunOutcome::Applied { statements: 1 });
        assert!(!table_exists(&mut db, "post"));
        assert_eq!(current(&mut db), 0);
    }

    #[test]
    fn transactional_failure_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let m = write_script(
            dir.path(),
            "1_broken.sql",
            "-- +goose Up\nCREATE TABLE t (id INTEGER);\nINSERT INTO nope VALUES (1);\n-- +goose Down\n",
        );
        let mut db = sqlite();

        let err = engine(FunctionRegistry::new())
            .run(&mut db, &m, Direction::Up)
            .unwrap_err();
        assert!(matches!(
            &err,
            Error::MigrationFailed { version: 1, rollback_error: None, partially_applied: false, cause }
                if cause.contains("statement 2 of 2")
        ));
        assert_eq!(err.run_state(), RunState::Failed);
        assert!(!table_exists(&mut db, "t"));
        assert_eq!(current(&mut db), 0);
    }

    #[test]
    fn non_transactional_failure_keeps_earlier_statements() {
        let dir = tempfile::tempdir().unwrap();
        let m = write_script(
            dir.path(),
            "2_index.sql",
            "-- +goose NO TRANSACTION\n-- +goose Up\nCREATE TABLE t (id INTEGER);\nINSERT INTO nope VALUES (1);\n-- +goose Down\n",
        );
        let mut db = sqlite();

        let err = engine(FunctionRegistry::new())
            .run(&mut db, &m, Direction::Up)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MigrationFailed { version: 2, partially_applied: true, .. }
        ));
        assert!(table_exists(&mut db, "t"));
        assert_eq!(current(&mut db), 0);
    }

    #[test]
    fn empty_direction_is_reported_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let m = write_script(
            dir.path(),
            "4_seed.sql",
            "-- +goose Up\nCREATE TABLE seed (id INTEGER);\n-- +goose Down\n",
        );
        let mut db = sqlite();
        let engine = engine(FunctionRegistry::new());

        engine.run(&mut db, &m, Direction::Up).unwrap();
        let down = engine.run(&mut db, &m, Direction::Down).unwrap();
        assert!(down.is_empty());
        assert_eq!(down.state(), RunState::Applied);
        assert_eq!(current(&mut db), 0);
    }

    #[test]
    fn source_and_parse_errors_surface_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = sqlite();
        let engine = engine(FunctionRegistry::new());

        let missing = Migration::script(5, dir.path().join("5_gone.sql"));
        assert!(matches!(
            engine.run(&mut db, &missing, Direction::Up),
            Err(Error::SourceUnavailable { .. })
        ));

        let malformed = write_script(dir.path(), "6_bad.sql", "CREATE TABLE x (id INTEGER);\n");
        assert!(matches!(
            engine.run(&mut db, &malformed, Direction::Up),
            Err(Error::MalformedScript { .. })
        ));
    }

    fn create_widgets(db: &mut dyn Executor) -> Result<()> {
        db.execute("CREATE TABLE widgets (id INTEGER);", &[])?;
        db.execute("INSERT INTO widgets VALUES (1);", &[])
    }

    fn fail_halfway(db: &mut dyn Executor) -> Result<()> {
        db.execute("CREATE TABLE widgets (id INTEGER);", &[])?;
        Err(Error::Other("halfway".into()))
    }

    #[test]
    fn function_migrations_run_from_the_registry() {
        let mut registry = FunctionRegistry::new();
        registry
            .add_migration("7_widgets.rs", Some(create_widgets), None)
            .unwrap();
        let engine = engine(registry);
        let mut db = sqlite();
        let m = Migration::function(7, "7_widgets.rs", true);

        assert_eq!(
            engine.run(&mut db, &m, Direction::Up).unwrap(),
            RunOutcome::Applied { statements: 1 }
        );
        assert!(table_exists(&mut db, "widgets"));
        assert_eq!(current(&mut db), 7);

        // No down function: the run is a recorded no-op.
        assert!(engine.run(&mut db, &m, Direction::Down).unwrap().is_empty());
        assert!(table_exists(&mut db, "widgets"));
        assert_eq!(current(&mut db), 0);
    }

    #[test]
    fn failing_function_is_rolled_back() {
        let mut registry = FunctionRegistry::new();
        registry
            .add_migration("8_half.rs", Some(fail_halfway), None)
            .unwrap();
        let mut db = sqlite();
        let m = Migration::function(8, "8_half.rs", true);

        let err = engine(registry).run(&mut db, &m, Direction::Up).unwrap_err();
        assert!(matches!(err, Error::MigrationFailed { version: 8, cause, .. } if cause.contains("halfway")));
        assert!(!table_exists(&mut db, "widgets"));
    }

    #[test]
    fn unregistered_function_fails_before_touching_the_database() {
        let mut db = sqlite();
        let m = Migration::function(9, "9_missing.rs", true);
        assert!(matches!(
            engine(FunctionRegistry::new()).run(&mut db, &m, Direction::Up),
            Err(Error::NotRegistered { version: 9, .. })
        ));
    }

    #[test]
    fn cancelled_run_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let m = write_script(
            dir.path(),
            "10_t.sql",
            "-- +goose Up\nCREATE TABLE t (id INTEGER);\n-- +goose Down\n",
        );
        let token = CancellationToken::new();
        let engine = engine(FunctionRegistry::new()).with_cancellation(token.clone());
        let mut db = sqlite();

        token.cancel();
        let err = engine.run(&mut db, &m, Direction::Up).unwrap_err();
        assert!(matches!(err, Error::MigrationFailed { cause, .. } if cause == "run cancelled"));
        assert!(!table_exists(&mut db, "t"));
    }

    #[test]
    fn elapsed_timeout_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let m = write_script(
            dir.path(),
            "11_t.sql",
            "-- +goose Up\nCREATE TABLE t (id INTEGER);\n-- +goose Down\n",
        );
        let engine = engine(FunctionRegistry::new()).with_timeout(Duration::ZERO);
        let mut db = sqlite();

        let err = engine.run(&mut db, &m, Direction::Up).unwrap_err();
        assert!(matches!(err, Error::MigrationFailed { cause, .. } if cause == "run timed out"));
    }

    /// In-memory capability with injectable failures.
    #[derive(Default)]
    struct Flaky {
        fail_on: Option<&'static str>,
        fail_commit: bool,
        fail_rollback: bool,
        committed: Vec<String>,
    }

    impl Flaky {
        fn check(&self, sql: &str) -> Result<()> {
            match self.fail_on {
                Some(pat) if sql.contains(pat) => Err(Error::Database(format!("refused: {pat}"))),
                _ => Ok(()),
            }
        }
    }

    impl Executor for Flaky {
        fn execute(&mut self, sql: &str, _params: &[crate::executor::Value]) -> Result<()> {
            self.check(sql)?;
            self.committed.push(sql.to_string());
            Ok(())
        }

        fn query(&mut self, _sql: &str, _params: &[crate::executor::Value]) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }
    }

    impl Database for Flaky {
        type Transaction<'a> = FlakyTx<'a>;

        fn begin(&mut self) -> Result<FlakyTx<'_>> {
            Ok(FlakyTx {
                db: self,
                pending: Vec::new(),
            })
        }
    }

    struct FlakyTx<'a> {
        db: &'a mut Flaky,
        pending: Vec<String>,
    }

    impl Executor for FlakyTx<'_> {
        fn execute(&mut self, sql: &str, _params: &[crate::executor::Value]) -> Result<()> {
            self.db.check(sql)?;
            self.pending.push(sql.to_string());
            Ok(())
        }

        fn query(&mut self, _sql: &str, _params: &[crate::executor::Value]) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }
    }

    impl Transaction for FlakyTx<'_> {
        fn commit(self) -> Result<()> {
            if self.db.fail_commit {
                return Err(Error::Database("connection reset during commit".into()));
            }
            self.db.committed.extend(self.pending);
            Ok(())
        }

        fn rollback(self) -> Result<()> {
            if self.db.fail_rollback {
                return Err(Error::Database("connection lost".into()));
            }
            Ok(())
        }
    }

    fn flaky_script(dir: &Path) -> Migration {
        write_script(
            dir,
            "12_t.sql",
            "-- +goose Up\nCREATE TABLE t (id INTEGER);\n-- +goose Down\nDROP TABLE t;\n",
        )
    }

    #[test]
    fn commit_failure_is_indeterminate() {
        let dir = tempfile::tempdir().unwrap();
        let m = flaky_script(dir.path());
        let mut db = Flaky {
            fail_commit: true,
            ..Flaky::default()
        };

        let err = engine(FunctionRegistry::new())
            .run(&mut db, &m, Direction::Up)
            .unwrap_err();
        assert!(matches!(err, Error::CommitFailed { version: 12, .. }));
        assert_eq!(err.run_state(), RunState::Indeterminate);
        assert!(db.committed.is_empty());
    }

    #[test]
    fn version_record_failure_in_transaction_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let m = flaky_script(dir.path());
        let mut db = Flaky {
            fail_on: Some(TABLE),
            ..Flaky::default()
        };

        let err = engine(FunctionRegistry::new())
            .run(&mut db, &m, Direction::Up)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::VersionRecordFailed { version: 12, schema_changed: false, .. }
        ));
        assert!(db.committed.is_empty());
    }

    #[test]
    fn version_record_failure_without_transaction_reports_durable_changes() {
        let dir = tempfile::tempdir().unwrap();
        let m = write_script(
            dir.path(),
            "13_t.sql",
            "-- +goose NO TRANSACTION\n-- +goose Up\nCREATE TABLE t (id INTEGER);\n-- +goose Down\n",
        );
        let mut db = Flaky {
            fail_on: Some(TABLE),
            ..Flaky::default()
        };

        let err = engine(FunctionRegistry::new())
            .run(&mut db, &m, Direction::Up)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::VersionRecordFailed { schema_changed: true, .. }
        ));
        assert_eq!(db.committed, vec!["CREATE TABLE t (id INTEGER);".to_string()]);
    }

    #[test]
    fn rollback_failure_is_appended_to_the_cause() {
        let dir = tempfile::tempdir().unwrap();
        let m = flaky_script(dir.path());
        let mut db = Flaky {
            fail_on: Some("CREATE TABLE"),
            fail_rollback: true,
            ..Flaky::default()
        };

        let err = engine(FunctionRegistry::new())
            .run(&mut db, &m, Direction::Up)
            .unwrap_err();
        assert!(matches!(
            &err,
            Error::MigrationFailed { rollback_error: Some(rb), .. } if rb.contains("connection lost")
        ));
        assert!(err.to_string().contains("rollback also failed"));
    }

    #[test]
    fn cancellation_with_failed_rollback_is_indeterminate() {
        let dir = tempfile::tempdir().unwrap();
        let m = flaky_script(dir.path());
        let token = CancellationToken::new();
        token.cancel();
        let mut db = Flaky {
            fail_rollback: true,
            ..Flaky::default()
        };

        let err = engine(FunctionRegistry::new())
            .with_cancellation(token)
            .run(&mut db, &m, Direction::Up)
            .unwrap_err();
        assert!(matches!(err, Error::Indeterminate { version: 12, .. }));
        assert!(err.is_indeterminate());
    }

    #[test]
    fn migration_marked_non_transactional_skips_the_transaction() {
        let mut registry = FunctionRegistry::new();
        registry
            .add_migration("7_widgets.rs", Some(create_widgets), None)
            .unwrap();
        let m = Migration::function(7, "7_widgets.rs", false);
        // A commit would fail, so success means the run never opened one.
        let mut db = Flaky {
            fail_commit: true,
            ..Flaky::default()
        };

        let outcome = engine(registry).run(&mut db, &m, Direction::Up).unwrap();
        assert_eq!(outcome, RunOutcome::Applied { statements: 1 });
        assert_eq!(
            &db.committed[..2],
            &[
                "CREATE TABLE widgets (id INTEGER);".to_string(),
                "INSERT INTO widgets VALUES (1);".to_string(),
            ]
        );
        assert_eq!(db.committed.len(), 3);
    }

    #[test]
    fn observer_sees_each_state_of_a_run() {
        let dir = tempfile::tempdir().unwrap();
        let seen: Arc<std::sync::Mutex<Vec<(i64, RunState)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let engine = engine(FunctionRegistry::new()).with_observer(Arc::new(
            move |m: &Migration, _: Direction, state: RunState| {
                sink.lock().unwrap().push((m.version, state));
            },
        ));

        let mut db = sqlite();
        engine
            .run(&mut db, &flaky_script(dir.path()), Direction::Up)
            .unwrap();
        let missing = Migration::function(9, "9_missing.rs", true);
        engine.run(&mut db, &missing, Direction::Up).unwrap_err();
        let mut flaky = Flaky {
            fail_commit: true,
            ..Flaky::default()
        };
        engine
            .run(&mut flaky, &flaky_script(dir.path()), Direction::Up)
            .unwrap_err();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (12, RunState::Pending),
                (12, RunState::Running),
                (12, RunState::Applied),
                (9, RunState::Pending),
                (9, RunState::Failed),
                (12, RunState::Pending),
                (12, RunState::Running),
                (12, RunState::Indeterminate),
            ]
        );
    }
}
