//! Batch operations over a migrations directory.
//!
//! Every operation reads the current version first and then applies
//! migrations one at a time through [`Engine::run`], stopping at the first
//! error. Up batches run in ascending order, down batches in descending order.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use gosling_common::{Error, Result};
use serde::Serialize;
use tracing::info;

use crate::collect::collect_migrations;
use crate::engine::{Engine, RunOutcome};
use crate::executor::Database;
use crate::migration::{Direction, Migration, Migrations};

/// One completed run inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub version: i64,
    pub source: String,
    pub direction: Direction,
    pub outcome: RunOutcome,
}

/// What a batch did, and the version it left the database at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub steps: Vec<Step>,
    pub version: i64,
}

impl RunReport {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Applied state of one collected migration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationStatus {
    pub version: i64,
    pub source: String,
    pub applied: bool,
    pub applied_at: Option<DateTime<Utc>>,
}

pub struct Migrator {
    engine: Engine,
    dir: PathBuf,
}

impl Migrator {
    pub fn new(engine: Engine, dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            dir: dir.into(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn collect(&self, current: i64, target: i64) -> Result<Migrations> {
        collect_migrations(&self.dir, self.engine.registry(), current, target)
    }

    /// Current version, creating the version table on first use.
    pub fn version<D: Database>(&self, db: &mut D) -> Result<i64> {
        self.engine.store().ensure_version_table(db)
    }

    /// Apply every pending migration.
    pub fn up<D: Database>(&self, db: &mut D) -> Result<RunReport> {
        self.up_to(db, i64::MAX)
    }

    /// Apply pending migrations up to and including `target`.
    pub fn up_to<D: Database>(&self, db: &mut D, target: i64) -> Result<RunReport> {
        let current = self.version(db)?;
        let pending = self.collect(current, target)?;

        let mut report = RunReport {
            steps: Vec::new(),
            version: current,
        };
        for migration in &pending {
            self.step(db, migration, Direction::Up, &mut report)?;
        }
        if report.is_empty() {
            info!("no migrations to run. current version: {current}");
        }
        Ok(report)
    }

    /// Apply only the next pending migration.
    pub fn up_by_one<D: Database>(&self, db: &mut D) -> Result<RunReport> {
        let current = self.version(db)?;
        let pending = self.collect(current, i64::MAX)?;

        let mut report = RunReport {
            steps: Vec::new(),
            version: current,
        };
        match pending.next(current) {
            Some(migration) => self.step(db, migration, Direction::Up, &mut report)?,
            None => info!("no migrations to run. current version: {current}"),
        }
        Ok(report)
    }

    /// Roll back the current version.
    pub fn down<D: Database>(&self, db: &mut D) -> Result<RunReport> {
        let current = self.version(db)?;
        let mut report = RunReport {
            steps: Vec::new(),
            version: current,
        };
        if current == 0 {
            info!("no migrations to roll back");
            return Ok(report);
        }

        let all = self.collect(0, i64::MAX)?;
        let migration = all.current(current).ok_or(Error::NoMigration(current))?;
        self.step(db, migration, Direction::Down, &mut report)?;
        Ok(report)
    }

    /// Roll back applied migrations until the current version is `target` or
    /// lower.
    pub fn down_to<D: Database>(&self, db: &mut D, target: i64) -> Result<RunReport> {
        let all = self.collect(0, i64::MAX)?;
        let mut report = RunReport {
            steps: Vec::new(),
            version: self.version(db)?,
        };

        loop {
            let current = self.engine.store().current_version(db)?;
            if current <= target {
                if report.is_empty() {
                    info!("no migrations to roll back. current version: {current}");
                }
                return Ok(report);
            }
            let migration = all.current(current).ok_or(Error::NoMigration(current))?;
            self.step(db, migration, Direction::Down, &mut report)?;
        }
    }

    /// Roll back the current version and apply it again.
    pub fn redo<D: Database>(&self, db: &mut D) -> Result<RunReport> {
        let current = self.version(db)?;
        let all = self.collect(0, i64::MAX)?;
        let migration = all.current(current).ok_or(Error::NoMigration(current))?;

        let mut report = RunReport {
            steps: Vec::new(),
            version: current,
        };
        self.step(db, migration, Direction::Down, &mut report)?;
        self.step(db, migration, Direction::Up, &mut report)?;
        Ok(report)
    }

    /// Roll back every applied migration, newest first.
    pub fn reset<D: Database>(&self, db: &mut D) -> Result<RunReport> {
        let current = self.version(db)?;
        let all = self.collect(0, i64::MAX)?;

        let mut report = RunReport {
            steps: Vec::new(),
            version: current,
        };
        for migration in all.iter().rev() {
            if !self.engine.store().is_applied(db, migration.version)? {
                continue;
            }
            self.step(db, migration, Direction::Down, &mut report)?;
        }
        Ok(report)
    }

    /// Applied state of every collected migration, oldest first.
    pub fn status<D: Database>(&self, db: &mut D) -> Result<Vec<MigrationStatus>> {
        self.version(db)?;
        let all = self.collect(0, i64::MAX)?;

        all.iter()
            .map(|m| {
                let record = self.engine.store().applied_record(db, m.version)?;
                Ok(MigrationStatus {
                    version: m.version,
                    source: m.file_name().to_string(),
                    applied: record.is_some(),
                    applied_at: record.and_then(|r| r.applied_at),
                })
            })
            .collect()
    }

    /// [`Self::status`] rendered as pretty-printed JSON.
    pub fn status_json<D: Database>(&self, db: &mut D) -> Result<String> {
        let status = self.status(db)?;
        Ok(serde_json::to_string_pretty(&status)?)
    }

    fn step<D: Database>(
        &self,
        db: &mut D,
        migration: &Migration,
        direction: Direction,
        report: &mut RunReport,
    ) -> Result<()> {
        let outcome = self.engine.run(db, migration, direction)?;
        report.steps.push(Step {
            version: migration.version,
            source: migration.file_name().to_string(),
            direction,
            outcome,
        });
        report.version = self.engine.store().current_version(db)?;
        Ok(())
    }
}
