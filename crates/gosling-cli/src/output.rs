use std::fmt::Write;

use gosling_migrate::{MigrationStatus, RunOutcome, RunReport};

pub fn print_report(report: &RunReport) {
    for step in &report.steps {
        let note = match step.outcome {
            RunOutcome::Applied { statements } => format!("{statements} statement(s)"),
            RunOutcome::AppliedEmpty => "empty".to_string(),
        };
        println!("{:<5} {} ({note})", step.direction.to_string(), step.source);
    }
    println!("gosling: version {}", report.version);
}

/// Two-column listing: when each migration was applied, or `Pending`.
pub fn status_table(status: &[MigrationStatus]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "    Applied At                  Migration");
    let _ = writeln!(out, "    =======================================");
    for s in status {
        let applied = match (s.applied, s.applied_at) {
            (false, _) => "Pending".to_string(),
            (true, Some(t)) => t.format("%a %b %e %H:%M:%S %Y").to_string(),
            (true, None) => "Applied (no timestamp)".to_string(),
        };
        let _ = writeln!(out, "    {applied:<24} -- {}", s.source);
    }
    out
}
