//! Migration outcome summary shared by every concurrent migration task.
//!
//! Each (org, space, instance) gets exactly one terminal outcome. Later
//! attempts to record a second outcome for the same instance are ignored.

use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;

/// Terminal state of one instance migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// Instance was migrated
    Success,
    /// Instance was deliberately not migrated
    Skipped {
        /// Why it was skipped, if known
        reason: Option<String>,
    },
    /// Migration was attempted and failed
    Failed {
        /// Rendered error
        error: String,
    },
}

/// Outcome attributed to one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Organization name
    pub org: String,
    /// Space name
    pub space: String,
    /// Instance name
    pub instance: String,
    /// Service label (or instance type for user-provided instances)
    pub service: String,
    /// Terminal status
    pub status: OutcomeStatus,
}

/// Append-only accumulator of outcomes, safe for concurrent appends.
#[derive(Debug, Default)]
pub struct MigrationSummary {
    inner: Mutex<SummaryInner>,
}

#[derive(Debug, Default)]
struct SummaryInner {
    outcomes: Vec<Outcome>,
    seen: HashSet<(String, String, String)>,
}

impl MigrationSummary {
    /// Creates an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful migration.
    pub fn record_success(&self, org: &str, space: &str, instance: &str, service: &str) {
        self.push(org, space, instance, service, OutcomeStatus::Success);
    }

    /// Records a skipped instance.
    pub fn record_skip(
        &self,
        org: &str,
        space: &str,
        instance: &str,
        service: &str,
        reason: Option<String>,
    ) {
        self.push(org, space, instance, service, OutcomeStatus::Skipped { reason });
    }

    /// Records a failed migration.
    pub fn record_failure(
        &self,
        org: &str,
        space: &str,
        instance: &str,
        service: &str,
        error: impl fmt::Display,
    ) {
        let status = OutcomeStatus::Failed {
            error: error.to_string(),
        };
        self.push(org, space, instance, service, status);
    }

    fn push(&self, org: &str, space: &str, instance: &str, service: &str, status: OutcomeStatus) {
        let mut inner = self.inner.lock();
        let key = (org.to_string(), space.to_string(), instance.to_string());
        if !inner.seen.insert(key) {
            tracing::warn!(
                org = org,
                space = space,
                instance = instance,
                "outcome already recorded, ignoring {:?}",
                status
            );
            return;
        }
        inner.outcomes.push(Outcome {
            org: org.to_string(),
            space: space.to_string(),
            instance: instance.to_string(),
            service: service.to_string(),
            status,
        });
    }

    /// Snapshot of every recorded outcome in recording order.
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.inner.lock().outcomes.clone()
    }

    /// Number of successful migrations.
    pub fn success_count(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Success))
    }

    /// Number of skipped instances.
    pub fn skipped_count(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Skipped { .. }))
    }

    /// Number of failed migrations.
    pub fn failed_count(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Failed { .. }))
    }

    /// Total number of recorded outcomes.
    pub fn total(&self) -> usize {
        self.inner.lock().outcomes.len()
    }

    /// Returns true if any instance failed.
    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0
    }

    fn count(&self, pred: impl Fn(&OutcomeStatus) -> bool) -> usize {
        self.inner
            .lock()
            .outcomes
            .iter()
            .filter(|o| pred(&o.status))
            .count()
    }
}

impl fmt::Display for MigrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcomes = self.outcomes();
        let succeeded = outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Success)
            .count();
        let skipped: Vec<&Outcome> = outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Skipped { .. }))
            .collect();
        let failed: Vec<&Outcome> = outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Failed { .. }))
            .collect();

        writeln!(
            f,
            "{} succeeded, {} skipped, {} failed",
            succeeded,
            skipped.len(),
            failed.len()
        )?;
        for o in skipped {
            let reason = match &o.status {
                OutcomeStatus::Skipped { reason: Some(r) } => r.as_str(),
                _ => "not selected",
            };
            writeln!(
                f,
                "  skipped {}/{}/{} ({}): {}",
                o.org, o.space, o.instance, o.service, reason
            )?;
        }
        for o in failed {
            if let OutcomeStatus::Failed { error } = &o.status {
                writeln!(
                    f,
                    "  failed  {}/{}/{} ({}): {}",
                    o.org, o.space, o.instance, o.service, error
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counts_each_status() {
        let summary = MigrationSummary::new();
        summary.record_success("o", "s", "a", "p.mysql");
        summary.record_skip("o", "s", "b", "p.redis", Some("not supported".into()));
        summary.record_failure("o", "s", "c", "SQLServer", "plan not found");

        assert_eq!(summary.total(), 3);
        assert_eq!(summary.success_count(), 1);
        assert_eq!(summary.skipped_count(), 1);
        assert_eq!(summary.failed_count(), 1);
        assert!(summary.has_failures());
    }

    #[test]
    fn terminal_outcome_is_never_replaced() {
        let summary = MigrationSummary::new();
        summary.record_failure("o", "s", "a", "svc", "boom");
        summary.record_success("o", "s", "a", "svc");

        let outcomes = summary.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(
            outcomes[0].status,
            OutcomeStatus::Failed {
                error: "boom".into()
            }
        );
    }

    #[test]
    fn same_instance_name_in_different_spaces_is_distinct() {
        let summary = MigrationSummary::new();
        summary.record_success("o", "dev", "db", "svc");
        summary.record_success("o", "prod", "db", "svc");
        assert_eq!(summary.success_count(), 2);
    }

    #[test]
    fn report_attributes_skips_and_failures() {
        let summary = MigrationSummary::new();
        summary.record_skip("org1", "dev", "cache", "p.redis", None);
        summary.record_failure("org1", "prod", "orders", "SQLServer", "no such plan");
        let report = summary.to_string();

        assert!(report.starts_with("0 succeeded, 1 skipped, 1 failed"));
        assert!(report.contains("skipped org1/dev/cache (p.redis): not selected"));
        assert!(report.contains("failed  org1/prod/orders (SQLServer): no such plan"));
    }

    #[tokio::test]
    async fn concurrent_appends_are_all_kept() {
        let summary = Arc::new(MigrationSummary::new());
        let mut handles = Vec::new();
        for i in 0..64 {
            let summary = Arc::clone(&summary);
            handles.push(tokio::spawn(async move {
                summary.record_success("o", "s", &format!("si-{}", i), "svc");
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(summary.success_count(), 64);
    }
}
