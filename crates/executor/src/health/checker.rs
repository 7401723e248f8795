use std::sync::Arc;

use error_stack::Report;

use super::HealthError;
use crate::k8s::WatchView;

pub trait Checker: Send + Sync {
    fn check(&self) -> Result<(), Report<HealthError>>;
}

/// Unhealthy until the watch view has completed its initial listing.
pub struct WatchViewSyncChecker {
    watch_view: Arc<WatchView>,
}

impl WatchViewSyncChecker {
    pub fn new(watch_view: Arc<WatchView>) -> Self {
        Self { watch_view }
    }
}

impl Checker for WatchViewSyncChecker {
    fn check(&self) -> Result<(), Report<HealthError>> {
        if self.watch_view.has_synced() {
            Ok(())
        } else {
            Err(Report::new(HealthError::NotSynced {
                component: "watch view".to_string(),
            }))
        }
    }
}

/// Runs every registered checker; healthy only if all of them are.
#[derive(Default)]
pub struct MultiChecker {
    checkers: Vec<Arc<dyn Checker>>,
}

impl MultiChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, checker: Arc<dyn Checker>) {
        self.checkers.push(checker);
    }
}

impl Checker for MultiChecker {
    fn check(&self) -> Result<(), Report<HealthError>> {
        let mut failures: Vec<Report<HealthError>> = self
            .checkers
            .iter()
            .filter_map(|checker| checker.check().err())
            .collect();

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            count => {
                let details = failures
                    .iter()
                    .map(|report| report.current_context().to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(Report::new(HealthError::ChecksFailed { count, details }))
            }
        }
    }
}
