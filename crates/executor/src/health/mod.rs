//! Liveness/readiness reporting for the executor daemon.

mod checker;
mod server;

pub use checker::Checker;
pub use checker::MultiChecker;
pub use checker::WatchViewSyncChecker;
pub use server::HealthServer;

use core::error::Error;

/// Health check errors
#[derive(Debug, derive_more::Display)]
pub enum HealthError {
    #[display("{component} has not synced yet")]
    NotSynced { component: String },
    #[display("{count} health checks failed: {details}")]
    ChecksFailed { count: usize, details: String },
    #[display("Health server error: {message}")]
    ServerError { message: String },
}

impl Error for HealthError {}
