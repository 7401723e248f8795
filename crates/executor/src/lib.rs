//! Executor-side cluster context for a multi-cluster batch scheduler.
//!
//! The executor submits pods for scheduled jobs, defers and throttles their
//! deletion, and answers pod/node queries from a watch-driven view of the
//! cluster that is kept consistent with its own recent submissions.

pub mod app;
pub mod cluster_context;
pub mod config;
pub mod health;
pub mod k8s;
pub mod logging;
pub mod util;
