//! provides logging helpers

use tracing_subscriber::filter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use utils::logging::get_fmt_layer;
use utils::logging::LOG_PATH_ENV_VAR;

/// initiate the global tracing subscriber
pub fn init() {
    let log_path = std::env::var(LOG_PATH_ENV_VAR).ok();
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    registry()
        .with(get_fmt_layer(log_path).with_filter(env_filter))
        .init();
}
