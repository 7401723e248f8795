//! provides logging helpers

use std::path::Path;

use tracing::Subscriber;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Directory to write rolling log files into. Logs go to stderr when unset.
pub const LOG_PATH_ENV_VAR: &str = "EXECUTOR_LOG_PATH";

const LOG_FILE_PREFIX: &str = "executor.log";

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Build the human readable fmt layer shared by all binaries.
///
/// Falls back to stderr if the rolling file appender can't be created.
pub fn get_fmt_layer<S>(log_path: Option<String>) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let Some(log_path) = log_path else {
        return stderr_layer();
    };

    match rolling_appender(Path::new(&log_path)) {
        Ok(appender) => layer()
            .with_writer(appender)
            .with_ansi(false)
            .with_target(true)
            .boxed(),
        Err(e) => {
            eprintln!("failed to create log file appender in {log_path}: {e}, logging to stderr");
            stderr_layer()
        }
    }
}

fn stderr_layer<S>() -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .boxed()
}

fn rolling_appender(
    dir: &Path,
) -> Result<RollingFileAppender, tracing_appender::rolling::InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(7)
        .build(dir)
}
