use anyhow::Result;
use clap::Parser;
use executor::app::Application;
use executor::config::Cli;
use executor::config::Commands;
use executor::config::DaemonArgs;
use executor::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon(daemon_args) => run_daemon(*daemon_args).await,
    }
}

async fn run_daemon(daemon_args: DaemonArgs) -> Result<()> {
    logging::init();

    tracing::info!(
        cluster_id = %daemon_args.cluster_id,
        "Starting executor daemon {}",
        &**version::VERSION
    );

    let app = Application::build(daemon_args).await?;

    let result = app.run().await;
    app.shutdown();

    result
}
