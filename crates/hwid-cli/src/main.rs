mod config;
mod driver;
mod gradle;
mod prompt;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .init();
    hwid_telemetry::init(env!("CARGO_PKG_VERSION"));

    let cli = config::Cli::parse();
    let config = config::Config::from_cli(cli);

    hwid_telemetry::stage("run_started", &[]);
    driver::run(config).await
}

// An operator-supplied RUST_LOG wins outright; info is only the fallback.
fn log_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}
