use anyhow::Result;
use clap::Parser;
use recast::{
    app,
    cli::{handle_inspect_command, Cli, CliCommand},
    config::Config,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("Recast {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Inspect(args)) => {
            handle_inspect_command(args)?;
            return Ok(());
        }
        Some(CliCommand::Run) | None => {}
    }

    let config = match &cli.config {
        Some(path) => Config::load_explicit(path)?,
        None => Config::load()?,
    };
    app::run_service(config).await
}
