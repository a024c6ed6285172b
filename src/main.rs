use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use zoom_archive::cli::{handle_classify_command, handle_sync_command, Cli, CliCommand};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("zoom-archive {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Classify { topic }) => handle_classify_command(&topic),
        Some(CliCommand::Sync(args)) => handle_sync_command(args).await,
        None => handle_sync_command(Default::default()).await,
    }
}
