use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "zoom-archive")]
#[command(about = "Archive Zoom cloud recordings to YouTube or Google Drive", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Upload new recordings and optionally clean them up in Zoom
    Sync(SyncCliArgs),
    /// Show which playlist or folder a meeting topic would go to
    Classify {
        /// Meeting topic, quoted
        topic: String,
    },
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug, Default)]
pub struct SyncCliArgs {
    /// Report what would happen without uploading or deleting anything
    #[arg(long)]
    pub dry_run: bool,
    /// Start of the window: RFC 3339, YYYY-MM-DD or an offset like 5d (default: 7d)
    #[arg(long)]
    pub from: Option<String>,
    /// End of the window, same formats as --from (default: now)
    #[arg(long)]
    pub to: Option<String>,
    /// Destination: youtube or gdrive (default: from config)
    #[arg(long)]
    pub service: Option<String>,
    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,
}
