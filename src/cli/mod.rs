use crate::classify::Classifier;
use crate::config::Config;
use anyhow::Result;

pub mod args;
pub mod progress;
pub mod sync;

pub use args::{Cli, CliCommand, SyncCliArgs};
pub use sync::handle_sync_command;

/// Print the destination key for a topic using the configured rules.
pub fn handle_classify_command(topic: &str) -> Result<()> {
    let config = Config::load()?;
    let classifier = Classifier::new(config.rules, &config.sync.default_destination);
    println!("{}", classifier.classify(topic));
    Ok(())
}
