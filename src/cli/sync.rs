use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::audio::FfmpegProbe;
use crate::classify::Classifier;
use crate::cli::args::SyncCliArgs;
use crate::cli::progress::UploadProgressBar;
use crate::config::Config;
use crate::destination::{Archive, DestinationApi, DestinationKind};
use crate::gdrive::{self, DriveApi};
use crate::google::AuthorizedUserCredentials;
use crate::sync::{
    FileStatus, MeetingStatus, SourceDeletion, SyncOptions, SyncPipeline, SyncReport,
};
use crate::transfer::{no_progress, TransferProgress};
use crate::window::SyncWindow;
use crate::youtube::{self, YouTubeApi};
use crate::zoom::{ZoomClient, ZoomCredentials};

pub async fn handle_sync_command(args: SyncCliArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let service = args.service.as_deref().unwrap_or(&config.sync.service);
    let kind: DestinationKind = service.parse().map_err(|e: String| anyhow!(e))?;
    let window = SyncWindow::resolve(args.from.as_deref(), args.to.as_deref(), Utc::now())?;
    let options = SyncOptions::from_config(&config, window, args.dry_run);
    if options.dry_run {
        println!("Dry run: nothing will be uploaded or deleted");
    }

    let api = connect_destination(kind, &config).await?;
    // A dry run moves no bytes, so there is nothing for a bar to show.
    let progress: Arc<dyn TransferProgress> = if options.dry_run {
        no_progress()
    } else {
        Arc::new(UploadProgressBar::default())
    };
    let archive = Archive::new(api, options.policy, options.dry_run, progress);
    archive
        .validate_credentials()
        .await
        .with_context(|| format!("Invalid {kind} credentials"))?;

    let source = ZoomClient::connect(&zoom_credentials(&config)?)
        .await
        .context("Invalid Zoom credentials")?;
    let probe = FfmpegProbe::new()?;
    let classifier = Classifier::new(config.rules.clone(), &config.sync.default_destination);

    info!(
        "Syncing Zoom recordings to {} from {} to {}",
        kind, window.from, window.to
    );
    let pipeline = SyncPipeline::new(
        Arc::new(source),
        archive,
        classifier,
        Arc::new(probe),
        options,
    );
    let report = pipeline.run().await.context("Sync failed")?;

    print_report(&report);
    Ok(())
}

async fn connect_destination(
    kind: DestinationKind,
    config: &Config,
) -> Result<Arc<dyn DestinationApi>> {
    match kind {
        DestinationKind::YouTube => {
            let credentials =
                AuthorizedUserCredentials::from_file(&config.youtube.credentials_path)?;
            let client = credentials
                .authorize(youtube::SERVICE)
                .await
                .context("Could not authorize with YouTube")?;
            Ok(Arc::new(YouTubeApi::new(client, &config.youtube.privacy)))
        }
        DestinationKind::GoogleDrive => {
            let credentials =
                AuthorizedUserCredentials::from_file(&config.gdrive.credentials_path)?;
            let client = credentials
                .authorize(gdrive::SERVICE)
                .await
                .context("Could not authorize with Google Drive")?;
            Ok(Arc::new(DriveApi::new(client)))
        }
    }
}

fn zoom_credentials(config: &Config) -> Result<ZoomCredentials> {
    let zoom = &config.zoom;
    if zoom.client_id.is_empty() || zoom.client_secret.is_empty() || zoom.account_id.is_empty() {
        bail!(
            "Zoom credentials are missing. Set ZOOM_CLIENT_ID, ZOOM_CLIENT_SECRET and \
             ZOOM_ACCOUNT_ID, or fill in the [zoom] section of the config file"
        );
    }
    Ok(ZoomCredentials {
        client_id: zoom.client_id.clone(),
        client_secret: zoom.client_secret.clone(),
        account_id: zoom.account_id.clone(),
    })
}

fn print_report(report: &SyncReport) {
    println!();
    for meeting in &report.meetings {
        println!(
            "{} ({})",
            meeting.topic,
            meeting.start_time.format("%Y-%m-%d %H:%M UTC")
        );
        match &meeting.status {
            MeetingStatus::FilteredOut(reason) => println!("  skipped: {reason}"),
            MeetingStatus::NotReady(readiness) => {
                println!("  not ready: {}", readiness.as_str())
            }
            MeetingStatus::Unattended(deletion) => {
                println!("  unattended, recording {}", describe_deletion(deletion))
            }
            MeetingStatus::Failed(reason) => println!("  FAILED: {reason}"),
            MeetingStatus::Processed => {}
        }
        for note in &meeting.notes {
            println!("  note: {note}");
        }

        for file in &meeting.files {
            let status = match &file.status {
                FileStatus::Uploaded { id } => format!("uploaded ({id})"),
                FileStatus::SkippedSilent(reason) => format!("skipped: {reason}"),
                FileStatus::SkippedDuplicate { existing_id } => {
                    format!("already uploaded ({existing_id})")
                }
                FileStatus::Failed(reason) => format!("FAILED: {reason}"),
            };
            println!("  {}: {}", file.name, status);
            if let Some(deletion) = &file.deletion {
                println!("    source {}", describe_deletion(deletion));
            }
            for note in &file.notes {
                println!("    note: {note}");
            }
        }
    }

    println!();
    println!(
        "{} meetings, {} uploaded, {} skipped, {} failed",
        report.meetings.len(),
        report.uploaded(),
        report.skipped(),
        report.failed()
    );
}

fn describe_deletion(deletion: &SourceDeletion) -> String {
    match deletion {
        SourceDeletion::Trashed => "moved to trash".to_string(),
        SourceDeletion::WouldTrash => "would be moved to trash".to_string(),
        SourceDeletion::Failed(reason) => format!("could not be deleted: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_zoom_credentials() {
        let err = zoom_credentials(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("ZOOM_CLIENT_ID"));
    }

    #[test]
    fn test_zoom_credentials_from_config() {
        let mut config = Config::default();
        config.zoom.client_id = "id".into();
        config.zoom.client_secret = "secret".into();
        config.zoom.account_id = "acct".into();

        let credentials = zoom_credentials(&config).unwrap();
        assert_eq!(credentials.account_id, "acct");
    }

    #[test]
    fn test_describe_deletion() {
        assert_eq!(describe_deletion(&SourceDeletion::Trashed), "moved to trash");
        assert!(describe_deletion(&SourceDeletion::Failed("403".into())).contains("403"));
    }
}
