//! Download command: wait for a synced file to become local.

use std::sync::Arc;

use crate::config::Settings;
use crate::download::{DownloadWatcher, LocalStatusService};
use crate::path::FilePath;

/// Request `path` and wait for the outcome, or stop on Ctrl-C.
pub async fn run(path: FilePath, if_needed: bool, config: &Settings) -> anyhow::Result<()> {
    let service = Arc::new(LocalStatusService::new());
    let watcher = DownloadWatcher::with_config(service, &config.download);

    let download = async {
        if if_needed {
            watcher.download_if_needed(path.clone()).await
        } else {
            watcher.await_download(path.clone()).await
        }
    };

    tokio::select! {
        outcome = download => {
            outcome?;
            println!("Downloaded {path}");
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Cancelled");
            Ok(())
        }
    }
}
