//! Watch command: print every change reported for a path.

use std::sync::Arc;

use anyhow::Context;

use crate::config::Settings;
use crate::observer::NotifyChangeService;
use crate::path::FilePath;
use crate::subscription::ObserverPublisher;

/// Observe `path` until Ctrl-C.
///
/// `recursive` overrides `observer.recursive` when set.
pub async fn run(
    path: FilePath,
    recursive: Option<bool>,
    json: bool,
    config: &Settings,
) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("path does not exist: {path}");
    }

    let recursive = recursive.unwrap_or(config.observer.recursive);
    let service = Arc::new(NotifyChangeService::new(recursive));
    let publisher =
        ObserverPublisher::for_path_with_config(service, path.clone(), &config.observer)
            .with_context(|| format!("failed to observe {path}"))?;

    let (mut changes, subscription) = publisher.subscribe();
    crate::log_event!("watch", "started", "{path} (recursive: {recursive})");
    eprintln!("Watching {path}. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = changes.recv() => {
                let Some(changed) = change else { break };
                print_change(&changed, json);
            }
        }
    }

    subscription.cancel();
    crate::log_event!("watch", "stopped", "{path}");
    Ok(())
}

fn print_change(path: &FilePath, json: bool) {
    let now = chrono::Local::now();
    if json {
        let line = serde_json::json!({
            "time": now.to_rfc3339(),
            "path": path,
        });
        println!("{line}");
    } else {
        println!("{} changed {path}", now.format("%H:%M:%S%.3f"));
    }
}
