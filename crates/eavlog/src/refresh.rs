use std::path::{Path, PathBuf};
use std::time::Duration;

use eavlog_core::config::Config;
use eavlog_core::error::Result;
use eavlog_core::settings::SharedSettings;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Re-reads the config file and environment every `interval` and swaps in
/// the runtime settings when they changed. A bad reload keeps the current
/// settings.
pub async fn run_refresh_loop(
    path: PathBuf,
    settings: SharedSettings,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; startup already loaded the config.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = refresh_once(&path, &settings) {
                    warn!(error = %e, path = %path.display(), "config refresh failed, keeping current settings");
                }
            }
        }
    }
    debug!("config refresh loop stopped");
}

pub fn refresh_once(path: &Path, settings: &SharedSettings) -> Result<usize> {
    let cfg = Config::load_from(path)?;
    let changes = settings.update(cfg.runtime_settings());
    for (key, old, new) in &changes {
        info!(key, old = %old, new = %new, "runtime setting changed");
    }
    Ok(changes.len())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use eavlog_core::settings::RuntimeSettings;

    use super::*;

    #[test]
    fn refresh_applies_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_batch_size = 7\nmax_batch_age = \"250ms\"\n").unwrap();

        let settings = SharedSettings::new(RuntimeSettings::default());
        assert_eq!(refresh_once(&path, &settings).unwrap(), 2);
        assert_eq!(settings.load().max_batch_size, 7);
        assert_eq!(settings.load().max_batch_age, Duration::from_millis(250));

        assert_eq!(refresh_once(&path, &settings).unwrap(), 0);
    }

    #[test]
    fn invalid_file_leaves_settings_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_batch_size = 0\n").unwrap();

        let settings = SharedSettings::default();
        assert!(refresh_once(&path, &settings).is_err());
        assert_eq!(settings.load().max_batch_size, 100);
    }

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_refresh_loop(
            dir.path().join("missing.toml"),
            SharedSettings::default(),
            Duration::from_millis(10),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(40)).await;
        cancel.cancel();
        task.await.unwrap();
    }
}
