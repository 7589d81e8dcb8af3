//! Profile file watcher for hot-reload support

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::profile::Profile;

/// Watches a bindings profile and sends every successfully parsed revision
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Profile>,
}

impl ConfigWatcher {
    /// Create a new watcher for the profile file, returning its current content
    pub async fn new(profile_path: impl Into<PathBuf>) -> Result<(Self, Profile)> {
        let profile_path = profile_path.into();
        let (tx, rx) = mpsc::channel(10);

        let initial = Profile::load_from_file(&profile_path)
            .await
            .context("Failed to load initial profile")?;

        let path_clone = profile_path.clone();

        // notify callbacks run on their own OS thread, not in Tokio context
        let runtime_handle = tokio::runtime::Handle::current();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Modify(_)) {
                        debug!("Profile modified: {:?}", event.paths);

                        let path = path_clone.clone();
                        let tx = tx.clone();

                        runtime_handle.spawn(async move {
                            // Debounce: wait for the writer to finish
                            tokio::time::sleep(Duration::from_millis(100)).await;

                            match Profile::load_from_file(&path).await {
                                Ok(profile) => {
                                    info!("Profile reloaded ({} keys)", profile.len());
                                    if let Err(e) = tx.send(profile).await {
                                        error!("Failed to send profile update: {}", e);
                                    }
                                },
                                Err(e) => {
                                    warn!("Failed to reload profile (keeping old bindings): {:#}", e);
                                },
                            }
                        });
                    }
                },
                Err(e) => {
                    error!("Watch error: {}", e);
                },
            }
        })?;

        watcher
            .watch(Path::new(&profile_path), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch profile: {}", profile_path.display()))?;

        info!("Profile watcher started for: {}", profile_path.display());

        Ok((Self { _watcher: watcher, rx }, initial))
    }

    /// Wait for the next profile revision
    /// Returns None if the watcher has been closed
    pub async fn next_profile(&mut self) -> Option<Profile> {
        self.rx.recv().await
    }
}
