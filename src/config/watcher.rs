//! Configuration file watcher for hot reload.
//!
//! The parent directory is watched, not the file, so saves that rename a
//! temp file over the original are still seen.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::env::EnvSource;
use crate::config::loader::load_with_env;
use crate::config::schema::ShieldConfig;

/// Watches the configuration file and emits validated configurations.
///
/// Every accepted update is the file re-read with the startup environment
/// overlaid, so a reload can never drop an environment override.
pub struct ConfigWatcher {
    path: PathBuf,
    env: EnvSource,
    update_tx: mpsc::UnboundedSender<ShieldConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end of its updates.
    pub fn new(path: &Path, env: EnvSource) -> (Self, mpsc::UnboundedReceiver<ShieldConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                env,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            env,
            update_tx,
        } = self;
        let directory = watch_directory(&path);
        let file_name = path.file_name().map(|n| n.to_os_string());
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = %e, "Config watch error");
                        return;
                    }
                };
                if !is_content_change(&event.kind) {
                    return;
                }
                let touches_file = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if !touches_file {
                    return;
                }

                tracing::info!(path = %watched.display(), "Config file changed, reloading");
                match load_with_env(Some(&watched), &env) {
                    Ok(config) => {
                        let _ = update_tx.send(config);
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            "Rejected config change, keeping current configuration"
                        );
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}

fn watch_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    #[test]
    fn bare_file_name_watches_current_directory() {
        assert_eq!(watch_directory(Path::new("shield.toml")), PathBuf::from("."));
        assert_eq!(
            watch_directory(Path::new("/etc/shield/shield.toml")),
            PathBuf::from("/etc/shield")
        );
    }

    #[test]
    fn only_writes_and_creates_trigger_reload() {
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(!is_content_change(&EventKind::Remove(RemoveKind::File)));
    }

    #[tokio::test]
    async fn rewritten_file_is_reloaded_with_env_overlay() {
        let dir = std::env::temp_dir().join(format!("shield-watch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("shield.toml");
        std::fs::write(&path, "environment = \"staging\"\n").unwrap();

        let env = EnvSource::from_pairs([("ACCESS_AUD", "aud-from-env")]);
        let (watcher, mut updates) = ConfigWatcher::new(&path, env);
        let _handle = watcher.run().unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&path, "environment = \"production\"\n").unwrap();

        // A truncate-then-write can surface an intermediate reload first.
        let config = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let config = updates.recv().await.unwrap();
                if config.environment.as_deref() == Some("production") {
                    return config;
                }
            }
        })
        .await
        .expect("no reload observed");
        assert_eq!(config.identity.audience.as_deref(), Some("aud-from-env"));

        std::fs::remove_dir_all(&dir).unwrap_or_default();
    }
}
