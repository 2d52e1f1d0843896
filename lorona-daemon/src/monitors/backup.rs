//! Backup folder checker.
//!
//! The newest regular file of the folder counts as the last backup. The
//! folder is backed up when that file was modified within the last day and is
//! at least `minimum_file_size` bytes.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use lorona_core::config::BackupConfig;
use lorona_core::event::BackupInfo;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Maximum age of the newest file for the folder to count as backed up.
pub const MAX_BACKUP_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Checks one backup folder, rescheduling itself at its check interval.
pub struct BackupChecker {
    folder: PathBuf,
    minimum_file_size: u64,
    interval: Duration,
    tx: mpsc::Sender<BackupInfo>,
}

impl BackupChecker {
    pub fn new(config: &BackupConfig, tx: mpsc::Sender<BackupInfo>) -> Self {
        Self {
            folder: config.folder.clone(),
            minimum_file_size: config.minimum_file_size,
            interval: config.check_interval(),
            tx,
        }
    }

    /// Checks the folder once.
    pub async fn check(&self) -> BackupInfo {
        match newest_file(&self.folder).await {
            Ok(Some(newest)) => {
                let fresh = SystemTime::now()
                    .duration_since(newest.modified)
                    .map_or(true, |age| age <= MAX_BACKUP_AGE);
                BackupInfo {
                    backup_directory: self.folder.clone(),
                    was_backed_up: fresh && newest.size >= self.minimum_file_size,
                    last_backup_file: Some(newest.name),
                    last_backup_size: newest.size,
                    last_backup_time: Some(DateTime::<Utc>::from(newest.modified)),
                    checked_at: Utc::now(),
                }
            }
            Ok(None) => BackupInfo::missing(&self.folder),
            Err(e) => {
                tracing::warn!(folder = %self.folder.display(), error = %e, "cannot read backup folder");
                BackupInfo::missing(&self.folder)
            }
        }
    }

    /// Checks until cancelled or the queue closes.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            folder = %self.folder.display(),
            interval_secs = self.interval.as_secs(),
            "backup checker started"
        );

        loop {
            let info = self.check().await;
            if !info.was_backed_up {
                tracing::warn!(
                    folder = %self.folder.display(),
                    last_file = ?info.last_backup_file,
                    "no recent backup found"
                );
            }
            if self.tx.send(info).await.is_err() {
                tracing::debug!(folder = %self.folder.display(), "backup queue closed");
                break;
            }
            if !super::wait_next(&cancel, self.interval).await {
                break;
            }
        }

        tracing::info!(folder = %self.folder.display(), "backup checker stopped");
    }
}

struct NewestFile {
    name: String,
    size: u64,
    modified: SystemTime,
}

async fn newest_file(folder: &Path) -> std::io::Result<Option<NewestFile>> {
    let mut entries = tokio::fs::read_dir(folder).await?;
    let mut newest: Option<NewestFile> = None;

    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(path = %entry.path().display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        consider(
            &mut newest,
            entry.file_name().to_string_lossy().into_owned(),
            metadata.len(),
            metadata.modified(),
        );
    }

    Ok(newest)
}

/// Keeps the newer of `newest` and one candidate file.
///
/// A candidate whose modification time cannot be read is skipped.
fn consider(
    newest: &mut Option<NewestFile>,
    name: String,
    size: u64,
    modified: std::io::Result<SystemTime>,
) {
    let modified = match modified {
        Ok(modified) => modified,
        Err(e) => {
            tracing::debug!(file = %name, error = %e, "skipping entry without modification time");
            return;
        }
    };

    if newest.as_ref().is_none_or(|current| modified > current.modified) {
        *newest = Some(NewestFile {
            name,
            size,
            modified,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(folder: &Path, minimum_file_size: u64) -> BackupChecker {
        let (tx, _rx) = mpsc::channel(1);
        let config = BackupConfig {
            folder: folder.to_path_buf(),
            minimum_file_size,
            check_interval: "1h".to_owned(),
        };
        BackupChecker::new(&config, tx)
    }

    fn write_aged(path: &Path, bytes: usize, age: Duration) {
        std::fs::write(path, vec![0u8; bytes]).unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[tokio::test]
    async fn recent_large_file_counts_as_backup() {
        let dir = tempfile::tempdir().unwrap();
        write_aged(&dir.path().join("old.tar.gz"), 4096, Duration::from_secs(3 * 86_400));
        write_aged(&dir.path().join("db-latest.tar.gz"), 2048, Duration::from_secs(3600));

        let info = checker(dir.path(), 1024).check().await;
        assert!(info.was_backed_up);
        assert_eq!(info.last_backup_file.as_deref(), Some("db-latest.tar.gz"));
        assert_eq!(info.last_backup_size, 2048);
        assert!(info.last_backup_time.is_some());
    }

    #[tokio::test]
    async fn small_file_is_not_a_backup() {
        let dir = tempfile::tempdir().unwrap();
        write_aged(&dir.path().join("db.tar.gz"), 10, Duration::from_secs(60));

        let info = checker(dir.path(), 1024).check().await;
        assert!(!info.was_backed_up);
        assert_eq!(info.last_backup_file.as_deref(), Some("db.tar.gz"));
    }

    #[tokio::test]
    async fn stale_file_is_not_a_backup() {
        let dir = tempfile::tempdir().unwrap();
        write_aged(&dir.path().join("db.tar.gz"), 4096, Duration::from_secs(2 * 86_400));

        let info = checker(dir.path(), 0).check().await;
        assert!(!info.was_backed_up);
    }

    #[test]
    fn entry_without_mtime_is_skipped() {
        let now = SystemTime::now();
        let mut newest = None;

        consider(&mut newest, "a.tar.gz".to_owned(), 10, Ok(now - Duration::from_secs(60)));
        consider(
            &mut newest,
            "broken.tar.gz".to_owned(),
            20,
            Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "no mtime")),
        );
        assert_eq!(newest.as_ref().map(|f| f.name.as_str()), Some("a.tar.gz"));

        consider(&mut newest, "b.tar.gz".to_owned(), 30, Ok(now));
        let newest = newest.unwrap();
        assert_eq!(newest.name, "b.tar.gz");
        assert_eq!(newest.size, 30);
    }

    #[tokio::test]
    async fn empty_or_missing_folder_is_reported_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let info = checker(dir.path(), 0).check().await;
        assert!(!info.was_backed_up);
        assert!(info.last_backup_file.is_none());

        let missing = checker(&dir.path().join("absent"), 0).check().await;
        assert!(!missing.was_backed_up);
        assert_eq!(missing.backup_directory, dir.path().join("absent"));
    }
}
