use crate::application::ports::BackupTarget;
use crate::domain::entities::BackupDescriptor;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// ローカルディレクトリに `.boltbackup` ファイルとして保存する
pub struct DirectoryBackupTarget {
    directory: PathBuf,
}

impl DirectoryBackupTarget {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// 端末のアプリデータ領域配下を使う
    pub fn default_directory() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("bolt_offline")
            .join("backups")
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn validate_name(name: &str) -> Result<(), AppError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(AppError::InvalidInput(format!(
                "Invalid backup name: {name}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BackupTarget for DirectoryBackupTarget {
    async fn store(&self, name: &str, data: Vec<u8>) -> Result<u64, AppError> {
        Self::validate_name(name)?;
        fs::create_dir_all(&self.directory).await?;

        let path = self.directory.join(name);
        let tmp_path = self.directory.join(format!(".{name}.tmp"));
        let size = data.len() as u64;
        fs::write(&tmp_path, data).await?;
        fs::rename(&tmp_path, &path).await?;

        tracing::debug!(
            target: "offline::backup",
            path = %path.display(),
            bytes = size,
            "Backup file written"
        );
        Ok(size)
    }

    async fn list(&self) -> Result<Vec<BackupDescriptor>, AppError> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(created_at) = BackupDescriptor::parse_created_at(&name) else {
                continue;
            };
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            backups.push(BackupDescriptor {
                name,
                created_at,
                size_bytes: metadata.len(),
            });
        }

        backups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(backups)
    }

    async fn delete(&self, name: &str) -> Result<(), AppError> {
        Self::validate_name(name)?;
        match fs::remove_file(self.directory.join(name)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn stores_lists_and_deletes_backups() {
        let dir = tempdir().unwrap();
        let target = DirectoryBackupTarget::new(dir.path().join("backups"));

        assert!(target.list().await.unwrap().is_empty());

        target
            .store("bolt-backup-200.boltbackup", vec![1, 2, 3])
            .await
            .unwrap();
        target
            .store("bolt-backup-100.boltbackup", vec![4])
            .await
            .unwrap();
        std::fs::write(dir.path().join("backups").join("notes.txt"), b"x").unwrap();

        let listed = target.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].created_at, 100);
        assert_eq!(listed[1].size_bytes, 3);

        target.delete("bolt-backup-100.boltbackup").await.unwrap();
        target.delete("bolt-backup-100.boltbackup").await.unwrap();
        assert_eq!(target.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let target = DirectoryBackupTarget::new(dir.path());
        let result = target.store("../escape.boltbackup", vec![0]).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
