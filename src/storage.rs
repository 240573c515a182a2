use crate::model::SyncData;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Whole-file TOML persistence of the sync state
pub struct Storage {
    file_path: PathBuf,
}

impl Storage {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn load(&self) -> Result<SyncData> {
        if !self.file_path.exists() {
            return Ok(SyncData::new());
        }

        let content = fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to read {}", self.file_path.display()))?;
        let data: SyncData = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.file_path.display()))?;
        Ok(data)
    }

    pub fn save(&self, data: &SyncData) -> Result<()> {
        let content = toml::to_string_pretty(data)?;
        if let Some(parent) = self.file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.file_path, content)
            .with_context(|| format!("Failed to write {}", self.file_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountToken, ItemStore};
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("sync.toml"));
        let data = storage.load().unwrap();
        assert!(data.all_items().is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("nested").join("sync.toml"));
        let mut data = SyncData::new();
        data.link_account(AccountToken::new("u1", "jira", "me@corp.com"));
        data.set_last_refreshed("u1", Utc::now()).unwrap();
        storage.save(&data).unwrap();

        let loaded = storage.load().unwrap();
        assert_eq!(loaded.tokens("u1").unwrap().len(), 1);
        assert!(loaded.last_refreshed("u1").unwrap().is_some());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync.toml");
        fs::write(&path, "items = 3").unwrap();
        let err = Storage::new(&path).load().unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
