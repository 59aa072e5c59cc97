//! Rule configuration persistence using JSON file storage

use crate::model::RuleConfig;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A rule configuration as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRule {
    pub entry_id: String,
    pub config: RuleConfig,
}

/// Load rule configurations from a JSON file.
///
/// A file that does not parse is renamed to `<name>.corrupt` so the next
/// save cannot overwrite the stored rules, and loading starts empty.
pub async fn load_rules(path: &Path) -> Vec<StoredRule> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No rules file found at {:?}, starting fresh", path);
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!("Failed to read rules file {:?}: {}", path, e);
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<StoredRule>>(&contents) {
        Ok(rules) => {
            tracing::info!("Loaded {} rules from {:?}", rules.len(), path);
            rules
        }
        Err(e) => {
            let aside = corrupt_path(path);
            tracing::warn!(
                "Failed to parse rules file {:?}: {}; moving it to {:?}",
                path,
                e,
                aside
            );
            if let Err(e) = fs::rename(path, &aside).await {
                tracing::error!("Failed to move corrupt rules file {:?}: {}", path, e);
            }
            Vec::new()
        }
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".corrupt");
    path.with_file_name(name)
}

/// Save rule configurations to a JSON file atomically
#[allow(clippy::missing_errors_doc)]
pub async fn save_rules(path: &Path, rules: &[StoredRule]) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(rules)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    // Write to a temp file, then rename over the target
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &json).await?;
    fs::rename(&tmp_path, path).await?;

    tracing::debug!("Saved {} rules to {:?}", rules.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::hallway_config;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_rules(&dir.path().join("rules.json")).await.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rules.json");
        let rules = vec![StoredRule {
            entry_id: "entry-1".to_string(),
            config: hallway_config(),
        }];

        save_rules(&path, &rules).await.unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(load_rules(&path).await, rules);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(load_rules(&path).await.is_empty());
        assert!(!path.exists());
        let aside = dir.path().join("rules.json.corrupt");
        assert_eq!(std::fs::read_to_string(&aside).unwrap(), "{ not json");

        // A later save starts a fresh file and leaves the corrupt copy alone
        save_rules(&path, &[]).await.unwrap();
        assert!(load_rules(&path).await.is_empty());
        assert!(aside.exists());
    }
}
