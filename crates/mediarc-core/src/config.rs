use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, Result};
use crate::index::IndexCodec;
use crate::layout::LayoutStrategy;

/// Default copy buffer: 10 MiB
pub const DEFAULT_BUFFER_SIZE: usize = 10 * 1024 * 1024;

fn default_media_types() -> BTreeMap<String, String> {
    [("footage", "MVDC"), ("ctraps", "TRDC"), ("audio", "MSDC")]
        .into_iter()
        .map(|(t, p)| (t.to_string(), p.to_string()))
        .collect()
}

fn default_suffix_length() -> usize {
    5
}

fn default_datetime_format() -> String {
    "%Y%m%d%H%M%S".to_string()
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

/// Archive settings, usually read from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveConfig {
    /// Registered media types and their index prefixes
    #[serde(default = "default_media_types")]
    pub media_types: BTreeMap<String, String>,
    /// Number of digits in the size-derived index suffix
    #[serde(default = "default_suffix_length")]
    pub suffix_length: usize,
    /// strftime format of the index date field
    #[serde(default = "default_datetime_format")]
    pub datetime_format: String,
    #[serde(default)]
    pub archive_root: Option<PathBuf>,
    #[serde(default)]
    pub quarantine_root: Option<PathBuf>,
    /// Layout used when importing from quarantine into the archive
    #[serde(default)]
    pub layout: LayoutStrategy,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            media_types: default_media_types(),
            suffix_length: default_suffix_length(),
            datetime_format: default_datetime_format(),
            archive_root: None,
            quarantine_root: None,
            layout: LayoutStrategy::default(),
            buffer_size: default_buffer_size(),
        }
    }
}

impl ArchiveConfig {
    /// Load config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| MediaError::io(path, e))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| MediaError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save config as pretty JSON, writing to a temp file first.
    pub fn save(&self, path: &Path) -> Result<()> {
        let temp_path = path.with_extension("json.tmp");
        let file = File::create(&temp_path).map_err(|e| MediaError::io(&temp_path, e))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| MediaError::Config(format!("{}: {}", path.display(), e)))?;
        fs::rename(&temp_path, path).map_err(|e| MediaError::io(path, e))?;
        Ok(())
    }

    /// Build the shared codec (and media type registry) for this config.
    pub fn codec(&self) -> Result<Arc<IndexCodec>> {
        IndexCodec::new(self).map(Arc::new)
    }

    pub fn archive_root(&self) -> Result<&Path> {
        self.archive_root
            .as_deref()
            .ok_or(MediaError::Config("archive_root is not set".to_string()))
    }

    pub fn quarantine_root(&self) -> Result<&Path> {
        self.quarantine_root
            .as_deref()
            .ok_or(MediaError::Config("quarantine_root is not set".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_registered_types() {
        let config = ArchiveConfig::default();
        assert_eq!(config.media_types.get("footage").map(String::as_str), Some("MVDC"));
        assert_eq!(config.media_types.get("ctraps").map(String::as_str), Some("TRDC"));
        assert_eq!(config.media_types.get("audio").map(String::as_str), Some("MSDC"));
        assert_eq!(config.suffix_length, 5);
        assert!(config.codec().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ArchiveConfig =
            serde_json::from_str(r#"{"suffix_length": 3, "layout": "year-month"}"#).unwrap();
        assert_eq!(config.suffix_length, 3);
        assert_eq!(config.layout, LayoutStrategy::YearMonth);
        assert_eq!(config.datetime_format, "%Y%m%d%H%M%S");
        assert_eq!(config.media_types.len(), 3);
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mediarc.json");

        let mut config = ArchiveConfig::default();
        config.archive_root = Some(dir.path().join("archive"));
        config.media_types.insert("photos".to_string(), "PHDC".to_string());
        config.save(&path).unwrap();

        let loaded = ArchiveConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_missing_roots_are_config_errors() {
        let config = ArchiveConfig::default();
        assert!(matches!(config.archive_root(), Err(MediaError::Config(_))));
        assert!(matches!(config.quarantine_root(), Err(MediaError::Config(_))));
    }
}
