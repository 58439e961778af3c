use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::domain::GeoSeriesAccession;
use crate::error::AssistantError;

#[derive(Debug, Clone)]
pub struct Store {
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, AssistantError> {
        let cache_root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir().join(".cache").join("microarray-assistant"),
                )
                .ok()
            })
            .ok_or_else(|| {
                AssistantError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { cache_root })
    }

    pub fn new_with_root(cache_root: Utf8PathBuf) -> Self {
        Self { cache_root }
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn series_dir(&self, acc: &GeoSeriesAccession) -> Utf8PathBuf {
        self.cache_root.join("geo").join(acc.as_str())
    }

    pub fn soft_path(&self, acc: &GeoSeriesAccession) -> Utf8PathBuf {
        self.series_dir(acc)
            .join(format!("{}_family.soft", acc.as_str()))
    }

    pub fn metadata_path(&self, acc: &GeoSeriesAccession) -> Utf8PathBuf {
        self.cache_root
            .join("metadata")
            .join("geo")
            .join(format!("{}.json", acc.as_str()))
    }

    pub fn read_soft(&self, acc: &GeoSeriesAccession) -> Result<Option<String>, AssistantError> {
        let path = self.soft_path(acc);
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        fs::read_to_string(path.as_std_path())
            .map(Some)
            .map_err(|err| AssistantError::Filesystem(format!("read {path}: {err}")))
    }

    pub fn write_soft(&self, acc: &GeoSeriesAccession, text: &str) -> Result<(), AssistantError> {
        let path = self.soft_path(acc);
        Self::write_bytes_atomic(&path, text.as_bytes())?;
        let metadata = Metadata {
            source: "geo".to_string(),
            accession: acc.as_str().to_string(),
            downloaded_at: chrono::Utc::now().to_rfc3339(),
            tool: format!("microarray-assistant/{}", env!("CARGO_PKG_VERSION")),
            resolved_path: path.to_string(),
            size_bytes: text.len() as u64,
        };
        Self::write_metadata(&self.metadata_path(acc), &metadata)
    }

    pub fn clear(&self) -> Result<(), AssistantError> {
        if self.cache_root.as_std_path().exists() {
            fs::remove_dir_all(self.cache_root.as_std_path())
                .map_err(|err| AssistantError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    pub fn write_metadata(path: &Utf8Path, metadata: &Metadata) -> Result<(), AssistantError> {
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| AssistantError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), AssistantError> {
        let parent = path
            .parent()
            .ok_or_else(|| AssistantError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| AssistantError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("microarray-assistant")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| AssistantError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| AssistantError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| AssistantError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn list_metadata(&self) -> Result<Vec<Metadata>, AssistantError> {
        let metadata_root = self.cache_root.join("metadata");
        if !metadata_root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for path in walk_dir(metadata_root.as_std_path())? {
            if path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false) {
                let content = fs::read_to_string(&path)
                    .map_err(|err| AssistantError::Filesystem(err.to_string()))?;
                let metadata: Metadata = serde_json::from_str(&content)
                    .map_err(|err| AssistantError::Filesystem(err.to_string()))?;
                entries.push(metadata);
            }
        }
        entries.sort_by(|a, b| a.accession.cmp(&b.accession));
        Ok(entries)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub source: String,
    pub accession: String,
    pub downloaded_at: String,
    pub tool: String,
    pub resolved_path: String,
    pub size_bytes: u64,
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, AssistantError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| AssistantError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| AssistantError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}
