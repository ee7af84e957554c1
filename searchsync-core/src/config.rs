//! Sync job configuration.
//!
//! # File layout
//!
//! ```yaml
//! name: my-site
//! index_name: docs            # default destination
//! chunk_size: 1000
//! enable_partial_updates: false
//! enable_hash_cache: true
//! match_fields: [modified]
//! local_index_dir: ./indexes
//! sources:
//!   - records: out/pages.json
//!   - index_name: blog
//!     records: out/posts.json
//!     match_fields: [modified, slug]
//!     settings:
//!       searchableAttributes: [title]
//! ```
//!
//! Relative paths resolve against the directory holding the config file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, ConfigError};
use crate::records;
use crate::types::{IndexName, Source, SyncMode, DEFAULT_CHUNK_SIZE};

/// A source entry as written in the job file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<IndexName>,
    /// JSON array of records produced by the upstream fetch step.
    #[serde(default)]
    pub records: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
}

/// Root of a job file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<IndexName>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub enable_partial_updates: bool,
    #[serde(default)]
    pub enable_hash_cache: bool,
    #[serde(default = "default_match_fields")]
    pub match_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_index_dir: Option<PathBuf>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_match_fields() -> Vec<String> {
    vec!["modified".to_string()]
}

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

/// Load a job file.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<SyncConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Directory that relative paths inside `config_path` resolve against.
pub fn base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

// ---------------------------------------------------------------------------
// 2. Validate + resolve
// ---------------------------------------------------------------------------

impl SyncConfig {
    /// Check every structural rule. Performs no I/O.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mode()?;
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources {
                job: self.name.clone(),
            });
        }
        for (ordinal, source) in self.sources.iter().enumerate() {
            if source.records.as_os_str().is_empty() {
                return Err(ConfigError::MissingRecords { ordinal });
            }
            self.destination(ordinal, source)?;
            let fields = source.match_fields.as_ref().unwrap_or(&self.match_fields);
            if fields.is_empty() || fields.iter().any(|f| f.trim().is_empty()) {
                return Err(ConfigError::InvalidMatchFields { ordinal });
            }
        }
        Ok(())
    }

    pub fn mode(&self) -> Result<SyncMode, ConfigError> {
        SyncMode::new(
            self.enable_partial_updates,
            self.enable_hash_cache,
            self.chunk_size,
        )
    }

    /// Root of the local index service, if configured.
    pub fn local_index_dir(&self, base: &Path) -> Option<PathBuf> {
        self.local_index_dir.as_deref().map(|p| resolve(base, p))
    }

    /// Validate, then load every source's records, in declaration order.
    pub fn resolve_sources(&self, base: &Path) -> Result<Vec<Source>, ConfigError> {
        self.validate()?;
        let mut sources = Vec::with_capacity(self.sources.len());
        for (ordinal, source) in self.sources.iter().enumerate() {
            let index = self.destination(ordinal, source)?;
            let records = records::load_at(&resolve(base, &source.records))?;
            sources.push(Source {
                index,
                records,
                match_fields: source
                    .match_fields
                    .clone()
                    .unwrap_or_else(|| self.match_fields.clone()),
                settings: source.settings.clone(),
            });
        }
        Ok(sources)
    }

    fn destination(&self, ordinal: usize, source: &SourceConfig) -> Result<IndexName, ConfigError> {
        source
            .index_name
            .clone()
            .or_else(|| self.index_name.clone())
            .filter(|name| !name.0.is_empty())
            .ok_or(ConfigError::MissingIndex { ordinal })
    }
}

/// `<home>` via `dirs::home_dir()`.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn minimal() -> SyncConfig {
        serde_yaml::from_str("name: site\nindex_name: docs\nsources:\n  - records: a.json\n")
            .expect("yaml")
    }

    #[test]
    fn defaults_applied() {
        let cfg = minimal();
        assert_eq!(cfg.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(cfg.match_fields, vec!["modified".to_string()]);
        assert!(!cfg.enable_partial_updates);
        assert!(!cfg.enable_hash_cache);
        cfg.validate().expect("valid");
    }

    #[test]
    fn source_without_index_inherits_default() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.json"), r#"[{"objectID":"1"}]"#).unwrap();
        let sources = minimal().resolve_sources(tmp.path()).expect("resolve");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].index, IndexName::from("docs"));
        assert_eq!(sources[0].match_fields, vec!["modified".to_string()]);
        assert_eq!(sources[0].records.len(), 1);
    }

    #[test]
    fn missing_records_path_is_rejected() {
        let mut cfg = minimal();
        cfg.sources.push(SourceConfig::default());
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingRecords { ordinal: 1 })
        ));
    }

    #[test]
    fn base_dir_of_bare_file_is_cwd() {
        assert_eq!(base_dir(Path::new("job.yaml")), PathBuf::from("."));
        assert_eq!(base_dir(Path::new("/etc/job.yaml")), PathBuf::from("/etc"));
    }

    #[test]
    fn local_index_dir_resolves_relative_to_base() {
        let mut cfg = minimal();
        cfg.local_index_dir = Some(PathBuf::from("indexes"));
        assert_eq!(
            cfg.local_index_dir(Path::new("/jobs")),
            Some(PathBuf::from("/jobs/indexes"))
        );
    }
}
