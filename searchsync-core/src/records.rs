//! Loading materialized record sets from disk.
//!
//! A records file is the JSON array produced by whatever fetch step runs
//! before searchsync. Identifier checks are left to the engine.

use std::path::Path;

use serde_json::Value;

use crate::error::{io_err, ConfigError};
use crate::types::Record;

/// Read a JSON array of objects from `path`, preserving order.
pub fn load_at(path: &Path) -> Result<Vec<Record>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let value: Value = serde_json::from_str(&contents).map_err(|e| ConfigError::Records {
        path: path.to_path_buf(),
        source: e,
    })?;
    let Value::Array(items) = value else {
        return Err(ConfigError::RecordNotObject {
            path: path.to_path_buf(),
            position: 0,
        });
    };
    items
        .into_iter()
        .enumerate()
        .map(|(position, item)| {
            Record::from_value(item).ok_or_else(|| ConfigError::RecordNotObject {
                path: path.to_path_buf(),
                position,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectId;
    use tempfile::TempDir;

    #[test]
    fn loads_array_in_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("r.json");
        std::fs::write(&path, r#"[{"objectID":"b"},{"objectID":"a"}]"#).unwrap();
        let records = load_at(&path).unwrap();
        let ids: Vec<_> = records.iter().filter_map(|r| r.object_id()).collect();
        assert_eq!(ids, vec![ObjectId::from("b"), ObjectId::from("a")]);
    }

    #[test]
    fn non_object_entry_reports_position() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("r.json");
        std::fs::write(&path, r#"[{"objectID":"a"}, 3]"#).unwrap();
        let err = load_at(&path).unwrap_err();
        assert!(matches!(err, ConfigError::RecordNotObject { position: 1, .. }));
    }

    #[test]
    fn top_level_object_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("r.json");
        std::fs::write(&path, r#"{"objectID":"a"}"#).unwrap();
        assert!(matches!(
            load_at(&path),
            Err(ConfigError::RecordNotObject { .. })
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            load_at(&tmp.path().join("nope.json")),
            Err(ConfigError::NotFound { .. })
        ));
    }
}
