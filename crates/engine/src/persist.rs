//! JSON files under the cache directory: settings, saves and navigation snapshots.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode JSON for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to parse {path}{}: {source}", at_path(json_path))]
    Decode {
        path: PathBuf,
        json_path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Read { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

fn at_path(json_path: &str) -> String {
    if json_path.is_empty() || json_path == "." {
        String::new()
    } else {
        format!(" at {json_path}")
    }
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| PersistError::Encode {
        path: path.to_path_buf(),
        source,
    })?;
    write_bytes_atomic(path, json.as_bytes()).map_err(|source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let raw = fs::read_to_string(path).map_err(|source| PersistError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_json(path, &raw)
}

/// Decodes `raw`, reporting the JSON path of the first mismatch.
pub fn parse_json<T: DeserializeOwned>(path: &Path, raw: &str) -> Result<T, PersistError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, T>(&mut deserializer).map_err(|error| {
        let json_path = error.path().to_string();
        PersistError::Decode {
            path: path.to_path_buf(),
            json_path,
            source: error.into_inner(),
        }
    })
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, bytes)?;
    if let Err(error) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("data.json");
    let tmp_name = format!("{file_name}.tmp");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use tempfile::TempDir;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Slot {
        name: String,
        credits: i64,
    }

    #[test]
    fn writes_then_reads_through_nested_dirs() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("saves").join("slot-1.json");
        let slot = Slot {
            name: "Vex".to_string(),
            credits: 1200,
        };
        write_json_atomic(&path, &slot).expect("write");
        assert!(!temp.path().join("saves").join("slot-1.json.tmp").exists());
        let loaded: Slot = read_json(&path).expect("read");
        assert_eq!(loaded, slot);
    }

    #[test]
    fn decode_errors_name_the_json_path() {
        let err = parse_json::<Slot>(Path::new("slot.json"), r#"{"name":"Vex","credits":"lots"}"#)
            .expect_err("mistyped");
        match &err {
            PersistError::Decode { json_path, .. } => assert_eq!(json_path, "credits"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("at credits"));
    }

    #[test]
    fn missing_file_is_reported_as_not_found() {
        let temp = TempDir::new().expect("temp");
        let err = read_json::<Slot>(&temp.path().join("absent.json")).expect_err("missing");
        assert!(err.is_not_found());
    }
}
