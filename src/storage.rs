// =============================================================================
// Storage — durable JSON files under the data directory
// =============================================================================
//
// Every JSON file in the data directory is written with the same atomic
// pattern: serialize, write to a `.tmp` sibling, then rename over the target.
// Readers therefore always observe either the previous or the new content,
// never a torn write.
//
// File layout (all under DATA_DIR):
//   active_bots.json          — bot registry
//   bot_<id>_position.json    — per-bot open position (absent when flat)
//   news_cache.json           — shared news cache snapshot
//   api_counters.json         — daily external-API call counters
//   bot_<id>.log              — per-bot append-only text log
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize {}", path.display()))?;

    let tmp_path = tmp_sibling(path);
    std::fs::write(&tmp_path, &content)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to rename {} into place", tmp_path.display()))?;

    debug!(path = %path.display(), bytes = content.len(), "json written (atomic)");
    Ok(())
}

/// Read and deserialize a JSON file. Returns `Ok(None)` when the file does
/// not exist; any other I/O or parse failure is an error.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    let value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Delete a file, treating "already absent" as success.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "file".into());
    name.push(".tmp");
    path.with_file_name(name)
}

// =============================================================================
// Data-dir path helpers
// =============================================================================

/// Path of the bot registry file.
pub fn registry_path(data_dir: &Path) -> PathBuf {
    data_dir.join("active_bots.json")
}

/// Path of a bot's position file.
pub fn position_path(data_dir: &Path, bot_id: u64) -> PathBuf {
    data_dir.join(format!("bot_{bot_id}_position.json"))
}

/// Path of the shared news cache snapshot.
pub fn news_cache_path(data_dir: &Path) -> PathBuf {
    data_dir.join("news_cache.json")
}

/// Path of the daily API counter file.
pub fn counters_path(data_dir: &Path) -> PathBuf {
    data_dir.join("api_counters.json")
}

/// Path of a bot's append-only log file.
pub fn bot_log_path(data_dir: &Path, bot_id: u64) -> PathBuf {
    data_dir.join(format!("bot_{bot_id}.log"))
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        qty: f64,
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("flotilla-storage-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn write_then_read_roundtrip() {
        let dir = temp_dir();
        let path = dir.join("sample.json");
        let value = Sample {
            name: "ETHUSDT".into(),
            qty: 0.05123,
        };

        write_json_atomic(&path, &value).unwrap();
        let loaded: Sample = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded, value);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn read_missing_file_is_none() {
        let dir = temp_dir();
        let path = dir.join("absent.json");
        let loaded: Option<Sample> = read_json(&path).unwrap();
        assert!(loaded.is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn read_corrupt_file_is_error() {
        let dir = temp_dir();
        let path = dir.join("corrupt.json");
        std::fs::write(&path, "{ not json").unwrap();
        let result: Result<Option<Sample>> = read_json(&path);
        assert!(result.is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn atomic_write_leaves_no_tmp_file() {
        let dir = temp_dir();
        let path = dir.join("clean.json");
        write_json_atomic(&path, &Sample { name: "x".into(), qty: 1.0 }).unwrap();
        assert!(path.exists());
        assert!(!tmp_sibling(&path).exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn remove_if_exists_is_idempotent() {
        let dir = temp_dir();
        let path = dir.join("gone.json");
        std::fs::write(&path, "{}").unwrap();
        remove_if_exists(&path).unwrap();
        remove_if_exists(&path).unwrap();
        assert!(!path.exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn position_floats_roundtrip_bit_equal() {
        // serde_json prints f64 shortest-roundtrip; reload must be bit-equal.
        let dir = temp_dir();
        let path = dir.join("float.json");
        let value = Sample {
            name: "BNBUSDT".into(),
            qty: 0.1 + 0.2,
        };
        write_json_atomic(&path, &value).unwrap();
        let loaded: Sample = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded.qty.to_bits(), value.qty.to_bits());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn path_helpers_shape() {
        let dir = PathBuf::from("/var/lib/flotilla");
        assert_eq!(
            registry_path(&dir),
            PathBuf::from("/var/lib/flotilla/active_bots.json")
        );
        assert_eq!(
            position_path(&dir, 7),
            PathBuf::from("/var/lib/flotilla/bot_7_position.json")
        );
        assert_eq!(
            bot_log_path(&dir, 7),
            PathBuf::from("/var/lib/flotilla/bot_7.log")
        );
    }
}
