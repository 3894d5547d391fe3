//! Sync-map persistence: pretty JSON files under the configured map
//! directory, one per `(plan_id, target)` pair.
//!
//! The engine treats these files as a cache; discovery is always the
//! authoritative idempotency source. Persisting is the CLI's job.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use planpilot_core::engine::SyncMap;

/// The file path for one `(plan_id, target)` pair.
pub fn map_path(dir: &Path, plan_id: &str, target: &str) -> PathBuf {
    dir.join(format!("{plan_id}.{target}.json"))
}

/// Persist a sync map, creating the directory as needed. Returns the
/// written path.
pub fn save_map(dir: &Path, map: &SyncMap) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create map directory {}", dir.display()))?;

    let path = map_path(dir, &map.plan_id, &map.target);
    let contents = serde_json::to_string_pretty(map).context("failed to serialize sync map")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write sync map at {}", path.display()))?;
    Ok(path)
}

/// Load a persisted sync map.
pub fn load_map(path: &Path) -> Result<SyncMap> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read sync map at {}", path.display()))?;
    let map: SyncMap = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse sync map at {}", path.display()))?;
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use planpilot_core::plan::ItemType;
    use planpilot_core::provider::Item;

    fn sample_map() -> SyncMap {
        let mut map = SyncMap::new("a1b2c3d4e5f6", "memory", "memory://board");
        map.insert(
            "E1",
            &Item {
                id: "id-1".to_owned(),
                key: "PP-1".to_owned(),
                url: "memory://board/PP-1".to_owned(),
                title: "Epic E1".to_owned(),
                body: String::new(),
                item_type: ItemType::Epic,
                labels: vec![],
            },
        );
        map
    }

    #[test]
    fn save_then_load_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().join("maps");

        let map = sample_map();
        let path = save_map(&dir, &map).unwrap();
        assert_eq!(path, map_path(&dir, "a1b2c3d4e5f6", "memory"));

        let loaded = load_map(&path).unwrap();
        assert_eq!(loaded, map);
    }

    #[test]
    fn load_missing_file_reports_the_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nope.json");
        let err = load_map(&path).unwrap_err();
        assert!(err.to_string().contains("nope.json"), "unexpected: {err}");
    }

    #[test]
    fn map_path_encodes_plan_and_target() {
        let path = map_path(Path::new(".planpilot"), "abc123", "memory");
        assert!(path.ends_with("abc123.memory.json"));
    }
}
