use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::Stroke;
use crate::parser::SlideKey;

/// Directory, next to the deck, where per-deck state is kept.
const STATE_DIR: &str = ".deckhand";
const DRAWINGS_DIR: &str = "drawings";
const SNAPSHOT_VERSION: u32 = 1;

/// Persistent drawing layers of one deck, as stored between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingSnapshot {
    pub version: u32,
    pub layers: Vec<PersistedLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedLayer {
    pub key: SlideKey,
    pub strokes: Vec<Stroke>,
}

impl DrawingSnapshot {
    pub fn new(layers: Vec<PersistedLayer>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            layers,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn stroke_count(&self) -> usize {
        self.layers.iter().map(|l| l.strokes.len()).sum()
    }
}

/// Where drawings for `deck_path` are stored.
pub fn path_for(deck_path: &Path) -> PathBuf {
    let base = deck_path.parent().unwrap_or(Path::new("."));
    let stem = deck_path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    base.join(STATE_DIR)
        .join(DRAWINGS_DIR)
        .join(format!("{stem}.json"))
}

/// Load saved drawings. A missing file is an empty snapshot.
pub fn load(path: &Path) -> Result<DrawingSnapshot> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(DrawingSnapshot::new(Vec::new()));
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    let snapshot: DrawingSnapshot = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse drawings in {}", path.display()))?;
    if snapshot.version != SNAPSHOT_VERSION {
        anyhow::bail!(
            "Unsupported drawings version {} in {}",
            snapshot.version,
            path.display()
        );
    }
    Ok(snapshot)
}

/// Save drawings, replacing any previous file. An empty snapshot removes it.
pub fn save(path: &Path, snapshot: &DrawingSnapshot) -> Result<()> {
    if snapshot.is_empty() {
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawing::{Point, Stroke};

    fn sample() -> DrawingSnapshot {
        DrawingSnapshot::new(vec![PersistedLayer {
            key: SlideKey::Id {
                id: "agenda".into(),
            },
            strokes: vec![Stroke::arrow(Point::new(0.0, 0.0), Point::new(5.0, 5.0))],
        }])
    }

    #[test]
    fn test_path_for_deck() {
        let path = path_for(Path::new("talks/rust.md"));
        assert_eq!(path, Path::new("talks/.deckhand/drawings/rust.json"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = load(&dir.path().join("nope.json")).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_for(&dir.path().join("deck.md"));
        save(&path, &sample()).unwrap();
        assert!(path.exists());
        assert_eq!(load(&path).unwrap(), sample());
    }

    #[test]
    fn test_saving_empty_snapshot_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.json");
        save(&path, &sample()).unwrap();
        save(&path, &DrawingSnapshot::new(Vec::new())).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.json");
        std::fs::write(&path, r#"{"version": 99, "layers": []}"#).unwrap();
        assert!(load(&path).is_err());
    }
}
