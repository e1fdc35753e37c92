//! Snapshot persistence: the external projection of the story tree.
//!
//! The in-memory tree is the source of truth; the snapshot file is a
//! best-effort view recomputed after every mutation. Writes go to a side
//! file and land via `rename`, so a concurrent poller only ever sees a
//! complete document. Readers use the soft `read_state` path, which never
//! hard-fails on a missing or mid-write file.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::schema::story::{SceneSnapshot, StoryTree, TreeError};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where the generator currently is in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "currentId")]
    pub current_id: Option<u64>,
    #[serde(rename = "lastAddedId")]
    pub last_added_id: Option<u64>,
    /// Seconds since the Unix epoch, fixed by the caller so that equal
    /// input produces byte-identical snapshots.
    pub timestamp: u64,
}

impl Cursor {
    pub fn at(current_id: Option<u64>, last_added_id: Option<u64>, timestamp: u64) -> Self {
        Self {
            current_id,
            last_added_id,
            timestamp,
        }
    }

    /// Cursor stamped with the current wall clock.
    pub fn now(current_id: Option<u64>, last_added_id: Option<u64>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::at(current_id, last_added_id, timestamp)
    }
}

/// The persisted document: whole tree plus cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "storyTree")]
    pub story_tree: SceneSnapshot,
    pub metadata: Cursor,
}

impl Snapshot {
    /// Strict load for tooling; the serving path uses `read_state` instead.
    pub fn load(path: &Path) -> Result<Snapshot, SnapshotError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Writes snapshots atomically to one canonical location.
#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    path: PathBuf,
    side_path: PathBuf,
}

impl SnapshotPublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut side: OsString = path.as_os_str().to_owned();
        side.push(".tmp");
        Self {
            side_path: PathBuf::from(side),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize the whole tree from its root and replace the canonical
    /// file. The write goes to a side file first; `rename` makes the swap
    /// atomic for concurrent readers.
    pub fn publish(&self, tree: &StoryTree, cursor: Cursor) -> Result<(), SnapshotError> {
        let root = tree.root().ok_or(TreeError::NoRoot)?;
        let snapshot = Snapshot {
            story_tree: tree.snapshot_node(root)?,
            metadata: cursor,
        };
        let bytes = serde_json::to_vec(&snapshot)?;
        fs::write(&self.side_path, bytes)?;
        fs::rename(&self.side_path, &self.path)?;
        Ok(())
    }
}

/// Consumer-facing read: the snapshot document verbatim, or a soft-error
/// body when the file is absent or unreadable. Pollers treat both as a
/// normal response and simply try again later.
pub fn read_state(path: &Path) -> serde_json::Value {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => {
            return json!({
                "error": "Story state not found. The generator has not published yet."
            })
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => value,
        Err(_) => json!({
            "error": "Story state file is corrupted or being written."
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::story::ChoiceSpec;

    fn spec(text: &str) -> ChoiceSpec {
        ChoiceSpec {
            text: text.to_string(),
        }
    }

    fn small_tree() -> StoryTree {
        let mut tree = StoryTree::new();
        let root = tree
            .build_scene("start", None, &[spec("go"), spec("stay")])
            .unwrap();
        let go = tree.scene(root).unwrap().child_choices[0];
        tree.build_scene("end", Some(go), &[spec("done")]).unwrap();
        tree
    }

    #[test]
    fn publish_writes_expected_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("story_state.json");
        let publisher = SnapshotPublisher::new(&path);

        let tree = small_tree();
        publisher
            .publish(&tree, Cursor::at(Some(1), Some(3), 1_700_000_000))
            .unwrap();

        let snapshot = Snapshot::load(&path).unwrap();
        assert_eq!(snapshot.story_tree.text, "start");
        assert_eq!(snapshot.story_tree.child_choices.len(), 2);
        assert_eq!(snapshot.metadata.current_id, Some(1));
        assert_eq!(snapshot.metadata.last_added_id, Some(3));
        assert_eq!(snapshot.metadata.timestamp, 1_700_000_000);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"storyTree\""));
        assert!(raw.contains("\"currentId\":1"));
        assert!(raw.contains("\"lastAddedId\":3"));
    }

    #[test]
    fn publish_is_idempotent_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("story_state.json");
        let publisher = SnapshotPublisher::new(&path);
        let tree = small_tree();
        let cursor = Cursor::at(Some(0), None, 42);

        publisher.publish(&tree, cursor).unwrap();
        let first = fs::read(&path).unwrap();
        publisher.publish(&tree, cursor).unwrap();
        let second = fs::read(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn no_side_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("story_state.json");
        let publisher = SnapshotPublisher::new(&path);

        publisher
            .publish(&small_tree(), Cursor::at(None, None, 0))
            .unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("story_state.json.tmp").exists());
    }

    #[test]
    fn publish_on_empty_tree_fails() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = SnapshotPublisher::new(dir.path().join("s.json"));
        let tree = StoryTree::new();
        assert!(matches!(
            publisher.publish(&tree, Cursor::at(None, None, 0)),
            Err(SnapshotError::Tree(TreeError::NoRoot))
        ));
    }

    #[test]
    fn read_state_soft_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let body = read_state(&missing);
        assert!(body["error"].as_str().unwrap().contains("not found"));

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "{ half a docum").unwrap();
        let body = read_state(&corrupt);
        assert!(body["error"].as_str().unwrap().contains("corrupted"));
    }

    #[test]
    fn read_state_returns_snapshot_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("story_state.json");
        let publisher = SnapshotPublisher::new(&path);
        publisher
            .publish(&small_tree(), Cursor::at(Some(0), None, 7))
            .unwrap();

        let body = read_state(&path);
        assert_eq!(body["metadata"]["timestamp"], 7);
        assert_eq!(body["storyTree"]["text"], "start");
    }
}
