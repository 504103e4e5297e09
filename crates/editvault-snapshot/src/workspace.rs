//! Live editor content.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::types::{Snapshot, SnapshotDraft};

/// Handle shared between the editor side and the [`crate::SnapshotManager`].
pub type SharedWorkspace = Arc<RwLock<Workspace>>;

/// The files currently open in the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    /// Path of the primary file, if one is designated.
    pub main_path: Option<String>,
    pub files: BTreeMap<String, String>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_main(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        self.files.insert(path.clone(), content.into());
        self.main_path = Some(path);
        self
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.set_file(path, content);
        self
    }

    pub fn set_file(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// Content of the primary file, or empty when none is designated.
    pub fn main_code(&self) -> String {
        self.main_path
            .as_ref()
            .and_then(|path| self.files.get(path))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn to_draft(&self, label: impl Into<String>) -> SnapshotDraft {
        SnapshotDraft::new(label, self.main_code()).with_files(self.files.clone())
    }

    /// Replace the content with that of `snapshot`.
    ///
    /// The main path is kept when the snapshot still carries it; otherwise
    /// the first file whose content equals the snapshot's code is chosen.
    pub fn load_snapshot(&mut self, snapshot: &Snapshot) {
        self.files = snapshot.files.clone();

        let keeps_main = self
            .main_path
            .as_ref()
            .is_some_and(|path| self.files.contains_key(path));
        if !keeps_main {
            self.main_path = self
                .files
                .iter()
                .find(|(_, content)| **content == snapshot.code)
                .map(|(path, _)| path.clone());
        }
    }

    /// Read every UTF-8 file under `root`, skipping hidden entries.
    ///
    /// Paths are stored relative to `root` with `/` separators.
    pub fn from_dir(root: &Path, main: Option<&str>) -> io::Result<Self> {
        let mut files = BTreeMap::new();

        let walker = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let Ok(content) = fs::read_to_string(entry.path()) else {
                log::debug!("Skipping non-UTF-8 file {}", entry.path().display());
                continue;
            };

            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(key, content);
        }

        let main_path = main
            .map(str::to_string)
            .filter(|path| files.contains_key(path));

        Ok(Self { main_path, files })
    }

    /// Write every file under `root`, creating parent directories.
    ///
    /// Nothing is written when any path would land outside `root`.
    pub fn write_to_dir(&self, root: &Path) -> io::Result<usize> {
        if let Some(path) = self.files.keys().find(|path| !is_contained(path)) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to write '{}' outside {}", path, root.display()),
            ));
        }

        for (path, content) in &self.files {
            let target = root.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, content)?;
        }
        Ok(self.files.len())
    }

    /// Make `root` hold exactly this workspace.
    ///
    /// `previous` is what was last read from `root`; its files that this
    /// workspace does not carry are removed. Files never captured (hidden
    /// or non-UTF-8) are left alone.
    pub fn replace_in_dir(&self, root: &Path, previous: &Workspace) -> io::Result<DirSync> {
        let written = self.write_to_dir(root)?;

        let mut removed = 0;
        for path in previous.files.keys() {
            if self.files.contains_key(path) || !is_contained(path) {
                continue;
            }
            match fs::remove_file(root.join(path)) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        Ok(DirSync { written, removed })
    }

    pub fn shared(self) -> SharedWorkspace {
        Arc::new(RwLock::new(self))
    }
}

/// Outcome of [`Workspace::replace_in_dir`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirSync {
    pub written: usize,
    pub removed: usize,
}

/// True when `path` is relative and never climbs above its root.
pub(crate) fn is_contained(path: &str) -> bool {
    !path.trim().is_empty()
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}
