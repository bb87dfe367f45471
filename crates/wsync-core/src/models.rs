//! Data models for wsync
//!
//! Defines the client-held tree: workspaces, their files, and the GUI state
//! document. Every entity carries a `saved` flag and an edit generation so
//! that a sync round can tell whether the state it sent is still current
//! when the server acknowledges it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sync::message::{FileData, WorkspaceData};

/// Server-side user identifier
pub type UserId = i64;

/// Workspace identifier
///
/// Negative values are local placeholders handed out before the server has
/// assigned a real id (or forever, in an ephemeral session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(pub i64);

/// File identifier, same placeholder convention as [`WorkspaceId`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub i64);

impl WorkspaceId {
    /// True for locally allocated ids the server does not know about
    pub fn is_placeholder(self) -> bool {
        self.0 < 0
    }
}

impl FileId {
    /// True for locally allocated ids the server does not know about
    pub fn is_placeholder(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single file inside a workspace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct File {
    /// Identifier (placeholder until created on the server)
    pub id: FileId,
    /// Owning workspace
    pub workspace_id: WorkspaceId,
    /// File name
    pub name: String,
    /// Position in the file list
    pub sorting_order: i32,
    text: String,
    remote_version: i64,
    saved: bool,
    generation: u64,
}

impl File {
    /// Create a new, unsaved file
    pub fn new(
        id: FileId,
        workspace_id: WorkspaceId,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            workspace_id,
            name: name.into(),
            sorting_order: 0,
            text: text.into(),
            remote_version: 0,
            saved: false,
            generation: 0,
        }
    }

    /// Instantiate a file received from the server (already saved)
    pub fn from_remote(data: &FileData) -> Self {
        Self {
            id: data.id,
            workspace_id: data.workspace_id,
            name: data.name.clone(),
            sorting_order: data.sorting_order,
            text: data.text.clone(),
            remote_version: data.version,
            saved: true,
            generation: 0,
        }
    }

    /// Current content
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the content as a local edit
    ///
    /// Marks the file unsaved and bumps its generation. Setting identical
    /// text is a no-op.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text == self.text {
            return;
        }
        self.text = text;
        self.touch();
    }

    /// Rename the file (a local edit)
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    /// Mark the file as locally modified without changing content
    pub fn touch(&mut self) {
        self.saved = false;
        self.generation += 1;
    }

    /// Whether the content matches what was last sent or received
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// Edit generation, bumped on every content change
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last version number the server reported for this file
    pub fn remote_version(&self) -> i64 {
        self.remote_version
    }

    /// Mark saved unconditionally
    pub fn mark_saved(&mut self) {
        self.saved = true;
    }

    /// Mark saved only if no edit happened since `generation` was observed
    ///
    /// Returns whether the flag was cleared.
    pub fn mark_saved_if_unchanged(&mut self, generation: u64) -> bool {
        if self.generation == generation {
            self.saved = true;
            true
        } else {
            false
        }
    }

    /// Overwrite content with the server's copy
    pub fn replace_from_remote(&mut self, text: &str) {
        self.text = text.to_string();
        self.generation += 1;
        self.saved = true;
    }

    /// Record a server version; versions never move backwards
    ///
    /// Returns whether the stored version changed.
    pub fn update_remote_version(&mut self, version: i64) -> bool {
        if version > self.remote_version {
            self.remote_version = version;
            true
        } else {
            false
        }
    }

    /// Wire representation
    pub fn to_file_data(&self) -> FileData {
        FileData {
            id: self.id,
            workspace_id: self.workspace_id,
            name: self.name.clone(),
            text: self.text.clone(),
            version: self.remote_version,
            sorting_order: self.sorting_order,
        }
    }
}

/// A workspace with its files
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workspace {
    /// Identifier (placeholder until created on the server)
    pub id: WorkspaceId,
    /// User owning the workspace
    pub owner_id: UserId,
    /// Display name
    pub name: String,
    /// Position in the workspace list
    pub sorting_order: i32,
    /// Exam session this workspace belongs to, if any
    pub exam_id: Option<i64>,
    /// Linked repository, if any
    pub repository_id: Option<i64>,
    saved: bool,
    generation: u64,
    files: Vec<File>,
}

impl Workspace {
    /// Create a new, unsaved workspace
    pub fn new(id: WorkspaceId, owner_id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            owner_id,
            name: name.into(),
            sorting_order: 0,
            exam_id: None,
            repository_id: None,
            saved: false,
            generation: 0,
            files: Vec::new(),
        }
    }

    /// Instantiate a workspace (and its files) received from the server
    pub fn from_remote(data: &WorkspaceData) -> Self {
        Self {
            id: data.id,
            owner_id: data.owner_id,
            name: data.name.clone(),
            sorting_order: data.sorting_order,
            exam_id: data.exam_id,
            repository_id: data.repository_id,
            saved: true,
            generation: 0,
            files: data.files.iter().map(File::from_remote).collect(),
        }
    }

    /// Whether the workspace belongs to an exam session
    pub fn is_exam_bound(&self) -> bool {
        self.exam_id.is_some()
    }

    /// Rename the workspace (marks its metadata dirty)
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    /// Mark the workspace metadata as locally modified
    pub fn touch(&mut self) {
        self.saved = false;
        self.generation += 1;
    }

    /// Whether the workspace metadata has been acknowledged by the server
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// Edit generation of the workspace metadata
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Mark saved unconditionally
    pub fn mark_saved(&mut self) {
        self.saved = true;
    }

    /// Mark saved only if the metadata was not edited since `generation`
    pub fn mark_saved_if_unchanged(&mut self, generation: u64) -> bool {
        if self.generation == generation {
            self.saved = true;
            true
        } else {
            false
        }
    }

    /// Files in presentation order
    pub fn files(&self) -> &[File] {
        &self.files
    }

    /// Mutable access to the files
    pub fn files_mut(&mut self) -> &mut [File] {
        &mut self.files
    }

    /// Look up a file by id
    pub fn file(&self, id: FileId) -> Option<&File> {
        self.files.iter().find(|f| f.id == id)
    }

    /// Look up a file by id, mutably
    pub fn file_mut(&mut self, id: FileId) -> Option<&mut File> {
        self.files.iter_mut().find(|f| f.id == id)
    }

    /// Attach a file, re-homing it to this workspace
    pub fn add_file(&mut self, mut file: File) {
        file.workspace_id = self.id;
        self.files.push(file);
    }

    /// Detach a file
    pub fn remove_file(&mut self, id: FileId) -> Option<File> {
        let pos = self.files.iter().position(|f| f.id == id)?;
        Some(self.files.remove(pos))
    }

    /// Detach all files
    pub(crate) fn take_files(&mut self) -> Vec<File> {
        std::mem::take(&mut self.files)
    }

    /// Sort files by their ordering index, then by name
    pub fn sort_files(&mut self) {
        self.files
            .sort_by(|a, b| (a.sorting_order, &a.name).cmp(&(b.sorting_order, &b.name)));
    }

    pub(crate) fn set_id(&mut self, id: WorkspaceId) {
        self.id = id;
        for file in &mut self.files {
            file.workspace_id = id;
        }
    }

    /// Wire representation, optionally including files
    pub fn to_workspace_data(&self, with_files: bool) -> WorkspaceData {
        WorkspaceData {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name.clone(),
            sorting_order: self.sorting_order,
            exam_id: self.exam_id,
            repository_id: self.repository_id,
            files: if with_files {
                self.files.iter().map(File::to_file_data).collect()
            } else {
                Vec::new()
            },
        }
    }
}

/// Arbitrary user preference document kept alongside the workspaces
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GuiState {
    value: serde_json::Value,
    dirty: bool,
    generation: u64,
}

impl GuiState {
    /// Wrap a document received at login (clean)
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            dirty: false,
            generation: 0,
        }
    }

    /// Current document
    pub fn value(&self) -> &serde_json::Value {
        &self.value
    }

    /// Replace the document and mark it dirty
    pub fn set(&mut self, value: serde_json::Value) {
        self.value = value;
        self.mark_dirty();
    }

    /// Mark dirty without changing the document
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.generation += 1;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Clear the dirty flag if nothing changed since `generation`
    pub fn mark_clean_if_unchanged(&mut self, generation: u64) -> bool {
        if self.generation == generation {
            self.dirty = false;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(text: &str) -> File {
        File::new(FileId(10), WorkspaceId(1), "Main.java", text)
    }

    #[test]
    fn test_placeholder_ids() {
        assert!(WorkspaceId(-1).is_placeholder());
        assert!(!WorkspaceId(1).is_placeholder());
        assert!(FileId(-7).is_placeholder());
        assert!(!FileId(0).is_placeholder());
    }

    #[test]
    fn test_set_text_marks_dirty() {
        let mut f = file("a");
        f.mark_saved();
        assert!(f.is_saved());

        f.set_text("b");
        assert!(!f.is_saved());
        assert_eq!(f.generation(), 1);
    }

    #[test]
    fn test_set_identical_text_is_noop() {
        let mut f = file("a");
        f.mark_saved();
        f.set_text("a");
        assert!(f.is_saved());
        assert_eq!(f.generation(), 0);
    }

    #[test]
    fn test_mark_saved_if_unchanged() {
        let mut f = file("a");
        let seen = f.generation();
        f.set_text("b");

        assert!(!f.mark_saved_if_unchanged(seen));
        assert!(!f.is_saved());

        assert!(f.mark_saved_if_unchanged(f.generation()));
        assert!(f.is_saved());
    }

    #[test]
    fn test_remote_version_never_decreases() {
        let mut f = file("a");
        assert!(f.update_remote_version(7));
        assert!(!f.update_remote_version(3));
        assert_eq!(f.remote_version(), 7);
        assert!(!f.update_remote_version(7));
    }

    #[test]
    fn test_workspace_add_file_rehomes() {
        let mut ws = Workspace::new(WorkspaceId(2), 5, "Homework");
        ws.add_file(file("x"));
        assert_eq!(ws.files()[0].workspace_id, WorkspaceId(2));
    }

    #[test]
    fn test_workspace_set_id_updates_files() {
        let mut ws = Workspace::new(WorkspaceId(-1), 5, "Draft");
        ws.add_file(File::new(FileId(-2), WorkspaceId(-1), "a.txt", ""));
        ws.set_id(WorkspaceId(40));
        assert_eq!(ws.files()[0].workspace_id, WorkspaceId(40));
    }

    #[test]
    fn test_workspace_data_without_files() {
        let mut ws = Workspace::new(WorkspaceId(2), 5, "Homework");
        ws.add_file(file("x"));
        assert!(ws.to_workspace_data(false).files.is_empty());
        assert_eq!(ws.to_workspace_data(true).files.len(), 1);
    }

    #[test]
    fn test_sort_files() {
        let mut ws = Workspace::new(WorkspaceId(2), 5, "Homework");
        let mut b = File::new(FileId(1), ws.id, "b", "");
        b.sorting_order = 1;
        let mut a = File::new(FileId(2), ws.id, "a", "");
        a.sorting_order = 0;
        ws.add_file(b);
        ws.add_file(a);
        ws.sort_files();
        assert_eq!(ws.files()[0].name, "a");
    }

    #[test]
    fn test_gui_state_generation() {
        let mut gui = GuiState::new(serde_json::json!({"theme": "dark"}));
        assert!(!gui.is_dirty());

        gui.set(serde_json::json!({"theme": "light"}));
        let seen = gui.generation();
        gui.mark_dirty();
        assert!(!gui.mark_clean_if_unchanged(seen));
        assert!(gui.is_dirty());
        assert!(gui.mark_clean_if_unchanged(gui.generation()));
        assert!(!gui.is_dirty());
    }
}
