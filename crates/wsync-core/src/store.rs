//! In-memory workspace collection
//!
//! The `WorkspaceStore` is the client-held tree that both the editor and the
//! sync rounds mutate. It is shared as [`SharedStore`]; a sync round locks it
//! to take a snapshot, releases it for the network call, and locks it again
//! to apply the response.
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = WorkspaceStore::new();
//! let ws = store.create_workspace(owner_id, "Homework");
//! let file = store.create_file(ws, "Main.java", "class Main {}")?;
//! store.edit_file(file, "class Main { }");
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::{File, FileId, GuiState, UserId, Workspace, WorkspaceId};

/// Store handle shared between the editor side and the sync engine
pub type SharedStore = Arc<Mutex<WorkspaceStore>>;

/// Client-held tree of workspaces and files
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceStore {
    workspaces: Vec<Workspace>,
    current_workspace: Option<WorkspaceId>,
    #[serde(default)]
    gui_state: GuiState,
    /// Next placeholder id to hand out (always negative)
    next_placeholder: i64,
}

impl Default for WorkspaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            workspaces: Vec::new(),
            current_workspace: None,
            gui_state: GuiState::default(),
            next_placeholder: -1,
        }
    }

    /// Wrap the store for sharing with a sync client
    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    // ==================== Workspaces ====================

    /// All workspaces in presentation order
    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    /// Mutable access to all workspaces
    pub fn workspaces_mut(&mut self) -> &mut [Workspace] {
        &mut self.workspaces
    }

    pub fn workspace(&self, id: WorkspaceId) -> Option<&Workspace> {
        self.workspaces.iter().find(|w| w.id == id)
    }

    pub fn workspace_mut(&mut self, id: WorkspaceId) -> Option<&mut Workspace> {
        self.workspaces.iter_mut().find(|w| w.id == id)
    }

    /// Attach a workspace to the collection
    pub fn add_workspace(&mut self, workspace: Workspace) {
        self.workspaces.push(workspace);
    }

    /// Detach a workspace (and its files)
    pub fn remove_workspace(&mut self, id: WorkspaceId) -> Option<Workspace> {
        let pos = self.workspaces.iter().position(|w| w.id == id)?;
        if self.current_workspace == Some(id) {
            self.current_workspace = None;
        }
        Some(self.workspaces.remove(pos))
    }

    /// Create a local workspace with a placeholder id
    pub fn create_workspace(&mut self, owner_id: UserId, name: &str) -> WorkspaceId {
        let id = WorkspaceId(self.next_placeholder_id());
        let mut workspace = Workspace::new(id, owner_id, name);
        workspace.sorting_order = self.workspaces.len() as i32;
        self.workspaces.push(workspace);
        id
    }

    /// Swap a placeholder workspace id for the one the server assigned
    pub fn reassign_workspace_id(&mut self, old: WorkspaceId, new: WorkspaceId) -> bool {
        let Some(workspace) = self.workspace_mut(old) else {
            return false;
        };
        workspace.set_id(new);
        if self.current_workspace == Some(old) {
            self.current_workspace = Some(new);
        }
        true
    }

    /// Give a created workspace the id the server assigned
    ///
    /// `generation` is the placeholder's generation when the create request
    /// was built. If a sync round already brought the workspace in under
    /// `id`, the placeholder is folded into that entry: its files move over
    /// and a rename made since then carries across. Otherwise the
    /// placeholder takes the id and is marked saved if unchanged.
    pub fn settle_created_workspace(
        &mut self,
        placeholder: WorkspaceId,
        id: WorkspaceId,
        generation: u64,
    ) -> bool {
        if self.workspace(id).is_none() {
            if !self.reassign_workspace_id(placeholder, id) {
                return false;
            }
            if let Some(workspace) = self.workspace_mut(id) {
                workspace.mark_saved_if_unchanged(generation);
            }
            return true;
        }

        let was_current = self.current_workspace == Some(placeholder);
        let Some(mut local) = self.remove_workspace(placeholder) else {
            return false;
        };
        let files = local.take_files();
        if let Some(existing) = self.workspace_mut(id) {
            if local.generation() != generation && local.name != existing.name {
                existing.rename(local.name.clone());
            }
            for file in files {
                existing.add_file(file);
            }
        }
        if was_current {
            self.current_workspace = Some(id);
        }
        true
    }

    // ==================== Current workspace ====================

    /// Workspace currently open in the editor
    pub fn current_workspace(&self) -> Option<WorkspaceId> {
        self.current_workspace
    }

    pub fn set_current_workspace(&mut self, id: Option<WorkspaceId>) {
        self.current_workspace = id;
    }

    /// Current workspace id as reported to the server
    ///
    /// Exam-bound workspaces are never reported.
    pub fn routing_workspace_id(&self) -> Option<WorkspaceId> {
        let id = self.current_workspace?;
        match self.workspace(id) {
            Some(ws) if !ws.is_exam_bound() => Some(id),
            _ => None,
        }
    }

    // ==================== Files ====================

    /// Create a local file with a placeholder id
    ///
    /// Returns `None` if the workspace does not exist.
    pub fn create_file(
        &mut self,
        workspace_id: WorkspaceId,
        name: &str,
        text: &str,
    ) -> Option<FileId> {
        self.workspace(workspace_id)?;
        let id = FileId(self.next_placeholder_id());
        let workspace = self.workspace_mut(workspace_id)?;
        let mut file = File::new(id, workspace_id, name, text);
        file.sorting_order = workspace.files().len() as i32;
        workspace.add_file(file);
        Some(id)
    }

    /// Find a file anywhere in the tree
    pub fn file(&self, id: FileId) -> Option<&File> {
        self.workspaces.iter().find_map(|w| w.file(id))
    }

    /// Find a file anywhere in the tree, mutably
    pub fn file_mut(&mut self, id: FileId) -> Option<&mut File> {
        self.workspaces.iter_mut().find_map(|w| w.file_mut(id))
    }

    /// Apply a local edit to a file's content
    pub fn edit_file(&mut self, id: FileId, text: &str) -> bool {
        match self.file_mut(id) {
            Some(file) => {
                file.set_text(text);
                true
            }
            None => false,
        }
    }

    /// Detach a file from whichever workspace holds it
    pub fn remove_file(&mut self, id: FileId) -> Option<File> {
        self.workspaces.iter_mut().find_map(|w| w.remove_file(id))
    }

    /// Move a file into another workspace
    pub fn move_file(&mut self, id: FileId, destination: WorkspaceId) -> bool {
        if self.workspace(destination).is_none() {
            return false;
        }
        let Some(file) = self.remove_file(id) else {
            return false;
        };
        match self.workspace_mut(destination) {
            Some(ws) => {
                ws.add_file(file);
                true
            }
            None => false,
        }
    }

    /// Swap a placeholder file id for the one the server assigned
    pub fn reassign_file_id(&mut self, old: FileId, new: FileId) -> bool {
        match self.file_mut(old) {
            Some(file) => {
                file.id = new;
                true
            }
            None => false,
        }
    }

    /// Give a created file the id the server assigned
    ///
    /// Same contract as [`settle_created_workspace`](Self::settle_created_workspace):
    /// if the file already arrived under `id` through a sync round, the
    /// placeholder is dropped and edits made since `generation` are applied
    /// to the existing entry, leaving it unsaved.
    pub fn settle_created_file(
        &mut self,
        placeholder: FileId,
        id: FileId,
        generation: u64,
    ) -> bool {
        if self.file(id).is_none() {
            if !self.reassign_file_id(placeholder, id) {
                return false;
            }
            if let Some(file) = self.file_mut(id) {
                file.mark_saved_if_unchanged(generation);
            }
            return true;
        }

        let Some(local) = self.remove_file(placeholder) else {
            return false;
        };
        if local.generation() != generation {
            if let Some(existing) = self.file_mut(id) {
                if local.name != existing.name {
                    existing.rename(local.name.clone());
                }
                existing.set_text(local.text());
            }
        }
        true
    }

    /// Total number of files across all workspaces
    pub fn file_count(&self) -> usize {
        self.workspaces.iter().map(|w| w.files().len()).sum()
    }

    // ==================== GUI state ====================

    pub fn gui_state(&self) -> &GuiState {
        &self.gui_state
    }

    pub fn gui_state_mut(&mut self) -> &mut GuiState {
        &mut self.gui_state
    }

    // ==================== Ordering ====================

    /// Re-sort workspaces and their files by ordering index, then name
    pub fn sort(&mut self) {
        self.workspaces
            .sort_by(|a, b| (a.sorting_order, &a.name).cmp(&(b.sorting_order, &b.name)));
        for workspace in &mut self.workspaces {
            workspace.sort_files();
        }
    }

    /// Whether any workspace, file or the GUI state awaits sending
    pub fn has_unsaved_changes(&self) -> bool {
        self.gui_state.is_dirty()
            || self
                .workspaces
                .iter()
                .any(|w| !w.is_saved() || w.files().iter().any(|f| !f.is_saved()))
    }

    fn next_placeholder_id(&mut self) -> i64 {
        let id = self.next_placeholder;
        self.next_placeholder -= 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_workspace_uses_placeholders() {
        let mut store = WorkspaceStore::new();
        let a = store.create_workspace(1, "A");
        let b = store.create_workspace(1, "B");

        assert!(a.is_placeholder());
        assert!(b.is_placeholder());
        assert_ne!(a, b);
        assert_eq!(store.workspaces().len(), 2);
    }

    #[test]
    fn test_create_file_requires_workspace() {
        let mut store = WorkspaceStore::new();
        assert!(store.create_file(WorkspaceId(99), "x", "").is_none());

        let ws = store.create_workspace(1, "A");
        let file = store.create_file(ws, "Main.java", "class Main {}").unwrap();
        assert!(file.is_placeholder());
        assert_eq!(store.file(file).unwrap().text(), "class Main {}");
    }

    #[test]
    fn test_reassign_ids() {
        let mut store = WorkspaceStore::new();
        let ws = store.create_workspace(1, "A");
        let file = store.create_file(ws, "a.txt", "").unwrap();
        store.set_current_workspace(Some(ws));

        assert!(store.reassign_workspace_id(ws, WorkspaceId(12)));
        assert!(store.reassign_file_id(file, FileId(34)));

        assert_eq!(store.current_workspace(), Some(WorkspaceId(12)));
        let f = store.file(FileId(34)).unwrap();
        assert_eq!(f.workspace_id, WorkspaceId(12));
    }

    #[test]
    fn test_settle_created_file_takes_id() {
        let mut store = WorkspaceStore::new();
        store.add_workspace(Workspace::new(WorkspaceId(1), 1, "W"));
        let placeholder = store.create_file(WorkspaceId(1), "a.txt", "x").unwrap();
        let generation = store.file(placeholder).unwrap().generation();

        assert!(store.settle_created_file(placeholder, FileId(100), generation));
        let file = store.file(FileId(100)).unwrap();
        assert!(file.is_saved());
        assert!(store.file(placeholder).is_none());
    }

    #[test]
    fn test_settle_created_file_merges_into_delivered_copy() {
        let mut store = WorkspaceStore::new();
        store.add_workspace(Workspace::new(WorkspaceId(1), 1, "W"));
        let placeholder = store.create_file(WorkspaceId(1), "a.txt", "x").unwrap();
        let generation = store.file(placeholder).unwrap().generation();

        // A round delivered the server copy, then the user kept typing
        let mut delivered = File::new(FileId(100), WorkspaceId(1), "a.txt", "x");
        delivered.mark_saved();
        store.workspace_mut(WorkspaceId(1)).unwrap().add_file(delivered);
        store.edit_file(placeholder, "xy");

        assert!(store.settle_created_file(placeholder, FileId(100), generation));
        let ws = store.workspace(WorkspaceId(1)).unwrap();
        assert_eq!(ws.files().len(), 1);
        let file = store.file(FileId(100)).unwrap();
        assert_eq!(file.text(), "xy");
        assert!(!file.is_saved());
    }

    #[test]
    fn test_settle_created_workspace_merges_files() {
        let mut store = WorkspaceStore::new();
        let placeholder = store.create_workspace(1, "Project");
        let generation = store.workspace(placeholder).unwrap().generation();
        let local_file = store.create_file(placeholder, "notes.txt", "").unwrap();
        store.set_current_workspace(Some(placeholder));

        let mut delivered = Workspace::new(WorkspaceId(42), 1, "Project");
        delivered.mark_saved();
        store.add_workspace(delivered);

        assert!(store.settle_created_workspace(placeholder, WorkspaceId(42), generation));
        assert_eq!(store.workspaces().len(), 1);
        assert_eq!(store.current_workspace(), Some(WorkspaceId(42)));
        assert!(store.workspace(WorkspaceId(42)).unwrap().is_saved());
        assert_eq!(store.file(local_file).unwrap().workspace_id, WorkspaceId(42));
    }

    #[test]
    fn test_routing_skips_exam_workspace() {
        let mut store = WorkspaceStore::new();
        let mut exam = Workspace::new(WorkspaceId(3), 1, "Exam");
        exam.exam_id = Some(77);
        store.add_workspace(exam);
        store.add_workspace(Workspace::new(WorkspaceId(4), 1, "Normal"));

        store.set_current_workspace(Some(WorkspaceId(3)));
        assert_eq!(store.routing_workspace_id(), None);

        store.set_current_workspace(Some(WorkspaceId(4)));
        assert_eq!(store.routing_workspace_id(), Some(WorkspaceId(4)));
    }

    #[test]
    fn test_move_file() {
        let mut store = WorkspaceStore::new();
        store.add_workspace(Workspace::new(WorkspaceId(1), 1, "From"));
        store.add_workspace(Workspace::new(WorkspaceId(2), 1, "To"));
        store
            .workspace_mut(WorkspaceId(1))
            .unwrap()
            .add_file(File::new(FileId(5), WorkspaceId(1), "a", ""));

        assert!(store.move_file(FileId(5), WorkspaceId(2)));
        assert!(store.workspace(WorkspaceId(1)).unwrap().files().is_empty());
        assert_eq!(store.file(FileId(5)).unwrap().workspace_id, WorkspaceId(2));

        assert!(!store.move_file(FileId(5), WorkspaceId(9)));
        assert!(store.file(FileId(5)).is_some());
    }

    #[test]
    fn test_has_unsaved_changes() {
        let mut store = WorkspaceStore::new();
        let mut ws = Workspace::new(WorkspaceId(1), 1, "A");
        ws.mark_saved();
        store.add_workspace(ws);
        assert!(!store.has_unsaved_changes());

        store.gui_state_mut().set(serde_json::json!({"a": 1}));
        assert!(store.has_unsaved_changes());
    }

    #[test]
    fn test_remove_current_workspace_clears_selection() {
        let mut store = WorkspaceStore::new();
        let ws = store.create_workspace(1, "A");
        store.set_current_workspace(Some(ws));
        store.remove_workspace(ws);
        assert_eq!(store.current_workspace(), None);
    }
}
