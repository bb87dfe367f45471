//! Dirty tracking and request building
//!
//! A round takes one snapshot of everything that is unsaved, together with
//! the edit generation of each item at that moment. When the server
//! acknowledges the batch, only items whose generation is still the same are
//! marked saved; anything edited while the request was in flight stays dirty
//! for the next round.

use std::collections::HashSet;

use crate::models::{FileId, WorkspaceId};
use crate::session::UserSession;
use crate::store::WorkspaceStore;

use super::message::SendUpdatesRequest;

/// Items queued in one batch, with the generation each was queued at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSnapshot {
    pub workspaces: Vec<(WorkspaceId, u64)>,
    pub files: Vec<(FileId, u64)>,
}

impl BatchSnapshot {
    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty() && self.files.is_empty()
    }

    /// Ids of the files carried by the batch
    pub fn sent_file_ids(&self) -> HashSet<FileId> {
        self.files.iter().map(|(id, _)| *id).collect()
    }

    /// Mark every queued item saved unless it was edited after queuing
    ///
    /// Returns how many items stayed dirty because of a newer edit.
    pub fn mark_acknowledged(&self, store: &mut WorkspaceStore) -> usize {
        let mut still_dirty = 0;

        for (id, generation) in &self.workspaces {
            if let Some(ws) = store.workspace_mut(*id) {
                if !ws.mark_saved_if_unchanged(*generation) {
                    still_dirty += 1;
                }
            }
        }

        for (id, generation) in &self.files {
            if let Some(file) = store.file_mut(*id) {
                if !file.mark_saved_if_unchanged(*generation) {
                    still_dirty += 1;
                }
            }
        }

        still_dirty
    }
}

/// A request ready to send plus the snapshot needed to acknowledge it
#[derive(Debug, Clone)]
pub struct PendingBatch {
    pub request: SendUpdatesRequest,
    pub snapshot: BatchSnapshot,
}

/// Collect every unsaved workspace and file into a `sendUpdates` request
///
/// Entities with placeholder ids are skipped: the server cannot address
/// them until their create call has returned.
pub fn collect_dirty(store: &WorkspaceStore, user: &UserSession, force: bool) -> PendingBatch {
    let mut snapshot = BatchSnapshot::default();
    let mut workspaces = Vec::new();
    let mut files = Vec::new();

    for ws in store.workspaces() {
        if ws.id.is_placeholder() {
            continue;
        }

        if !ws.is_saved() {
            snapshot.workspaces.push((ws.id, ws.generation()));
            workspaces.push(ws.to_workspace_data(false));
        }

        for file in ws.files() {
            if file.is_saved() || file.id.is_placeholder() {
                continue;
            }
            snapshot.files.push((file.id, file.generation()));
            files.push(file.to_file_data());
        }
    }

    let request = SendUpdatesRequest {
        workspaces,
        files,
        owner_id: user.workspaces_owner_id,
        user_id: user.user_id,
        current_workspace_id: store.routing_workspace_id(),
        get_modified_workspaces: force,
    };

    PendingBatch { request, snapshot }
}

/// The GUI state document and its generation, if it awaits sending
pub fn snapshot_gui_state(store: &WorkspaceStore) -> Option<(serde_json::Value, u64)> {
    let gui = store.gui_state();
    gui.is_dirty()
        .then(|| (gui.value().clone(), gui.generation()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{File, Workspace};
    use crate::session::Role;
    use serde_json::json;

    fn store_with_file() -> WorkspaceStore {
        let mut store = WorkspaceStore::new();
        let mut ws = Workspace::new(WorkspaceId(1), 7, "Homework");
        ws.mark_saved();
        let mut file = File::new(FileId(10), WorkspaceId(1), "Main.java", "v1");
        file.mark_saved();
        ws.add_file(file);
        store.add_workspace(ws);
        store
    }

    fn user() -> UserSession {
        UserSession::new(7, Role::Student)
    }

    #[test]
    fn test_clean_store_produces_empty_batch() {
        let store = store_with_file();
        let batch = collect_dirty(&store, &user(), false);
        assert!(batch.request.is_empty());
        assert!(batch.snapshot.is_empty());
        assert!(!batch.request.get_modified_workspaces);
    }

    #[test]
    fn test_dirty_file_is_collected() {
        let mut store = store_with_file();
        store.edit_file(FileId(10), "v2");

        let batch = collect_dirty(&store, &user(), true);
        assert_eq!(batch.request.files.len(), 1);
        assert_eq!(batch.request.files[0].text, "v2");
        assert!(batch.request.workspaces.is_empty());
        assert!(batch.request.get_modified_workspaces);
        assert_eq!(batch.snapshot.files, vec![(FileId(10), 1)]);
    }

    #[test]
    fn test_placeholders_are_skipped() {
        let mut store = store_with_file();
        let ws = store.create_workspace(7, "Local");
        store.create_file(ws, "a.txt", "x");
        store.create_file(WorkspaceId(1), "b.txt", "y");

        let batch = collect_dirty(&store, &user(), false);
        assert!(batch.request.is_empty());
    }

    #[test]
    fn test_acknowledge_skips_items_edited_in_flight() {
        let mut store = store_with_file();
        store.edit_file(FileId(10), "v2");
        let batch = collect_dirty(&store, &user(), false);

        // Edit while the request is in flight
        store.edit_file(FileId(10), "v3");

        let still_dirty = batch.snapshot.mark_acknowledged(&mut store);
        assert_eq!(still_dirty, 1);
        assert!(!store.file(FileId(10)).unwrap().is_saved());
    }

    #[test]
    fn test_acknowledge_marks_saved() {
        let mut store = store_with_file();
        store.workspace_mut(WorkspaceId(1)).unwrap().rename("Renamed");
        store.edit_file(FileId(10), "v2");

        let batch = collect_dirty(&store, &user(), false);
        assert_eq!(batch.request.workspaces.len(), 1);
        assert!(batch.request.workspaces[0].files.is_empty());

        assert_eq!(batch.snapshot.mark_acknowledged(&mut store), 0);
        assert!(!store.has_unsaved_changes());
    }

    #[test]
    fn test_request_routing_fields() {
        let mut store = store_with_file();
        store.set_current_workspace(Some(WorkspaceId(1)));
        let teacher = UserSession::new(2, Role::Teacher).with_owner(7);

        let request = collect_dirty(&store, &teacher, false).request;
        assert_eq!(request.user_id, 2);
        assert_eq!(request.owner_id, 7);
        assert_eq!(request.current_workspace_id, Some(WorkspaceId(1)));
    }

    #[test]
    fn test_gui_state_snapshot() {
        let mut store = WorkspaceStore::new();
        assert!(snapshot_gui_state(&store).is_none());

        store.gui_state_mut().set(json!({"theme": "dark"}));
        let (value, generation) = snapshot_gui_state(&store).unwrap();
        assert_eq!(value, json!({"theme": "dark"}));
        assert_eq!(generation, 1);
    }
}
