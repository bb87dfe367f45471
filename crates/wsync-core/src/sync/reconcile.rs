//! Merging server snapshots into the local tree
//!
//! Precedence rules:
//! - content of a file sent in the same round stays local (sender wins)
//! - content of any other clean file is replaced by the server's copy
//! - the server decides which files exist and what their versions are
//!
//! A file that was edited while the round was in flight is neither sent nor
//! clean; its local content is kept and goes out with the next round.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::models::{File, FileId, Workspace};
use crate::store::WorkspaceStore;

use super::client::SyncEvent;
use super::message::{FileData, WorkspaceData};

/// What a reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    /// Events for the UI, in the order they happened
    pub events: Vec<SyncEvent>,
    pub workspaces_added: usize,
    pub files_added: usize,
    pub files_removed: usize,
    pub files_replaced: usize,
    pub versions_updated: usize,
}

impl ReconcileReport {
    /// True when the pass did not mutate the store
    pub fn is_noop(&self) -> bool {
        self.workspaces_added == 0
            && self.files_added == 0
            && self.files_removed == 0
            && self.files_replaced == 0
            && self.versions_updated == 0
    }
}

/// Merge the server's workspace snapshot into `store`
///
/// `sent_file_ids` are the files carried by the request this snapshot
/// answers. With `notify_new_workspaces`, the names of workspaces that
/// appeared remotely (exam workspaces excluded) are reported in one
/// [`SyncEvent::NewWorkspacesReceived`].
pub fn reconcile(
    store: &mut WorkspaceStore,
    sent_file_ids: &HashSet<FileId>,
    remote_workspaces: &[WorkspaceData],
    notify_new_workspaces: bool,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let mut new_names = Vec::new();
    let active = store.current_workspace();

    for remote in remote_workspaces {
        match store.workspace_mut(remote.id) {
            Some(local) => {
                let is_active = active == Some(local.id);
                merge_files(local, remote, sent_file_ids, is_active, &mut report);
            }
            None => {
                let workspace = Workspace::from_remote(remote);
                if !workspace.is_exam_bound() {
                    new_names.push(workspace.name.clone());
                }
                report.events.push(SyncEvent::WorkspaceAdded {
                    id: workspace.id,
                    name: workspace.name.clone(),
                });
                report.workspaces_added += 1;
                store.add_workspace(workspace);
            }
        }
    }

    if notify_new_workspaces && !new_names.is_empty() {
        report.events.push(SyncEvent::NewWorkspacesReceived(new_names));
    }

    store.sort();
    report.events.push(SyncEvent::ResortRequested);

    debug!(
        "Reconciled: +{} workspaces, +{} files, -{} files, {} replaced, {} versions",
        report.workspaces_added,
        report.files_added,
        report.files_removed,
        report.files_replaced,
        report.versions_updated
    );

    report
}

fn merge_files(
    local: &mut Workspace,
    remote: &WorkspaceData,
    sent_file_ids: &HashSet<FileId>,
    is_active: bool,
    report: &mut ReconcileReport,
) {
    let remote_files: HashMap<FileId, &FileData> =
        remote.files.iter().map(|f| (f.id, f)).collect();
    let workspace_id = local.id;

    // Placeholders are not known to the server yet, so their absence
    // from the snapshot means nothing.
    let removed: Vec<FileId> = local
        .files()
        .iter()
        .filter(|f| !f.id.is_placeholder() && !remote_files.contains_key(&f.id))
        .map(|f| f.id)
        .collect();

    for file_id in removed {
        local.remove_file(file_id);
        report.files_removed += 1;
        report.events.push(SyncEvent::FileRemoved {
            workspace_id,
            file_id,
        });
    }

    for file in local.files_mut() {
        let Some(remote_file) = remote_files.get(&file.id) else {
            continue;
        };

        if !sent_file_ids.contains(&file.id)
            && file.is_saved()
            && file.text() != remote_file.text
        {
            file.replace_from_remote(&remote_file.text);
            report.files_replaced += 1;
            report.events.push(SyncEvent::FileContentReplaced { file_id: file.id });
        }

        if file.update_remote_version(remote_file.version) {
            report.versions_updated += 1;
        }
    }

    let known: HashSet<FileId> = local.files().iter().map(|f| f.id).collect();
    for remote_file in &remote.files {
        if known.contains(&remote_file.id) {
            continue;
        }
        local.add_file(File::from_remote(remote_file));
        report.files_added += 1;
        if is_active {
            report.events.push(SyncEvent::FileAdded {
                workspace_id,
                file_id: remote_file.id,
                name: remote_file.name.clone(),
            });
        }
    }
}

/// Overwrite local files the server insists on
///
/// Only files present locally are touched. Versions are recorded even when
/// the content already matches.
pub fn apply_forced_updates(store: &mut WorkspaceStore, files: &[FileData]) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for remote in files {
        let Some(file) = store.file_mut(remote.id) else {
            continue;
        };

        if file.text() != remote.text {
            file.replace_from_remote(&remote.text);
            report.files_replaced += 1;
            report
                .events
                .push(SyncEvent::FileContentReplaced { file_id: file.id });
        }

        if file.update_remote_version(remote.version) {
            report.versions_updated += 1;
        }
    }

    report
}
