//! Sync protocol message types
//!
//! JSON request/response bodies exchanged with the server's servlet
//! endpoints. Field names follow the server's wire format.

use serde::{Deserialize, Serialize};

use crate::models::{FileId, UserId, WorkspaceId};

/// A file as sent to or received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    pub id: FileId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub text: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub sorting_order: i32,
}

/// A workspace as sent to or received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceData {
    pub id: WorkspaceId,
    #[serde(default)]
    pub owner_id: UserId,
    pub name: String,
    #[serde(default)]
    pub sorting_order: i32,
    #[serde(rename = "pruefung_id", default)]
    pub exam_id: Option<i64>,
    #[serde(default)]
    pub repository_id: Option<i64>,
    #[serde(default)]
    pub files: Vec<FileData>,
}

/// Batch of dirty workspaces and files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendUpdatesRequest {
    /// Dirty workspaces, without nested files
    #[serde(rename = "workspacesWithoutFiles")]
    pub workspaces: Vec<WorkspaceData>,
    /// Dirty files, flat
    pub files: Vec<FileData>,
    pub owner_id: UserId,
    #[serde(rename = "userId")]
    pub user_id: UserId,
    /// Open workspace; null when it belongs to an exam
    #[serde(rename = "currentWorkspaceId")]
    pub current_workspace_id: Option<WorkspaceId>,
    /// Ask the server to return its snapshot even if nothing was sent
    #[serde(rename = "getModifiedWorkspaces")]
    pub get_modified_workspaces: bool,
}

impl SendUpdatesRequest {
    /// Whether the batch carries no workspaces and no files
    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty() && self.files.is_empty()
    }
}

/// Full workspace snapshot returned for reconciliation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub workspaces: Vec<WorkspaceData>,
}

/// Response to `sendUpdates`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendUpdatesResponse {
    pub success: bool,
    #[serde(default)]
    pub workspaces: Option<WorkspaceSnapshot>,
    /// Files the server insists be overwritten on the client
    #[serde(rename = "filesToForceUpdate", default)]
    pub files_to_force_update: Option<Vec<FileData>>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Preference document upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateGuiStateRequest {
    pub gui_state: serde_json::Value,
    #[serde(rename = "userId")]
    pub user_id: UserId,
}

/// Generic acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Create or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrudKind {
    Create,
    Delete,
}

/// Entity addressed by a create/delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrudEntity {
    Workspace,
    File,
}

/// Payload of a create request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CrudData {
    Workspace(WorkspaceData),
    File(FileData),
}

/// `createOrDeleteFileOrWorkspace` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrDeleteRequest {
    #[serde(rename = "type")]
    pub kind: CrudKind,
    pub entity: CrudEntity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CrudData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<UserId>,
    #[serde(rename = "userId")]
    pub user_id: UserId,
}

impl CreateOrDeleteRequest {
    /// Create a workspace owned by `owner_id`
    pub fn create_workspace(data: WorkspaceData, owner_id: UserId, user_id: UserId) -> Self {
        Self {
            kind: CrudKind::Create,
            entity: CrudEntity::Workspace,
            data: Some(CrudData::Workspace(data)),
            ids: None,
            owner_id: Some(owner_id),
            user_id,
        }
    }

    /// Create a file owned by `owner_id`
    pub fn create_file(data: FileData, owner_id: UserId, user_id: UserId) -> Self {
        Self {
            kind: CrudKind::Create,
            entity: CrudEntity::File,
            data: Some(CrudData::File(data)),
            ids: None,
            owner_id: Some(owner_id),
            user_id,
        }
    }

    /// Delete the given workspaces or files
    pub fn delete(entity: CrudEntity, ids: Vec<i64>, user_id: UserId) -> Self {
        Self {
            kind: CrudKind::Delete,
            entity,
            data: None,
            ids: Some(ids),
            owner_id: None,
            user_id,
        }
    }
}

/// Response to `createOrDeleteFileOrWorkspace`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrudResponse {
    pub success: bool,
    /// Id assigned on create
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `moveFile` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveFileRequest {
    pub file_id: FileId,
    pub destination_workspace_id: WorkspaceId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOrder {
    #[serde(rename = "fileId")]
    pub file_id: FileId,
    pub order: i32,
}

/// `updateFileOrder` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateFileOrderRequest {
    #[serde(rename = "fileOrderList")]
    pub file_order_list: Vec<FileOrder>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceOrder {
    #[serde(rename = "workspaceId")]
    pub workspace_id: WorkspaceId,
    pub order: i32,
}

/// `updateWorkspaceOrder` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateWorkspaceOrderRequest {
    #[serde(rename = "workspaceOrderList")]
    pub workspace_order_list: Vec<WorkspaceOrder>,
}

/// Responses that carry a success flag and an optional message
pub trait Acknowledgement {
    fn success(&self) -> bool;
    fn message(&self) -> Option<&str>;
}

macro_rules! impl_acknowledgement {
    ($($ty:ty),*) => {
        $(impl Acknowledgement for $ty {
            fn success(&self) -> bool {
                self.success
            }

            fn message(&self) -> Option<&str> {
                self.message.as_deref()
            }
        })*
    };
}

impl_acknowledgement!(SendUpdatesResponse, BaseResponse, CrudResponse);
