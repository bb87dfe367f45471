//! Create, delete, move and reorder operations
//!
//! Entity operations go out immediately instead of waiting for the next
//! round. In an ephemeral session they only change the local tree and new
//! entities keep their placeholder ids. Without a session they fail.

use tracing::{debug, info};

use super::client::SyncClient;
use super::error::{SyncError, SyncResult};
use super::message::{
    Acknowledgement, BaseResponse, CreateOrDeleteRequest, CrudEntity, CrudResponse, FileOrder,
    MoveFileRequest, UpdateFileOrderRequest, UpdateWorkspaceOrderRequest, WorkspaceOrder,
};
use super::transport::{Endpoint, Transport};
use crate::models::{FileId, WorkspaceId};
use crate::session::{Session, UserSession};

/// Fail unless the response carries `success: true`
fn acknowledged<R: Acknowledgement>(endpoint: Endpoint, response: R) -> SyncResult<R> {
    if response.success() {
        Ok(response)
    } else {
        Err(SyncError::Rejected {
            endpoint: endpoint.path(),
            message: response.message().unwrap_or("no message").to_string(),
        })
    }
}

/// The logged-in user, and whether requests may be sent on their behalf
fn require_user(session: &Session) -> SyncResult<(UserSession, bool)> {
    let user = session.user().cloned().ok_or(SyncError::NoSession)?;
    Ok((user, !session.network_blocked()))
}

impl<T: Transport> SyncClient<T> {
    async fn post_checked<Req, Resp>(&self, endpoint: Endpoint, request: &Req) -> SyncResult<Resp>
    where
        Req: serde::Serialize + Sync,
        Resp: serde::de::DeserializeOwned + Acknowledgement,
    {
        let response: Resp = self.transport().post(endpoint, request).await?;
        acknowledged(endpoint, response)
    }

    async fn post_create(&self, request: &CreateOrDeleteRequest) -> SyncResult<i64> {
        let endpoint = Endpoint::CreateOrDeleteFileOrWorkspace;
        let response: CrudResponse = self.post_checked(endpoint, request).await?;
        response.id.ok_or_else(|| SyncError::Rejected {
            endpoint: endpoint.path(),
            message: "no id assigned".to_string(),
        })
    }

    /// Create a workspace owned by the session's workspace owner
    ///
    /// The workspace is added locally first. If the server refuses, it is
    /// removed again. A sync round running meanwhile may already deliver
    /// the new workspace; the placeholder then merges into it.
    pub async fn create_workspace(&self, name: &str) -> SyncResult<WorkspaceId> {
        let (user, online) = require_user(&self.session())?;

        let (placeholder, data, generation) = {
            let mut store = self.store().lock().await;
            let id = store.create_workspace(user.workspaces_owner_id, name);
            let ws = store.workspace(id).ok_or(SyncError::WorkspaceNotFound(id))?;
            (id, ws.to_workspace_data(false), ws.generation())
        };

        if !online {
            debug!("Created local workspace {} ({})", placeholder, name);
            return Ok(placeholder);
        }

        let request =
            CreateOrDeleteRequest::create_workspace(data, user.workspaces_owner_id, user.user_id);
        let result = self.post_create(&request).await;

        let mut store = self.store().lock().await;
        match result {
            Ok(id) => {
                let id = WorkspaceId(id);
                if !store.settle_created_workspace(placeholder, id, generation) {
                    debug!("Placeholder {} gone before the server answered", placeholder);
                }
                info!("Created workspace {} ({})", id, name);
                Ok(id)
            }
            Err(e) => {
                store.remove_workspace(placeholder);
                Err(e)
            }
        }
    }

    /// Create a file in `workspace_id`
    ///
    /// The parent workspace must already exist on the server. On success the
    /// file carries the server id and is saved.
    pub async fn create_file(
        &self,
        workspace_id: WorkspaceId,
        name: &str,
        text: &str,
    ) -> SyncResult<FileId> {
        let (user, online) = require_user(&self.session())?;
        if online && workspace_id.is_placeholder() {
            return Err(SyncError::WorkspaceNotCreated(workspace_id));
        }

        let (placeholder, data, generation) = {
            let mut store = self.store().lock().await;
            let id = store
                .create_file(workspace_id, name, text)
                .ok_or(SyncError::WorkspaceNotFound(workspace_id))?;
            let file = store.file(id).ok_or(SyncError::FileNotFound(id))?;
            (id, file.to_file_data(), file.generation())
        };

        if !online {
            debug!("Created local file {} ({})", placeholder, name);
            return Ok(placeholder);
        }

        let request = CreateOrDeleteRequest::create_file(data, user.workspaces_owner_id, user.user_id);
        let result = self.post_create(&request).await;

        let mut store = self.store().lock().await;
        match result {
            Ok(id) => {
                let id = FileId(id);
                if !store.settle_created_file(placeholder, id, generation) {
                    debug!("Placeholder {} gone before the server answered", placeholder);
                }
                info!("Created file {} ({})", id, name);
                Ok(id)
            }
            Err(e) => {
                store.remove_file(placeholder);
                Err(e)
            }
        }
    }

    /// Delete workspaces with all their files
    ///
    /// Workspaces the server knows about are removed locally only after the
    /// server confirmed the deletion.
    pub async fn delete_workspaces(&self, ids: &[WorkspaceId]) -> SyncResult<()> {
        let (user, online) = require_user(&self.session())?;

        let remote_ids: Vec<i64> = ids
            .iter()
            .filter(|id| !id.is_placeholder())
            .map(|id| id.0)
            .collect();

        if online && !remote_ids.is_empty() {
            let request = CreateOrDeleteRequest::delete(CrudEntity::Workspace, remote_ids, user.user_id);
            let _: CrudResponse = self
                .post_checked(Endpoint::CreateOrDeleteFileOrWorkspace, &request)
                .await?;
        }

        let mut store = self.store().lock().await;
        for id in ids {
            store.remove_workspace(*id);
        }
        info!("Deleted {} workspaces", ids.len());
        Ok(())
    }

    /// Delete files
    pub async fn delete_files(&self, ids: &[FileId]) -> SyncResult<()> {
        let (user, online) = require_user(&self.session())?;

        let remote_ids: Vec<i64> = ids
            .iter()
            .filter(|id| !id.is_placeholder())
            .map(|id| id.0)
            .collect();

        if online && !remote_ids.is_empty() {
            let request = CreateOrDeleteRequest::delete(CrudEntity::File, remote_ids, user.user_id);
            let _: CrudResponse = self
                .post_checked(Endpoint::CreateOrDeleteFileOrWorkspace, &request)
                .await?;
        }

        let mut store = self.store().lock().await;
        for id in ids {
            store.remove_file(*id);
        }
        info!("Deleted {} files", ids.len());
        Ok(())
    }

    /// Move a file into another workspace
    pub async fn move_file(&self, file_id: FileId, destination: WorkspaceId) -> SyncResult<()> {
        let (_, online) = require_user(&self.session())?;

        {
            let store = self.store().lock().await;
            store.file(file_id).ok_or(SyncError::FileNotFound(file_id))?;
            store
                .workspace(destination)
                .ok_or(SyncError::WorkspaceNotFound(destination))?;
        }

        if online {
            if file_id.is_placeholder() {
                return Err(SyncError::FileNotCreated(file_id));
            }
            if destination.is_placeholder() {
                return Err(SyncError::WorkspaceNotCreated(destination));
            }
            let request = MoveFileRequest {
                file_id,
                destination_workspace_id: destination,
            };
            let _: BaseResponse = self.post_checked(Endpoint::MoveFile, &request).await?;
        }

        let mut store = self.store().lock().await;
        if !store.move_file(file_id, destination) {
            return Err(SyncError::FileNotFound(file_id));
        }
        debug!("Moved file {} to workspace {}", file_id, destination);
        Ok(())
    }

    /// Send the current file order of one workspace
    pub async fn update_file_order(&self, workspace_id: WorkspaceId) -> SyncResult<()> {
        let (_, online) = require_user(&self.session())?;

        let file_order_list: Vec<FileOrder> = {
            let store = self.store().lock().await;
            let ws = store
                .workspace(workspace_id)
                .ok_or(SyncError::WorkspaceNotFound(workspace_id))?;
            ws.files()
                .iter()
                .filter(|f| !f.id.is_placeholder())
                .map(|f| FileOrder {
                    file_id: f.id,
                    order: f.sorting_order,
                })
                .collect()
        };

        if !online || file_order_list.is_empty() {
            return Ok(());
        }

        let request = UpdateFileOrderRequest { file_order_list };
        let _: BaseResponse = self.post_checked(Endpoint::UpdateFileOrder, &request).await?;
        Ok(())
    }

    /// Send the current workspace order
    pub async fn update_workspace_order(&self) -> SyncResult<()> {
        let (_, online) = require_user(&self.session())?;

        let workspace_order_list: Vec<WorkspaceOrder> = {
            let store = self.store().lock().await;
            store
                .workspaces()
                .iter()
                .filter(|w| !w.id.is_placeholder())
                .map(|w| WorkspaceOrder {
                    workspace_id: w.id,
                    order: w.sorting_order,
                })
                .collect()
        };

        if !online || workspace_order_list.is_empty() {
            return Ok(());
        }

        let request = UpdateWorkspaceOrderRequest {
            workspace_order_list,
        };
        let _: BaseResponse = self
            .post_checked(Endpoint::UpdateWorkspaceOrder, &request)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::models::Workspace;
    use crate::session::Role;
    use crate::store::WorkspaceStore;
    use crate::sync::transport::MockTransport;

    fn client(session: Session) -> SyncClient<MockTransport> {
        let mut store = WorkspaceStore::new();
        let mut ws = Workspace::new(WorkspaceId(1), 7, "Homework");
        ws.mark_saved();
        store.add_workspace(ws);
        SyncClient::new(Arc::new(MockTransport::new()), store.into_shared(), session)
    }

    fn authenticated() -> Session {
        Session::Authenticated(UserSession::new(7, Role::Student))
    }

    #[tokio::test]
    async fn test_create_workspace_assigns_server_id() {
        let client = client(authenticated());
        client.transport().push_reply(
            Endpoint::CreateOrDeleteFileOrWorkspace,
            json!({"success": true, "id": 42}),
        );

        let id = client.create_workspace("Project").await.unwrap();
        assert_eq!(id, WorkspaceId(42));

        let store = client.store().lock().await;
        assert!(store.workspace(id).unwrap().is_saved());

        let sent = client
            .transport()
            .requests_to(Endpoint::CreateOrDeleteFileOrWorkspace);
        assert_eq!(sent[0]["type"], json!("create"));
        assert_eq!(sent[0]["entity"], json!("workspace"));
        assert_eq!(sent[0]["data"]["name"], json!("Project"));
        assert_eq!(sent[0]["owner_id"], json!(7));
    }

    #[tokio::test]
    async fn test_create_workspace_failure_removes_placeholder() {
        let client = client(authenticated());
        client.transport().push_reply(
            Endpoint::CreateOrDeleteFileOrWorkspace,
            json!({"success": false, "message": "quota"}),
        );

        let err = client.create_workspace("Project").await.unwrap_err();
        assert!(matches!(err, SyncError::Rejected { .. }));
        assert_eq!(client.store().lock().await.workspaces().len(), 1);
    }

    #[tokio::test]
    async fn test_ephemeral_creates_unique_placeholders() {
        let client = client(Session::Ephemeral(UserSession::new(7, Role::Student)));

        let a = client.create_workspace("A").await.unwrap();
        let b = client.create_workspace("B").await.unwrap();
        let f1 = client.create_file(a, "x.txt", "").await.unwrap();
        let f2 = client.create_file(WorkspaceId(1), "y.txt", "").await.unwrap();

        let ids: HashSet<i64> = [a.0, b.0, f1.0, f2.0].into();
        assert_eq!(ids.len(), 4);
        assert!(ids.iter().all(|id| *id < 0));
        assert!(client.transport().requests().is_empty());
    }

    #[tokio::test]
    async fn test_no_session_is_an_error() {
        let client = client(Session::NoSession);
        let err = client.create_workspace("A").await.unwrap_err();
        assert!(matches!(err, SyncError::NoSession));
    }

    #[tokio::test]
    async fn test_create_file_needs_created_workspace() {
        let client = client(authenticated());
        let err = client
            .create_file(WorkspaceId(-5), "a.txt", "")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::WorkspaceNotCreated(WorkspaceId(-5))));
    }

    #[tokio::test]
    async fn test_create_file_marks_saved() {
        let client = client(authenticated());
        client.transport().push_reply(
            Endpoint::CreateOrDeleteFileOrWorkspace,
            json!({"success": true, "id": 100}),
        );

        let id = client
            .create_file(WorkspaceId(1), "Main.java", "class Main {}")
            .await
            .unwrap();
        assert_eq!(id, FileId(100));

        let store = client.store().lock().await;
        let file = store.file(id).unwrap();
        assert!(file.is_saved());
        assert_eq!(file.workspace_id, WorkspaceId(1));
    }

    #[tokio::test]
    async fn test_delete_files_after_confirmation() {
        let client = client(authenticated());
        client.transport().push_reply(
            Endpoint::CreateOrDeleteFileOrWorkspace,
            json!({"success": true, "id": 100}),
        );
        let id = client
            .create_file(WorkspaceId(1), "a.txt", "")
            .await
            .unwrap();

        client.transport().push_reply(
            Endpoint::CreateOrDeleteFileOrWorkspace,
            json!({"success": false}),
        );
        assert!(client.delete_files(&[id]).await.is_err());
        assert!(client.store().lock().await.file(id).is_some());

        client.transport().push_reply(
            Endpoint::CreateOrDeleteFileOrWorkspace,
            json!({"success": true}),
        );
        client.delete_files(&[id]).await.unwrap();
        assert!(client.store().lock().await.file(id).is_none());

        let sent = client
            .transport()
            .requests_to(Endpoint::CreateOrDeleteFileOrWorkspace);
        assert_eq!(sent[2], json!({"type": "delete", "entity": "file", "ids": [100], "userId": 7}));
    }

    #[tokio::test]
    async fn test_delete_placeholder_stays_local() {
        let client = client(authenticated());
        let placeholder = client.store().lock().await.create_workspace(7, "Local");

        client.delete_workspaces(&[placeholder]).await.unwrap();
        assert!(client.transport().requests().is_empty());
        assert!(client.store().lock().await.workspace(placeholder).is_none());
    }

    #[tokio::test]
    async fn test_move_file() {
        let client = client(authenticated());
        {
            let mut store = client.store().lock().await;
            store.add_workspace(Workspace::new(WorkspaceId(2), 7, "Other"));
        }
        client.transport().push_reply(
            Endpoint::CreateOrDeleteFileOrWorkspace,
            json!({"success": true, "id": 100}),
        );
        let id = client
            .create_file(WorkspaceId(1), "a.txt", "")
            .await
            .unwrap();

        client
            .transport()
            .push_reply(Endpoint::MoveFile, json!({"success": true}));
        client.move_file(id, WorkspaceId(2)).await.unwrap();

        assert_eq!(
            client.store().lock().await.file(id).unwrap().workspace_id,
            WorkspaceId(2)
        );
        let sent = client.transport().requests_to(Endpoint::MoveFile);
        assert_eq!(sent[0], json!({"file_id": 100, "destination_workspace_id": 2}));
    }

    #[tokio::test]
    async fn test_update_orders() {
        let client = client(authenticated());
        {
            let mut store = client.store().lock().await;
            let mut ws = Workspace::new(WorkspaceId(2), 7, "Second");
            ws.sorting_order = 1;
            store.add_workspace(ws);
            store.create_workspace(7, "Placeholder");
        }
        client
            .transport()
            .push_reply(Endpoint::UpdateWorkspaceOrder, json!({"success": true}));

        client.update_workspace_order().await.unwrap();
        let sent = client.transport().requests_to(Endpoint::UpdateWorkspaceOrder);
        assert_eq!(
            sent[0],
            json!({"workspaceOrderList": [
                {"workspaceId": 1, "order": 0},
                {"workspaceId": 2, "order": 1}
            ]})
        );

        // Nothing to order in an empty workspace
        client.update_file_order(WorkspaceId(1)).await.unwrap();
        assert!(client
            .transport()
            .requests_to(Endpoint::UpdateFileOrder)
            .is_empty());
    }
}
