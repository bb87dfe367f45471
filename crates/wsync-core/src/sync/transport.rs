//! Transport abstraction
//!
//! A transport posts a JSON request to a named endpoint and returns a typed
//! response, and offers a fire-and-forget beacon for shutdown. The HTTP
//! implementation lives in `http.rs`; [`MockTransport`] records requests and
//! replays queued responses for tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::TransportError;

/// Server endpoints used by the sync client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    SendUpdates,
    UpdateGuiState,
    CreateOrDeleteFileOrWorkspace,
    MoveFile,
    UpdateFileOrder,
    UpdateWorkspaceOrder,
}

impl Endpoint {
    /// Path relative to the server URL
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::SendUpdates => "servlet/sendUpdates",
            Endpoint::UpdateGuiState => "servlet/updateGuiState",
            Endpoint::CreateOrDeleteFileOrWorkspace => "servlet/createOrDeleteFileOrWorkspace",
            Endpoint::MoveFile => "servlet/moveFile",
            Endpoint::UpdateFileOrder => "servlet/updateFileOrder",
            Endpoint::UpdateWorkspaceOrder => "servlet/updateWorkspaceOrder",
        }
    }
}

/// Network layer used by the sync client
pub trait Transport: Send + Sync + 'static {
    /// Send a request and wait for the typed response
    fn post<Req, Resp>(
        &self,
        endpoint: Endpoint,
        request: &Req,
    ) -> impl Future<Output = Result<Resp, TransportError>> + Send
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned;

    /// Hand a serialized request to a best-effort channel
    ///
    /// There is no completion signal; delivery is assumed.
    fn send_beacon(&self, endpoint: Endpoint, payload: Vec<u8>);
}

/// A recorded request
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub endpoint: Endpoint,
    pub body: serde_json::Value,
}

#[derive(Debug, Default)]
struct MockInner {
    replies: HashMap<Endpoint, VecDeque<Result<serde_json::Value, TransportError>>>,
    requests: Vec<RecordedRequest>,
    beacons: Vec<RecordedRequest>,
}

/// In-memory transport for tests
///
/// Replies are queued per endpoint; a post with nothing queued fails with a
/// network error.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Mutex<MockInner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful JSON reply for `endpoint`
    pub fn push_reply(&self, endpoint: Endpoint, reply: serde_json::Value) {
        self.lock()
            .replies
            .entry(endpoint)
            .or_default()
            .push_back(Ok(reply));
    }

    /// Queue a transport failure for `endpoint`
    pub fn push_error(&self, endpoint: Endpoint, error: TransportError) {
        self.lock()
            .replies
            .entry(endpoint)
            .or_default()
            .push_back(Err(error));
    }

    /// All requests posted so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Requests posted to one endpoint
    pub fn requests_to(&self, endpoint: Endpoint) -> Vec<serde_json::Value> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.endpoint == endpoint)
            .map(|r| r.body.clone())
            .collect()
    }

    /// All beacons handed over so far
    pub fn beacons(&self) -> Vec<RecordedRequest> {
        self.lock().beacons.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MockTransport {
    async fn post<Req, Resp>(&self, endpoint: Endpoint, request: &Req) -> Result<Resp, TransportError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_value(request).map_err(|e| TransportError::Encode {
            endpoint: endpoint.path(),
            message: e.to_string(),
        })?;

        let reply = {
            let mut inner = self.lock();
            inner.requests.push(RecordedRequest { endpoint, body });
            inner
                .replies
                .get_mut(&endpoint)
                .and_then(VecDeque::pop_front)
        };

        let value = reply.unwrap_or_else(|| {
            Err(TransportError::Network {
                endpoint: endpoint.path(),
                message: "no reply queued".to_string(),
            })
        })?;

        serde_json::from_value(value).map_err(|e| TransportError::Decode {
            endpoint: endpoint.path(),
            message: e.to_string(),
        })
    }

    fn send_beacon(&self, endpoint: Endpoint, payload: Vec<u8>) {
        let body = serde_json::from_slice(&payload).unwrap_or(serde_json::Value::Null);
        self.lock().beacons.push(RecordedRequest { endpoint, body });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::message::BaseResponse;
    use serde_json::json;

    #[test]
    fn test_endpoint_paths() {
        assert_eq!(Endpoint::SendUpdates.path(), "servlet/sendUpdates");
        assert_eq!(
            Endpoint::UpdateWorkspaceOrder.path(),
            "servlet/updateWorkspaceOrder"
        );
    }

    #[tokio::test]
    async fn test_mock_replays_in_order() {
        let mock = MockTransport::new();
        mock.push_reply(Endpoint::MoveFile, json!({"success": true}));
        mock.push_reply(Endpoint::MoveFile, json!({"success": false, "message": "nope"}));

        let first: BaseResponse = mock.post(Endpoint::MoveFile, &json!({"a": 1})).await.unwrap();
        let second: BaseResponse = mock.post(Endpoint::MoveFile, &json!({"a": 2})).await.unwrap();

        assert!(first.success);
        assert_eq!(second.message.as_deref(), Some("nope"));
        assert_eq!(mock.requests_to(Endpoint::MoveFile).len(), 2);
    }

    #[tokio::test]
    async fn test_mock_without_reply_fails() {
        let mock = MockTransport::new();
        let result: Result<BaseResponse, _> = mock.post(Endpoint::SendUpdates, &json!({})).await;
        assert!(matches!(result, Err(TransportError::Network { .. })));
        assert_eq!(mock.requests().len(), 1);
    }

    #[test]
    fn test_mock_records_beacons() {
        let mock = MockTransport::new();
        mock.send_beacon(Endpoint::SendUpdates, br#"{"files":[]}"#.to_vec());
        let beacons = mock.beacons();
        assert_eq!(beacons.len(), 1);
        assert_eq!(beacons[0].body, json!({"files": []}));
    }
}
