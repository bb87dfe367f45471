//! Sync client implementation
//!
//! Runs synchronization rounds against the server: sends the GUI state and
//! every unsaved workspace and file, then merges the server's answer back
//! into the local tree.
//!
//! Rounds never overlap: a round started while another is in flight is
//! skipped. Stopping the client bumps an epoch; a round whose response
//! arrives after that discards it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::error::{SyncError, SyncResult};
use super::message::{
    Acknowledgement, BaseResponse, SendUpdatesResponse, UpdateGuiStateRequest,
};
use super::reconcile::{apply_forced_updates, reconcile};
use super::tracker::{collect_dirty, snapshot_gui_state};
use super::transport::{Endpoint, Transport};
use crate::models::{FileId, WorkspaceId};
use crate::session::{Session, UserSession};
use crate::store::SharedStore;

/// Events emitted by the sync client
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A workspace appeared on the server
    WorkspaceAdded { id: WorkspaceId, name: String },
    /// A file appeared in the open workspace
    FileAdded {
        workspace_id: WorkspaceId,
        file_id: FileId,
        name: String,
    },
    /// A file was deleted on the server
    FileRemoved {
        workspace_id: WorkspaceId,
        file_id: FileId,
    },
    /// A file's content was overwritten with the server's copy
    FileContentReplaced { file_id: FileId },
    /// Workspaces shared with the user (one event per round)
    NewWorkspacesReceived(Vec<String>),
    /// Lists should be re-sorted
    ResortRequested,
    /// A round failed; the message is meant for the user
    Error(String),
}

/// How a round should behave
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundOptions {
    /// Contact the server even with nothing to send
    pub force_even_if_clean: bool,
    /// Hand the batch to the beacon channel instead of waiting for an answer
    pub use_beacon: bool,
    /// Report workspaces shared with the user
    pub notify_new_workspaces: bool,
}

impl RoundOptions {
    pub fn forced() -> Self {
        Self {
            force_even_if_clean: true,
            ..Self::default()
        }
    }

    /// Last-chance flush at shutdown
    pub fn beacon() -> Self {
        Self {
            use_beacon: true,
            ..Self::default()
        }
    }
}

/// Why a round did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No session, or an ephemeral one
    SessionGate,
    /// Another round is still waiting for the server
    RoundInFlight,
    /// The client was stopped while the request was in flight
    Stale,
}

/// How the batch left the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Nothing to send and no reason to ask
    NotNeeded,
    /// The server answered with success
    Acknowledged,
    /// Handed to the beacon channel; no answer will come
    Beacon,
}

/// Summary of a round that ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSummary {
    pub workspaces_sent: usize,
    pub files_sent: usize,
    pub gui_state_sent: bool,
    pub delivery: Delivery,
}

impl RoundSummary {
    /// Whether the round carried any user change
    pub fn sent_real_change(&self) -> bool {
        self.gui_state_sent || self.workspaces_sent > 0 || self.files_sent > 0
    }
}

/// Result of [`SyncClient::run_round`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    Skipped(SkipReason),
    Completed(RoundSummary),
}

impl RoundOutcome {
    pub fn sent_real_change(&self) -> bool {
        match self {
            RoundOutcome::Skipped(_) => false,
            RoundOutcome::Completed(summary) => summary.sent_real_change(),
        }
    }
}

/// Releases the in-flight latch when the round ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sync client for the workspace server
pub struct SyncClient<T: Transport> {
    transport: Arc<T>,
    store: SharedStore,
    session: watch::Sender<Session>,
    /// Sticky until a round succeeds; forces the next round to contact the server
    last_round_failed: AtomicBool,
    in_flight: AtomicBool,
    epoch: AtomicU64,
    event_tx: mpsc::UnboundedSender<SyncEvent>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<SyncEvent>>>,
}

impl<T: Transport> SyncClient<T> {
    /// Create a new sync client
    pub fn new(transport: Arc<T>, store: SharedStore, session: Session) -> Self {
        let (session_tx, _) = watch::channel(session);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            transport,
            store,
            session: session_tx,
            last_round_failed: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
        }
    }

    /// Take the event receiver (can only be called once)
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SyncEvent>> {
        self.event_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Replace the session (login, logout, switching the viewed owner)
    pub fn set_session(&self, session: Session) {
        self.session.send_replace(session);
    }

    /// Current session
    pub fn session(&self) -> Session {
        self.session.borrow().clone()
    }

    /// Subscribe to session changes
    pub fn subscribe_session(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Whether the last round that talked to the server failed
    pub fn last_round_failed(&self) -> bool {
        self.last_round_failed.load(Ordering::Acquire)
    }

    /// Whether a round is waiting for the server right now
    pub fn is_round_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Make responses of rounds already in flight be discarded
    pub fn invalidate_in_flight(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Run one synchronization round
    ///
    /// Items are marked saved only once the server has acknowledged them;
    /// the beacon path never marks anything. On failure
    /// everything stays dirty and the next round contacts the server even
    /// if nothing changed.
    pub async fn run_round(&self, options: RoundOptions) -> SyncResult<RoundOutcome> {
        let session = self.session();
        let Some(user) = session.network_user().cloned() else {
            debug!("Sync round skipped: no network session");
            return Ok(RoundOutcome::Skipped(SkipReason::SessionGate));
        };

        // Beacon rounds run at teardown, after stopping has already
        // invalidated whatever round is still in flight.
        let _guard = match InFlightGuard::acquire(&self.in_flight) {
            Some(guard) => Some(guard),
            None if options.use_beacon => None,
            None => {
                debug!("Sync round skipped: another round is in flight");
                return Ok(RoundOutcome::Skipped(SkipReason::RoundInFlight));
            }
        };

        let epoch = self.epoch.load(Ordering::Acquire);

        let gui_state_sent = self.send_gui_state(&user, options.use_beacon, epoch).await;
        if self.epoch.load(Ordering::Acquire) != epoch {
            return Ok(RoundOutcome::Skipped(SkipReason::Stale));
        }

        let batch = {
            let store = self.store.lock().await;
            collect_dirty(&store, &user, options.force_even_if_clean)
        };

        let mut summary = RoundSummary {
            workspaces_sent: batch.request.workspaces.len(),
            files_sent: batch.request.files.len(),
            gui_state_sent,
            delivery: Delivery::NotNeeded,
        };

        if batch.request.is_empty() && !options.force_even_if_clean && !self.last_round_failed() {
            debug!("Nothing to sync");
            return Ok(RoundOutcome::Completed(summary));
        }

        if options.use_beacon {
            let payload = serde_json::to_vec(&batch.request)?;
            self.transport.send_beacon(Endpoint::SendUpdates, payload);

            // No answer will come; items stay dirty so a snapshot written
            // after this still carries them.
            info!(
                "Handed {} workspaces and {} files to the beacon",
                summary.workspaces_sent, summary.files_sent
            );
            summary.delivery = Delivery::Beacon;
            return Ok(RoundOutcome::Completed(summary));
        }

        debug!(
            "Sending {} workspaces and {} files (forced={})",
            summary.workspaces_sent, summary.files_sent, options.force_even_if_clean
        );

        let result: Result<SendUpdatesResponse, _> = self
            .transport
            .post(Endpoint::SendUpdates, &batch.request)
            .await;

        if self.epoch.load(Ordering::Acquire) != epoch {
            info!("Client stopped during sync round; discarding response");
            return Ok(RoundOutcome::Skipped(SkipReason::Stale));
        }

        let response = match result {
            Ok(response) if response.success() => response,
            Ok(response) => {
                let err = SyncError::Rejected {
                    endpoint: Endpoint::SendUpdates.path(),
                    message: response.message().unwrap_or("no message").to_string(),
                };
                return Err(self.fail_round(err));
            }
            Err(e) => return Err(self.fail_round(e.into())),
        };

        self.last_round_failed.store(false, Ordering::Release);

        let mut store = self.store.lock().await;
        let still_dirty = batch.snapshot.mark_acknowledged(&mut store);
        if still_dirty > 0 {
            debug!("{} items changed while in flight; left dirty", still_dirty);
        }

        if let Some(snapshot) = response.workspaces {
            let report = reconcile(
                &mut store,
                &batch.snapshot.sent_file_ids(),
                &snapshot.workspaces,
                options.notify_new_workspaces,
            );
            report.events.into_iter().for_each(|e| self.emit(e));
        }

        if let Some(files) = response.files_to_force_update {
            let report = apply_forced_updates(&mut store, &files);
            report.events.into_iter().for_each(|e| self.emit(e));
        }
        drop(store);

        summary.delivery = Delivery::Acknowledged;
        info!(
            "Sync round complete: {} workspaces, {} files",
            summary.workspaces_sent, summary.files_sent
        );
        Ok(RoundOutcome::Completed(summary))
    }

    /// Send the GUI state if it is dirty; returns whether it was sent
    ///
    /// A failure leaves the state dirty and does not abort the round.
    async fn send_gui_state(&self, user: &UserSession, use_beacon: bool, epoch: u64) -> bool {
        let Some((gui_state, generation)) = snapshot_gui_state(&*self.store.lock().await) else {
            return false;
        };

        let request = UpdateGuiStateRequest {
            gui_state,
            user_id: user.user_id,
        };

        if use_beacon {
            return match serde_json::to_vec(&request) {
                Ok(payload) => {
                    self.transport.send_beacon(Endpoint::UpdateGuiState, payload);
                    true
                }
                Err(e) => {
                    warn!("Failed to encode GUI state: {}", e);
                    false
                }
            };
        }

        let result: Result<BaseResponse, _> =
            self.transport.post(Endpoint::UpdateGuiState, &request).await;
        match result {
            Ok(response) if response.success() => {}
            Ok(response) => {
                let message = response.message().unwrap_or("no message").to_string();
                warn!("Server rejected GUI state: {}", message);
                self.emit(SyncEvent::Error(format!("GUI state not saved: {}", message)));
                return false;
            }
            Err(e) => {
                warn!("Failed to send GUI state: {}", e);
                self.emit(SyncEvent::Error(e.to_string()));
                return false;
            }
        }
        if self.epoch.load(Ordering::Acquire) != epoch {
            return false;
        }

        self.store
            .lock()
            .await
            .gui_state_mut()
            .mark_clean_if_unchanged(generation);
        true
    }

    fn fail_round(&self, err: SyncError) -> SyncError {
        warn!("Sync round failed: {}", err);
        self.last_round_failed.store(true, Ordering::Release);
        self.emit(SyncEvent::Error(err.to_string()));
        err
    }
}
