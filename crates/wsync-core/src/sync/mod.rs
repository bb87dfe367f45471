//! Sync engine for the workspace server
//!
//! Keeps the local [`WorkspaceStore`](crate::store::WorkspaceStore) and the
//! server in step.
//!
//! ## Round
//!
//! 1. Check the session gate
//! 2. Send the GUI state if it changed
//! 3. Collect unsaved workspaces and files into one `sendUpdates` request
//! 4. Post it (or hand it to the beacon at shutdown)
//! 5. Mark acknowledged items saved, merge the returned snapshot
//!
//! ## Usage
//!
//! ```ignore
//! let transport = Arc::new(HttpTransport::from_config(&config)?);
//! let client = Arc::new(SyncClient::new(transport, store, session));
//! let mut scheduler = SyncScheduler::new(client, config.scheduler_settings());
//! scheduler.start();
//! ```

mod client;
mod entities;
mod error;
mod http;
pub mod message;
mod push;
mod reconcile;
mod scheduler;
mod state;
mod tracker;
mod transport;

pub use client::{
    Delivery, RoundOptions, RoundOutcome, RoundSummary, SkipReason, SyncClient, SyncEvent,
};
pub use error::{SyncError, SyncResult, TransportError};
pub use http::{HttpTransport, CSRF_HEADER};
pub use push::{spawn_push_listener, ConnectionStatus, PushConfig, PushListenerHandle, PushMessage};
pub use reconcile::{apply_forced_updates, reconcile, ReconcileReport};
pub use scheduler::{
    NoTelemetry, SchedulerCommand, SchedulerPhase, SyncIndicator, SyncScheduler, Telemetry,
};
pub use state::{
    SchedulerSettings, SchedulerState, TickDecision, DEFAULT_FORCED_UPDATE_EVERY,
    DEFAULT_UPDATE_FREQUENCY_SECS, ELEVATED_UPDATE_FREQUENCY_SECS, FORCED_BACKOFF_FACTOR,
    FORCED_STREAK_LIMIT,
};
pub use tracker::{collect_dirty, snapshot_gui_state, BatchSnapshot, PendingBatch};
pub use transport::{Endpoint, MockTransport, RecordedRequest, Transport};
