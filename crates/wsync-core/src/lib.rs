//! wsync Core Library
//!
//! This crate keeps a client-held tree of workspaces and files in step with
//! an authoritative server over an intermittent connection.
//!
//! # Architecture
//!
//! - **Store**: in-memory tree with per-entity saved flags and edit
//!   generations, shared with the sync engine
//! - **Sync**: periodic rounds that send dirty entities as one batch and
//!   merge the server's snapshot back in
//!
//! Whole files and workspaces are synchronized with version stamps; there is
//! no character-level merging.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let store = SnapshotFile::from_config(&config).load_or_default()?.into_shared();
//! let transport = Arc::new(HttpTransport::from_config(&config)?);
//! let client = Arc::new(SyncClient::new(transport, store, session));
//!
//! let mut scheduler = SyncScheduler::new(client, config.scheduler_settings());
//! scheduler.start();
//! ```
//!
//! # Modules
//!
//! - `store`: workspace tree (main entry point)
//! - `models`: workspaces, files and GUI state
//! - `session`: who is logged in and whether the network may be used
//! - `sync`: round, reconciliation, scheduler, transport, push listener
//! - `storage`: snapshot file and template cache
//! - `config`: application configuration

pub mod config;
pub mod models;
pub mod session;
pub mod storage;
pub mod store;
pub mod sync;

pub use config::Config;
pub use models::{File, FileId, GuiState, UserId, Workspace, WorkspaceId};
pub use session::{Role, Session, UserSession};
pub use storage::{SnapshotFile, StorageError};
pub use store::{SharedStore, WorkspaceStore};
