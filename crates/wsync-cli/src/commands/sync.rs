//! Sync command handler

use std::sync::Arc;

use anyhow::{bail, Result};

use wsync_core::sync::{HttpTransport, RoundOptions, SyncClient, SyncEvent};
use wsync_core::{Config, Session, SnapshotFile};

use crate::output::Output;

/// Build the HTTP transport, or explain how to configure it
pub fn transport(config: &Config) -> Result<HttpTransport> {
    if config.server_url.is_none() {
        bail!(
            "Server URL not configured. Set it with:\n  \
             wsync config set server_url https://your-server"
        );
    }
    HttpTransport::from_config(config)
}

/// Run one round against the server
///
/// The local snapshot is written back whatever the outcome, so edits the
/// server did not acknowledge stay unsaved for the next run.
pub async fn sync(config: &Config, session: Session, force: bool, output: &Output) -> Result<()> {
    let snapshot = SnapshotFile::from_config(config);
    let store = snapshot.load_or_default()?.into_shared();

    let client = SyncClient::new(Arc::new(transport(config)?), Arc::clone(&store), session);
    let mut events = client.take_events();

    output.message("Syncing...");
    let result = client
        .run_round(RoundOptions {
            force_even_if_clean: force,
            notify_new_workspaces: true,
            use_beacon: false,
        })
        .await;

    if let Some(ref mut events) = events {
        while let Ok(event) = events.try_recv() {
            // Failures are reported through the returned error
            if !matches!(event, SyncEvent::Error(_)) {
                output.print_event(&event);
            }
        }
    }

    snapshot.save(&*store.lock().await)?;

    let outcome = result?;
    output.print_round(&outcome);
    Ok(())
}
