//! Watch command handler
//!
//! Runs the scheduler (and the push listener, when a push URL is set) until
//! Ctrl-C, then flushes pending changes through the beacon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use wsync_core::sync::{spawn_push_listener, PushConfig, SchedulerPhase, SyncClient, SyncScheduler};
use wsync_core::{Config, Session, SharedStore, SnapshotFile};

use super::sync::transport;
use crate::output::Output;

/// Sync until interrupted
pub async fn watch(config: &Config, session: Session, output: &Output) -> Result<()> {
    if !session.is_active() {
        output.message("No user given (--user); the scheduler will stay idle.");
    }

    let snapshot = SnapshotFile::from_config(config);
    let store = snapshot.load_or_default()?.into_shared();

    let client = Arc::new(SyncClient::new(
        Arc::new(transport(config)?),
        Arc::clone(&store),
        session,
    ));
    let mut events = client
        .take_events()
        .context("Sync events already consumed")?;

    let mut scheduler = SyncScheduler::new(Arc::clone(&client), config.scheduler_settings());
    let mut phase = scheduler.subscribe_phase();
    scheduler.start();

    let push = config
        .push_url
        .as_ref()
        .map(|url| spawn_push_listener(PushConfig::new(url.clone()), scheduler.commands()));

    output.message("Watching for changes. Press Ctrl-C to stop.");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }

            Some(event) = events.recv() => output.print_event(&event),

            changed = phase.changed() => {
                if changed.is_err() {
                    break;
                }
                // A round just finished
                let current = *phase.borrow_and_update();
                if current == SchedulerPhase::Waiting {
                    save_quietly(&snapshot, &store).await;
                }
            }
        }
    }

    output.message("Stopping...");
    if let Some(push) = push {
        push.shutdown().await;
    }

    let outcome = scheduler.shutdown(true).await;
    while let Ok(event) = events.try_recv() {
        output.print_event(&event);
    }

    // The beacon leaves everything dirty; the next run resends it.
    snapshot.save(&*store.lock().await)?;

    if let Some(outcome) = outcome? {
        output.print_round(&outcome);
    }
    Ok(())
}

async fn save_quietly(snapshot: &SnapshotFile, store: &SharedStore) {
    if let Err(e) = snapshot.save(&*store.lock().await) {
        warn!("Failed to save snapshot: {:#}", e);
    }
}
