//! Status command handler

use anyhow::Result;

use wsync_core::{Config, Session, SnapshotFile};

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(config: &Config, session: &Session, output: &Output) -> Result<()> {
    let snapshot = SnapshotFile::from_config(config);
    let store = snapshot.load_or_default()?;
    let settings = config.scheduler_settings();

    let unsaved_workspaces = store.workspaces().iter().filter(|w| !w.is_saved()).count();
    let unsaved_files = store
        .workspaces()
        .iter()
        .flat_map(|w| w.files())
        .filter(|f| !f.is_saved())
        .count();

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "server_url": config.server_url,
                    "push_url": config.push_url,
                    "session": session_label(session),
                    "sync_period_secs": settings.period_for(session),
                    "snapshot": snapshot.path(),
                    "counts": {
                        "workspaces": store.workspaces().len(),
                        "files": store.file_count(),
                        "unsaved_workspaces": unsaved_workspaces,
                        "unsaved_files": unsaved_files,
                        "gui_state_dirty": store.gui_state().is_dirty()
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", unsaved_workspaces + unsaved_files);
        }
        OutputFormat::Human => {
            println!("wsync Status");
            println!("============");
            println!();
            println!("Server:");
            println!(
                "  URL:     {}",
                config.server_url.as_deref().unwrap_or("(not set)")
            );
            if let Some(ref url) = config.push_url {
                println!("  Push:    {}", url);
            }
            println!("  Session: {}", session_label(session));
            println!("  Period:  {}s", settings.period_for(session));
            println!();
            println!("Storage:");
            println!("  Snapshot: {}", snapshot.path().display());
            println!();
            println!("Contents:");
            println!("  Workspaces: {} ({} unsaved)", store.workspaces().len(), unsaved_workspaces);
            println!("  Files:      {} ({} unsaved)", store.file_count(), unsaved_files);
            if store.gui_state().is_dirty() {
                println!("  GUI state:  unsaved");
            }
            println!();
            output.print_workspaces(&store);
        }
    }

    Ok(())
}

fn session_label(session: &Session) -> String {
    match session {
        Session::NoSession => "none".to_string(),
        Session::Ephemeral(user) => format!("user {} (test session)", user.user_id),
        Session::Authenticated(user) if user.workspaces_owner_id != user.user_id => format!(
            "user {} ({:?}) viewing {}",
            user.user_id, user.role, user.workspaces_owner_id
        ),
        Session::Authenticated(user) => format!("user {} ({:?})", user.user_id, user.role),
    }
}
