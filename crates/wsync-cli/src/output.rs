//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde_json::json;

use wsync_core::sync::{Delivery, RoundOutcome, SkipReason, SyncEvent};
use wsync_core::WorkspaceStore;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print the workspace tree with unsaved markers
    pub fn print_workspaces(&self, store: &WorkspaceStore) {
        match self.format {
            OutputFormat::Human => {
                if store.workspaces().is_empty() {
                    println!("No workspaces.");
                    return;
                }
                for ws in store.workspaces() {
                    let current = if store.current_workspace() == Some(ws.id) {
                        "*"
                    } else {
                        " "
                    };
                    println!(
                        "{} {:>6} | {}{}",
                        current,
                        ws.id,
                        truncate(&ws.name, 40),
                        dirty_marker(ws.is_saved())
                    );
                    for file in ws.files() {
                        println!(
                            "  {:>6} | {} (v{}){}",
                            file.id,
                            truncate(&file.name, 38),
                            file.remote_version(),
                            dirty_marker(file.is_saved())
                        );
                    }
                }
            }
            OutputFormat::Json => {
                let workspaces: Vec<_> = store
                    .workspaces()
                    .iter()
                    .map(|ws| {
                        json!({
                            "id": ws.id,
                            "name": ws.name,
                            "saved": ws.is_saved(),
                            "files": ws.files().iter().map(|f| json!({
                                "id": f.id,
                                "name": f.name,
                                "version": f.remote_version(),
                                "saved": f.is_saved(),
                            })).collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                println!("{}", json!({ "workspaces": workspaces }));
            }
            OutputFormat::Quiet => {
                for ws in store.workspaces() {
                    println!("{}", ws.id);
                }
            }
        }
    }

    /// Print the result of a sync round
    pub fn print_round(&self, outcome: &RoundOutcome) {
        match self.format {
            OutputFormat::Human => println!("{}", describe_round(outcome)),
            OutputFormat::Json => {
                let value = match outcome {
                    RoundOutcome::Skipped(reason) => json!({
                        "status": "skipped",
                        "reason": format!("{:?}", reason),
                    }),
                    RoundOutcome::Completed(summary) => json!({
                        "status": "completed",
                        "delivery": format!("{:?}", summary.delivery),
                        "workspaces_sent": summary.workspaces_sent,
                        "files_sent": summary.files_sent,
                        "gui_state_sent": summary.gui_state_sent,
                    }),
                };
                println!("{}", value);
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an event raised by the sync client
    pub fn print_event(&self, event: &SyncEvent) {
        match self.format {
            OutputFormat::Human => {
                if let Some(line) = describe_event(event) {
                    println!("{}", line);
                }
            }
            OutputFormat::Json => {
                if let Some(line) = describe_event(event) {
                    println!("{}", json!({ "event": line }));
                }
            }
            OutputFormat::Quiet => {
                if let SyncEvent::Error(message) = event {
                    eprintln!("{}", message);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!("{}", json!({"status": "success", "message": message}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn dirty_marker(saved: bool) -> &'static str {
    if saved {
        ""
    } else {
        " [unsaved]"
    }
}

/// One-line summary of a round
fn describe_round(outcome: &RoundOutcome) -> String {
    match outcome {
        RoundOutcome::Skipped(SkipReason::SessionGate) => {
            "Sync skipped: no user (or test session)".to_string()
        }
        RoundOutcome::Skipped(SkipReason::RoundInFlight) => {
            "Sync skipped: another round is running".to_string()
        }
        RoundOutcome::Skipped(SkipReason::Stale) => "Sync stopped before the answer".to_string(),
        RoundOutcome::Completed(summary) => match summary.delivery {
            Delivery::NotNeeded => "Already up to date".to_string(),
            Delivery::Acknowledged => format!(
                "Synced {} workspace(s), {} file(s)",
                summary.workspaces_sent, summary.files_sent
            ),
            Delivery::Beacon => format!(
                "Handed {} workspace(s), {} file(s) to the beacon",
                summary.workspaces_sent, summary.files_sent
            ),
        },
    }
}

/// User-facing text for an event; housekeeping events have none
fn describe_event(event: &SyncEvent) -> Option<String> {
    match event {
        SyncEvent::WorkspaceAdded { id, name } => {
            Some(format!("+ workspace {} ({})", truncate(name, 40), id))
        }
        SyncEvent::FileAdded { file_id, name, .. } => {
            Some(format!("+ file {} ({})", truncate(name, 40), file_id))
        }
        SyncEvent::FileRemoved { file_id, .. } => Some(format!("- file {}", file_id)),
        SyncEvent::FileContentReplaced { file_id } => {
            Some(format!("~ file {} updated from server", file_id))
        }
        SyncEvent::NewWorkspacesReceived(names) => {
            Some(format!("New workspaces shared with you: {}", names.join(", ")))
        }
        SyncEvent::Error(message) => Some(format!("⚠ {}", message)),
        SyncEvent::ResortRequested => None,
    }
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
