//! Config command handlers

use std::path::PathBuf;

use anyhow::{Context, Result};

use wsync_core::Config;

use crate::output::{Output, OutputFormat};

fn or_unset(value: Option<&str>) -> &str {
    value.unwrap_or("(not set)")
}

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "server_url": config.server_url,
                    "push_url": config.push_url,
                    "update_frequency_secs": config.update_frequency_secs,
                    "elevated_update_frequency_secs": config.elevated_update_frequency_secs,
                    "forced_update_every": config.forced_update_every,
                    "request_timeout_secs": config.request_timeout_secs,
                    "csrf_token_set": config.csrf_token.is_some(),
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:                       {}", config.data_dir.display());
            println!(
                "  server_url:                     {}",
                or_unset(config.server_url.as_deref())
            );
            println!(
                "  push_url:                       {}",
                or_unset(config.push_url.as_deref())
            );
            println!(
                "  update_frequency_secs:          {}",
                config.update_frequency_secs
            );
            println!(
                "  elevated_update_frequency_secs: {}",
                config.elevated_update_frequency_secs
            );
            println!(
                "  forced_update_every:            {}",
                config.forced_update_every
            );
            println!(
                "  request_timeout_secs:           {}",
                config.request_timeout_secs
            );
            println!(
                "  csrf_token:                     {}",
                if config.csrf_token.is_some() {
                    "(set)"
                } else {
                    "(not set)"
                }
            );
            println!(
                "  log_file:                       {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    config
        .set_value(&key, &value)
        .with_context(|| format!("Failed to set '{}'", key))?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "csrf_token" { "***" } else { value.as_str() };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}
