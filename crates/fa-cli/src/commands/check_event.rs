//! Event check command

use anyhow::{Context, Result};

use fa_core::config::ClientConfig;
use fa_core::traits::JobBackend;
use fa_orchestrator::HttpJobBackend;

use crate::output::{format_event, print_error, print_success};

/// Ask the backend whether an event accepts submissions.
/// Returns whether the event is open.
pub async fn check_event_command(config: &ClientConfig, event: Option<&str>) -> Result<bool> {
    let event_id = event.unwrap_or(&config.event_id);
    let backend = HttpJobBackend::from_config(config).context("Failed to create HTTP client")?;

    let access = backend
        .check_event(event_id)
        .await
        .with_context(|| format!("Failed to check event {}", event_id))?;

    println!("{}", format_event(event_id, &access));

    if access.is_accessible {
        print_success("Event is accepting submissions");
    } else {
        print_error("Event is not accepting submissions");
    }
    Ok(access.is_accessible)
}
