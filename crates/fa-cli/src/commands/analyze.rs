//! Analyze command: submit a photo and follow the session to the end

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use fa_core::config::ClientConfig;
use fa_core::CapturedImage;
use fa_orchestrator::{render, ChannelClient, FlowState, HttpJobBackend, MqttTransport, Orchestrator};

use crate::output::{format_composite, format_stages, print_error, print_info, print_success, print_warning};

/// Options for one analysis run
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Photo to submit
    pub image: PathBuf,
    /// Print the final snapshot as JSON instead of tables
    pub json: bool,
    /// Skip the event access check before submitting
    pub skip_event_check: bool,
}

/// Run one analysis. Returns whether it completed.
pub async fn analyze_command(config: &ClientConfig, options: AnalyzeOptions) -> Result<bool> {
    let data = std::fs::read(&options.image)
        .with_context(|| format!("Failed to read image: {:?}", options.image))?;
    let image = CapturedImage::new(data, CapturedImage::content_type_for(&options.image));

    let backend = HttpJobBackend::from_config(config).context("Failed to create HTTP client")?;
    let transport = MqttTransport::new(config.broker.clone(), config.connect_timeout);
    let channel = ChannelClient::from_config(Arc::new(transport), config);
    let orchestrator = Orchestrator::from_config(config, Arc::new(backend), channel);

    if !options.skip_event_check {
        match orchestrator.check_event().await {
            Ok(access) if !access.is_accessible => {
                let reason = access
                    .message
                    .unwrap_or_else(|| "event is closed".to_string());
                print_error(&format!("Event {} is not accepting submissions: {}", config.event_id, reason));
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) => print_warning(&format!("Could not verify event {}: {}", config.event_id, e)),
        }
    }

    let mut updates = orchestrator.subscribe_state();
    let show_progress = !options.json;
    let progress = tokio::spawn(async move {
        let mut last = String::new();
        while updates.changed().await.is_ok() {
            let headline = render(&updates.borrow_and_update()).headline;
            if show_progress && headline != last {
                print_info(&headline);
                last = headline;
            }
        }
    });

    let run = async {
        if let Err(e) = orchestrator.submit(image).await {
            tracing::debug!("Submit returned: {}", e);
        }
        orchestrator.wait_until_settled().await
    };

    let snapshot = tokio::select! {
        snapshot = run => snapshot,
        _ = tokio::signal::ctrl_c() => {
            print_warning("Interrupted, releasing session");
            orchestrator.teardown().await;
            progress.abort();
            return Ok(false);
        }
    };

    orchestrator.teardown().await;
    progress.abort();

    if options.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(snapshot.flow == FlowState::Done);
    }

    let view = render(&snapshot);
    println!("{}", format_stages(&view));

    match (&snapshot.flow, &snapshot.composite) {
        (FlowState::Done, Some(composite)) => {
            print_success(&view.headline);
            println!("{}", format_composite(composite)?);
            Ok(true)
        }
        _ => {
            print_error(
                view.error_text
                    .as_deref()
                    .unwrap_or("Analysis did not complete"),
            );
            Ok(false)
        }
    }
}
