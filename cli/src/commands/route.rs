// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Route one request through an in-process orchestrator.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;

use switchyard_core::application::{OrchestrationResponse, Orchestrator, ResponseStatus};
use switchyard_core::domain::execution::{OrchestrationRequest, Task};

use super::{build_orchestrator, load_config};

#[derive(Args, Debug)]
pub struct RouteArgs {
    /// Request text
    #[arg(value_name = "TEXT", required_unless_present = "envelope", conflicts_with = "envelope")]
    pub text: Option<String>,

    /// Signed envelope (JSON file) to verify and route instead of TEXT
    #[arg(long, value_name = "FILE")]
    pub envelope: Option<PathBuf>,

    /// Requesting user
    #[arg(short, long, default_value = "cli")]
    pub user: String,

    /// Task type used to key performance statistics
    #[arg(long)]
    pub task_type: Option<String>,

    /// Capability the handling agent must declare (repeatable)
    #[arg(long, value_name = "CAPABILITY")]
    pub require: Vec<String>,

    /// Structured payload (JSON string or @file.json)
    #[arg(short, long, value_name = "JSON")]
    pub payload: Option<String>,

    /// Declare the task multi-step
    #[arg(long)]
    pub multi_step: bool,

    /// Declare the task sequential (pipeline coordination)
    #[arg(long)]
    pub sequential: bool,

    /// Declare the task parallelizable (scatter-gather coordination)
    #[arg(long)]
    pub parallelizable: bool,

    /// Print the request's audit trail
    #[arg(long)]
    pub show_audit: bool,

    /// Print the full response as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the metrics recorded while routing (Prometheus text format)
    #[arg(long)]
    pub show_metrics: bool,
}

pub async fn handle_command(args: RouteArgs, config_path: Option<PathBuf>) -> Result<()> {
    let metrics = if args.show_metrics {
        Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("Failed to install metrics recorder")?,
        )
    } else {
        None
    };

    let orchestrator = build_orchestrator(load_config(config_path)?)?;

    let response = match &args.envelope {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read envelope {:?}", path))?;
            orchestrator
                .handle_envelope(&raw)
                .await
                .context("Envelope rejected")?
        }
        None => {
            let request = OrchestrationRequest::new(args.user.clone(), build_task(&args)?);
            orchestrator.handle(request).await
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    if args.show_audit {
        print_audit(&orchestrator, &response);
    }
    if let Some(handle) = metrics {
        println!();
        println!("{}", "Metrics".bold());
        print!("{}", handle.render());
    }

    orchestrator.shutdown();
    Ok(())
}

pub fn build_task(args: &RouteArgs) -> Result<Task> {
    let text = args.text.clone().unwrap_or_default();
    let mut task = Task::new(text);
    task.task_type = args.task_type.clone();
    task.required_capabilities = args.require.clone();
    task.multi_step = args.multi_step;
    task.sequential = args.sequential;
    task.parallelizable = args.parallelizable;
    if let Some(payload) = &args.payload {
        task.payload = parse_payload(payload)?;
    }
    Ok(task)
}

/// Inline JSON, or `@path` to read JSON from a file.
pub fn parse_payload(input: &str) -> Result<serde_json::Value> {
    let raw = match input.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload file {}", path))?,
        None => input.to_string(),
    };
    serde_json::from_str(&raw).context("Payload is not valid JSON")
}

pub fn format_status(status: ResponseStatus) -> colored::ColoredString {
    match status {
        ResponseStatus::Completed => status.as_str().green(),
        ResponseStatus::Cached => status.as_str().cyan(),
        ResponseStatus::Degraded => status.as_str().yellow(),
        ResponseStatus::Escalated => status.as_str().magenta(),
        ResponseStatus::Failed => status.as_str().red(),
    }
}

fn print_response(response: &OrchestrationResponse) {
    println!("Request {}", response.request_id.to_string().dimmed());
    println!("  Status: {}", format_status(response.status));
    if let Some(decision) = &response.decision {
        println!(
            "  Primary: {} (confidence {:.2}, {})",
            decision.primary_agent.as_str().bold(),
            decision.confidence,
            decision.coordination_mode.as_str()
        );
        if !decision.supporting_agents.is_empty() {
            let supporting: Vec<&str> =
                decision.supporting_agents.iter().map(|a| a.as_str()).collect();
            println!("  Supporting: {}", supporting.join(", "));
        }
    }
    if response.hops > 0 {
        println!("  Hops: {}", response.hops);
    }
    if response.monitored {
        println!("  {} (risk {:.2})", "Monitored".yellow(), response.risk_score);
    }
    if let Some(error) = &response.error {
        println!("  Error: {} {}", error.kind.red(), error.message);
    }
    println!();
    println!("{}", response.rendered);
}

fn print_audit(orchestrator: &Orchestrator, response: &OrchestrationResponse) {
    let entries = orchestrator.audit().entries_for(response.request_id);
    println!();
    println!("{} ({} entries)", "Audit trail".bold(), entries.len());
    for entry in entries {
        let verified = if orchestrator.audit().verify(&entry) {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {} #{:<4} {:<20} {}",
            verified,
            entry.sequence,
            entry.event_type.as_str(),
            entry.payload
        );
    }
}
