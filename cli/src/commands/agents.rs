// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! List configured agents with their capabilities, tools and health.

use anyhow::Result;
use colored::Colorize;
use std::collections::HashSet;
use std::path::PathBuf;

use super::{build_orchestrator, load_config};

pub async fn handle_command(config_path: Option<PathBuf>) -> Result<()> {
    let orchestrator = build_orchestrator(load_config(config_path)?)?;
    let health: HashSet<_> = orchestrator
        .check_agent_health()
        .await
        .into_iter()
        .filter(|(_, healthy)| *healthy)
        .map(|(id, _)| id)
        .collect();

    if orchestrator.directory().is_empty() {
        println!("{}", "No agents configured".yellow());
        return Ok(());
    }

    println!("{} agents:", orchestrator.directory().len());
    for id in orchestrator.directory().ids() {
        let Some(profile) = orchestrator.directory().profile(&id) else {
            continue;
        };
        let status = if health.contains(&id) {
            "healthy".green()
        } else {
            "unavailable".red()
        };
        println!("  {} [{}]", id.as_str().bold(), status);
        if !profile.description.is_empty() {
            println!("    {}", profile.description.dimmed());
        }
        println!("    Capabilities: {}", profile.capabilities.join(", "));
        let tools = orchestrator.registry().get_tools_for_agent(&id);
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        let tools = if names.is_empty() {
            "(none)".to_string()
        } else {
            names.join(", ")
        };
        println!("    Tools: {}", tools);
    }

    orchestrator.shutdown();
    Ok(())
}
