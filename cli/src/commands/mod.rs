// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Switchyard CLI

pub mod agents;
pub mod config;
pub mod route;

pub use self::config::ConfigCommand;
pub use self::route::RouteArgs;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use switchyard_core::application::Orchestrator;
use switchyard_core::domain::orchestrator_config::OrchestratorConfigManifest;
use switchyard_swarm::SwarmSelector;

/// Discover, load and validate the manifest.
pub fn load_config(config_path: Option<PathBuf>) -> Result<OrchestratorConfigManifest> {
    let config = OrchestratorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

/// Wire the orchestrator with the swarm selector.
pub fn build_orchestrator(config: OrchestratorConfigManifest) -> Result<Orchestrator> {
    Orchestrator::from_config(config, |tuning, selection| {
        Arc::new(SwarmSelector::from_config(tuning, selection))
    })
    .context("Failed to build orchestrator")
}
