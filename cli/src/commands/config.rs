// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use switchyard_core::domain::orchestrator_config::{
    HandlerConfig, LlmProviderConfig, OrchestratorConfigManifest,
};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective manifest as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Write the default manifest
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./switchyard.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output } => generate(output),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = OrchestratorConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. SWITCHYARD_CONFIG_PATH: {}",
            std::env::var("SWITCHYARD_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./switchyard.yaml");
        println!("  4. ~/.switchyard/config.yaml");
        println!("  5. /etc/switchyard/config.yaml");
        println!();
    }

    if as_yaml {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    for line in summary(&config) {
        println!("{}", line);
    }
    Ok(())
}

/// Human-readable overview of a manifest, one line per entry.
pub fn summary(config: &OrchestratorConfigManifest) -> Vec<String> {
    let spec = &config.spec;
    let mut lines = vec![
        format!("{} {}", "Manifest:".bold(), config.metadata.name),
        String::new(),
        "Selection:".bold().to_string(),
        format!(
            "  Weights: capability {:.2}, performance {:.2}, load {:.2}",
            spec.selection.tuning.weights.capability,
            spec.selection.tuning.weights.performance,
            spec.selection.tuning.weights.load
        ),
        format!(
            "  Low-confidence floor: {:.2}, capability floor: {:.2}, max supporting: {}",
            spec.selection.tuning.low_confidence_floor,
            spec.selection.tuning.capability_floor,
            spec.selection.tuning.max_supporting_agents
        ),
    ];
    if let Some(exploration) = &spec.selection.exploration {
        lines.push(format!(
            "  Exploration: amplitude {:.2}, seed {}",
            exploration.amplitude, exploration.seed
        ));
    }

    lines.push(String::new());
    lines.push("Safety:".bold().to_string());
    lines.push(format!(
        "  Security: block at {:.2}, monitor at {:.2}",
        spec.security.block_threshold, spec.security.monitor_threshold
    ));
    lines.push(format!(
        "  Cache: {} (capacity {}, similarity {:.2}, {:?}/{:?})",
        if spec.cache.enabled { "enabled" } else { "disabled" },
        spec.cache.capacity,
        spec.cache.similarity_threshold,
        spec.cache.eviction,
        spec.cache.similarity
    ));
    lines.push(format!(
        "  Supervisor: max hops {}, agent timeout {:?}, request timeout {:?}",
        spec.supervisor.max_hops, spec.supervisor.agent_timeout, spec.supervisor.request_timeout
    ));

    lines.push(String::new());
    lines.push(format!("{} {}", "Tools:".bold(), spec.tools.bindings.len()));
    for binding in &spec.tools.bindings {
        let handler = match &binding.handler {
            HandlerConfig::Stub { .. } => "stub".to_string(),
            HandlerConfig::Http { url, .. } => format!("http → {}", url),
        };
        lines.push(format!("  - {} ({})", binding.name, handler));
    }

    lines.push(String::new());
    lines.push(format!("{} {}", "Agents:".bold(), spec.agents.len()));
    for agent in &spec.agents {
        lines.push(format!(
            "  - {} [{}] tools: {}",
            agent.profile.id,
            agent.profile.capabilities.join(", "),
            agent.profile.allowed_tools.join(", ")
        ));
    }

    lines.push(String::new());
    let provider = match &spec.llm.provider {
        LlmProviderConfig::Static { .. } => "static".to_string(),
        LlmProviderConfig::Openai {
            endpoint, model, ..
        } => format!("openai {} @ {}", model, endpoint),
    };
    lines.push(format!("{} {}", "Text generation:".bold(), provider));
    lines
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = OrchestratorConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf) -> Result<()> {
    OrchestratorConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_manifest_round_trips_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchyard.yaml");
        generate(path.clone()).unwrap();

        let loaded = OrchestratorConfigManifest::from_yaml_file(&path).unwrap();
        loaded.validate().unwrap();
        assert!(validate(Some(path)).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(
            &path,
            "apiVersion: other/v1\nkind: OrchestratorConfig\nmetadata:\n  name: x\n",
        )
        .unwrap();
        assert!(validate(Some(path)).is_err());
    }

    #[test]
    fn test_summary_lists_tools_and_agents() {
        let config = OrchestratorConfigManifest::from_yaml_str(
            r#"
apiVersion: switchyard/v1
kind: OrchestratorConfig
metadata:
  name: demo
spec:
  tools:
    bindings:
      - name: web_search
        handler:
          type: http
          url: http://localhost:9000/search
  agents:
    - id: researcher
      capabilities: [research]
      allowed_tools: [web_search]
"#,
        )
        .unwrap();
        let text = summary(&config).join("\n");
        assert!(text.contains("web_search (http → http://localhost:9000/search)"));
        assert!(text.contains("researcher [research] tools: web_search"));
        assert!(text.contains("static"));
    }
}
