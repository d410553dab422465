// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) carrying every
// static knob of the orchestration core:
// - selection weights and thresholds
// - security scanner thresholds, weights and extra patterns
// - semantic cache sizing and similarity
// - performance ledger window and reference latency
// - supervisor limits and timeouts
// - tool bindings (which handler backs which tool)
// - agent profiles and prompt templates
// - text completion provider, audit and envelope signing

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::agent::{AgentId, AgentProfile};
use crate::domain::llm::GenerationOptions;
use crate::domain::security::{Severity, ThreatCategory};
use crate::domain::tool::ToolCategory;
use crate::domain::tuning::{LedgerTuning, SelectionTuning};

pub const API_VERSION: &str = "switchyard/v1";
pub const KIND: &str = "OrchestratorConfig";

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfigManifest {
    /// API version (must be "switchyard/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "OrchestratorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: OrchestratorConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfigSpec {
    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub envelope: EnvelopeConfig,
}

// ----------------------------------------------------------------------------
// Selection
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(flatten)]
    pub tuning: SelectionTuning,

    /// Seeded score jitter for exploration. Absent means fully deterministic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploration: Option<ExplorationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationConfig {
    /// Maximum absolute jitter added to a candidate's score.
    pub amplitude: f64,
    pub seed: u64,
}

// ----------------------------------------------------------------------------
// Security
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_block_threshold")]
    pub block_threshold: f64,

    #[serde(default = "default_monitor_threshold")]
    pub monitor_threshold: f64,

    #[serde(default)]
    pub weights: CategoryWeights,

    #[serde(default = "default_true")]
    pub builtin_patterns: bool,

    /// Extra content patterns on top of the built-in catalogue.
    #[serde(default)]
    pub patterns: Vec<PatternConfig>,

    /// Patterns matched against target agent ids and tool names.
    #[serde(default = "default_sensitive_targets")]
    pub sensitive_targets: Vec<PatternConfig>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            block_threshold: default_block_threshold(),
            monitor_threshold: default_monitor_threshold(),
            weights: CategoryWeights::default(),
            builtin_patterns: true,
            patterns: Vec::new(),
            sensitive_targets: default_sensitive_targets(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryWeights {
    pub privilege_escalation: f64,
    pub code_injection: f64,
    pub sensitive_data_exposure: f64,
    pub integrity_only: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            privilege_escalation: 1.0,
            code_injection: 0.8,
            sensitive_data_exposure: 0.5,
            integrity_only: 0.1,
        }
    }
}

impl CategoryWeights {
    pub fn weight(&self, category: ThreatCategory) -> f64 {
        match category {
            ThreatCategory::PrivilegeEscalation => self.privilege_escalation,
            ThreatCategory::CodeInjection => self.code_injection,
            ThreatCategory::SensitiveDataExposure => self.sensitive_data_exposure,
            ThreatCategory::IntegrityOnly => self.integrity_only,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    pub category: ThreatCategory,
    pub severity: Severity,
    /// Regular expression (Rust `regex` syntax).
    pub pattern: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ----------------------------------------------------------------------------
// Cache
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    #[default]
    Fifo,
    Lru,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityKind {
    #[default]
    TokenSet,
    TrigramCosine,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default)]
    pub eviction: EvictionPolicy,

    #[serde(default)]
    pub similarity: SimilarityKind,

    /// Entries older than this are treated as misses and dropped.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_cache_capacity(),
            similarity_threshold: default_similarity_threshold(),
            eviction: EvictionPolicy::Fifo,
            similarity: SimilarityKind::TokenSet,
            ttl: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Ledger
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(flatten)]
    pub tuning: LedgerTuning,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            tuning: LedgerTuning::default(),
        }
    }
}

// ----------------------------------------------------------------------------
// Supervisor
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Agent-requested delegations followed before forcing degraded aggregation.
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,

    #[serde(default = "default_agent_timeout", with = "humantime_serde")]
    pub agent_timeout: Duration,

    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Retry once with the next-ranked supporting agent after an agent failure.
    #[serde(default = "default_true")]
    pub retry_with_supporting_agent: bool,

    #[serde(default = "default_true")]
    pub auto_apply_improvements: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            agent_timeout: default_agent_timeout(),
            request_timeout: default_request_timeout(),
            context_window: default_context_window(),
            retry_with_supporting_agent: true,
            auto_apply_improvements: true,
        }
    }
}

// ----------------------------------------------------------------------------
// Tools
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_tool_timeout", with = "humantime_serde")]
    pub default_timeout: Duration,

    #[serde(default)]
    pub bindings: Vec<ToolBinding>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_tool_timeout(),
            bindings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolBinding {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub category: ToolCategory,

    /// JSON Schema for arguments; defaults to `{"type": "object"}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,

    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    pub handler: HandlerConfig,
}

/// Which adapter backs a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerConfig {
    /// Deterministic handler for tests and dry runs.
    Stub {
        #[serde(default)]
        response: Value,
        #[serde(default)]
        echo_args: bool,
        #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
        delay: Option<Duration>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fail_with: Option<String>,
    },
    /// POSTs the JSON arguments to `url` and returns the JSON body.
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

// ----------------------------------------------------------------------------
// Agents
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(flatten)]
    pub profile: AgentProfile,

    /// Handlebars template for the agent's prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,

    /// Tools called, in order, before the prompt is rendered.
    #[serde(default)]
    pub tool_plan: Vec<ToolStep>,

    /// Hand off to this agent once after answering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_to: Option<AgentId>,

    #[serde(default)]
    pub generation: GenerationOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStep {
    pub tool: String,

    #[serde(default = "empty_object")]
    pub arguments: Value,

    /// Insert the task text under `"task"` in the arguments.
    #[serde(default)]
    pub include_task: bool,
}

// ----------------------------------------------------------------------------
// Text generation, audit, envelope
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProviderConfig,

    #[serde(default = "default_generation_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderConfig::default(),
            timeout: default_generation_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmProviderConfig {
    /// Deterministic provider; echoes the prompt when `response` is absent.
    Static {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<String>,
    },
    /// OpenAI-compatible chat completions endpoint.
    Openai {
        endpoint: String,
        model: String,
        /// Environment variable holding the API key.
        #[serde(default = "default_openai_key_env")]
        api_key_env: String,
    },
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        LlmProviderConfig::Static { response: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_key_env")]
    pub signing_key_env: String,

    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            signing_key_env: default_audit_key_env(),
            stream_capacity: default_stream_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    #[serde(default = "default_envelope_key_env")]
    pub signing_key_env: String,

    #[serde(default = "default_clock_skew", with = "humantime_serde")]
    pub max_clock_skew: Duration,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            signing_key_env: default_envelope_key_env(),
            max_clock_skew: default_clock_skew(),
        }
    }
}

// ----------------------------------------------------------------------------
// Defaults
// ----------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_block_threshold() -> f64 {
    0.7
}

fn default_monitor_threshold() -> f64 {
    0.3
}

fn default_sensitive_targets() -> Vec<PatternConfig> {
    vec![PatternConfig {
        category: ThreatCategory::PrivilegeEscalation,
        severity: Severity::Medium,
        pattern: r"(?i)^(shell|exec|system|sudo)([_.-]|$)".to_string(),
        description: Some("privileged execution target".to_string()),
    }]
}

fn default_cache_capacity() -> usize {
    256
}

fn default_similarity_threshold() -> f64 {
    0.9
}

fn default_window_size() -> usize {
    100
}

fn default_max_hops() -> u32 {
    20
}

fn default_agent_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_context_window() -> usize {
    20
}

fn default_tool_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_generation_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_audit_key_env() -> String {
    "SWITCHYARD_AUDIT_KEY".to_string()
}

fn default_envelope_key_env() -> String {
    "SWITCHYARD_ENVELOPE_KEY".to_string()
}

fn default_stream_capacity() -> usize {
    1024
}

fn default_clock_skew() -> Duration {
    Duration::from_secs(300)
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl Default for OrchestratorConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "switchyard".to_string(),
                version: None,
                labels: None,
            },
            spec: OrchestratorConfigSpec::default(),
        }
    }
}

impl OrchestratorConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SWITCHYARD_CONFIG_PATH environment variable
    /// 2. ./switchyard.yaml (working directory)
    /// 3. ~/.switchyard/config.yaml (user home)
    /// 4. /etc/switchyard/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SWITCHYARD_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./switchyard.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".switchyard").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/switchyard/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // An explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(&config_path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", config_path, e))?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SWITCHYARD_MAX_HOPS") {
            match val.trim().parse::<u32>() {
                Ok(hops) => {
                    tracing::info!("Environment override: SWITCHYARD_MAX_HOPS={}", hops);
                    self.spec.supervisor.max_hops = hops;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for SWITCHYARD_MAX_HOPS: '{}'. Expected an integer. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("SWITCHYARD_CACHE_ENABLED") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: SWITCHYARD_CACHE_ENABLED=true");
                    self.spec.cache.enabled = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: SWITCHYARD_CACHE_ENABLED=false");
                    self.spec.cache.enabled = false;
                }
                _ => tracing::warn!(
                    "Invalid value for SWITCHYARD_CACHE_ENABLED: '{}'. Expected true/false. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("SWITCHYARD_BLOCK_THRESHOLD") {
            match val.trim().parse::<f64>() {
                Ok(threshold) => {
                    tracing::info!(
                        "Environment override: SWITCHYARD_BLOCK_THRESHOLD={}",
                        threshold
                    );
                    self.spec.security.block_threshold = threshold;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for SWITCHYARD_BLOCK_THRESHOLD: '{}'. Expected a number. Ignoring.",
                    val
                ),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let selection = &self.spec.selection.tuning;
        let weights = [
            ("selection.weights.capability", selection.weights.capability),
            ("selection.weights.performance", selection.weights.performance),
            ("selection.weights.load", selection.weights.load),
            ("selection.confidence.pool", selection.confidence.pool),
            ("selection.confidence.complexity", selection.confidence.complexity),
            ("selection.confidence.availability", selection.confidence.availability),
            ("selection.capability_floor", selection.capability_floor),
            ("selection.low_confidence_floor", selection.low_confidence_floor),
            ("cache.similarity_threshold", self.spec.cache.similarity_threshold),
            ("security.block_threshold", self.spec.security.block_threshold),
            ("security.monitor_threshold", self.spec.security.monitor_threshold),
            ("ledger.success_weight", self.spec.ledger.tuning.success_weight),
            ("ledger.cold_start_score", self.spec.ledger.tuning.cold_start_score),
        ];
        for (name, value) in weights {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, value);
            }
        }

        if selection.weights.sum() <= 0.0 {
            anyhow::bail!("selection.weights must not all be zero");
        }
        if selection.confidence.sum() <= 0.0 {
            anyhow::bail!("selection.confidence weights must not all be zero");
        }
        if selection.pool_saturation == 0 {
            anyhow::bail!("selection.pool_saturation must be at least 1");
        }

        let weights = &self.spec.security.weights;
        for value in [
            weights.privilege_escalation,
            weights.code_injection,
            weights.sensitive_data_exposure,
            weights.integrity_only,
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("security.weights entries must be within [0, 1], got {}", value);
            }
        }

        if self.spec.security.monitor_threshold >= self.spec.security.block_threshold {
            anyhow::bail!(
                "security.monitor_threshold ({}) must be below security.block_threshold ({})",
                self.spec.security.monitor_threshold,
                self.spec.security.block_threshold
            );
        }

        if let Some(exploration) = &self.spec.selection.exploration {
            if !(0.0..=1.0).contains(&exploration.amplitude) {
                anyhow::bail!("selection.exploration.amplitude must be within [0, 1]");
            }
        }

        if self.spec.cache.capacity == 0 {
            anyhow::bail!("cache.capacity must be at least 1");
        }
        if self.spec.ledger.window_size == 0 {
            anyhow::bail!("ledger.window_size must be at least 1");
        }
        if self.spec.ledger.tuning.reference_latency_ms <= 0.0 {
            anyhow::bail!("ledger.reference_latency_ms must be positive");
        }
        if self.spec.supervisor.max_hops == 0 {
            anyhow::bail!("supervisor.max_hops must be at least 1");
        }
        if self.spec.supervisor.context_window == 0 {
            anyhow::bail!("supervisor.context_window must be at least 1");
        }
        if self.spec.audit.stream_capacity == 0 {
            anyhow::bail!("audit.stream_capacity must be at least 1");
        }

        let mut tool_names = HashSet::new();
        for binding in &self.spec.tools.bindings {
            if binding.name.is_empty() {
                anyhow::bail!("Tool binding name cannot be empty");
            }
            if !tool_names.insert(binding.name.as_str()) {
                anyhow::bail!("Duplicate tool binding: {}", binding.name);
            }
            if let HandlerConfig::Http { url, .. } = &binding.handler {
                if url.is_empty() {
                    anyhow::bail!("HTTP handler url cannot be empty for tool: {}", binding.name);
                }
            }
        }

        let mut agent_ids = HashSet::new();
        for agent in &self.spec.agents {
            if agent.profile.id.as_str().is_empty() {
                anyhow::bail!("Agent id cannot be empty");
            }
            if !agent_ids.insert(agent.profile.id.clone()) {
                anyhow::bail!("Duplicate agent id: {}", agent.profile.id);
            }
            for tool in &agent.profile.allowed_tools {
                if !tool_names.contains(tool.as_str()) {
                    // Unknown names are skipped at lookup time, never granted.
                    tracing::warn!(
                        agent_id = %agent.profile.id,
                        tool = %tool,
                        "Agent allows a tool with no binding; it will be skipped"
                    );
                }
            }
        }

        for agent in &self.spec.agents {
            if let Some(target) = &agent.delegate_to {
                if !agent_ids.contains(target) {
                    anyhow::bail!(
                        "Agent '{}' delegates to unknown agent '{}'",
                        agent.profile.id,
                        target
                    );
                }
            }
        }

        if let LlmProviderConfig::Openai { endpoint, model, .. } = &self.spec.llm.provider {
            if endpoint.is_empty() {
                anyhow::bail!("llm.provider.endpoint cannot be empty");
            }
            if model.is_empty() {
                anyhow::bail!("llm.provider.model cannot be empty");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
apiVersion: switchyard/v1
kind: OrchestratorConfig
metadata:
  name: test-node
spec:
  selection:
    max_supporting_agents: 2
    weights:
      capability: 0.6
      performance: 0.2
      load: 0.2
  cache:
    capacity: 16
    eviction: lru
    similarity: trigram_cosine
    ttl: 10m
  supervisor:
    max_hops: 5
    agent_timeout: 15s
  tools:
    default_timeout: 2s
    bindings:
      - name: web_search
        category: search
        handler:
          type: stub
          response: { results: [] }
      - name: send_email
        category: communication
        timeout: 500ms
        handler:
          type: http
          url: http://localhost:9000/email
  agents:
    - id: researcher
      capabilities: [market research, web search]
      allowed_tools: [web_search]
      tool_plan:
        - tool: web_search
          include_task: true
    - id: writer
      capabilities: [copywriting]
      allowed_tools: [send_email]
  llm:
    timeout: 5s
    provider:
      type: static
      response: "ok"
"#;

    #[test]
    fn test_default_manifest_is_valid() {
        let manifest = OrchestratorConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.spec.supervisor.max_hops, 20);
        assert_eq!(manifest.spec.cache.similarity_threshold, 0.9);
        assert_eq!(manifest.spec.security.block_threshold, 0.7);
    }

    #[test]
    fn test_parse_sample_manifest() {
        let manifest = OrchestratorConfigManifest::from_yaml_str(SAMPLE).unwrap();
        manifest.validate().unwrap();

        assert_eq!(manifest.spec.selection.tuning.max_supporting_agents, 2);
        assert_eq!(manifest.spec.selection.tuning.weights.capability, 0.6);
        assert_eq!(manifest.spec.cache.eviction, EvictionPolicy::Lru);
        assert_eq!(manifest.spec.cache.similarity, SimilarityKind::TrigramCosine);
        assert_eq!(manifest.spec.cache.ttl, Some(Duration::from_secs(600)));
        assert_eq!(manifest.spec.supervisor.agent_timeout, Duration::from_secs(15));
        assert_eq!(manifest.spec.tools.bindings.len(), 2);
        assert_eq!(
            manifest.spec.tools.bindings[1].timeout,
            Some(Duration::from_millis(500))
        );
        assert!(matches!(
            manifest.spec.tools.bindings[0].handler,
            HandlerConfig::Stub { .. }
        ));
        assert_eq!(manifest.spec.agents[0].profile.id.as_str(), "researcher");
        assert!(manifest.spec.agents[0].tool_plan[0].include_task);
        assert_eq!(manifest.spec.llm.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut manifest = OrchestratorConfigManifest::default();
        manifest.spec.security.monitor_threshold = 0.8;
        assert!(manifest.validate().is_err());

        let mut manifest = OrchestratorConfigManifest::default();
        manifest.spec.selection.tuning.weights.capability = 1.5;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut manifest = OrchestratorConfigManifest::from_yaml_str(SAMPLE).unwrap();
        let dup = manifest.spec.agents[0].clone();
        manifest.spec.agents.push(dup);
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate agent id"));

        let mut manifest = OrchestratorConfigManifest::from_yaml_str(SAMPLE).unwrap();
        let dup = manifest.spec.tools.bindings[0].clone();
        manifest.spec.tools.bindings.push(dup);
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_unknown_allowed_tool_is_not_fatal() {
        let mut manifest = OrchestratorConfigManifest::from_yaml_str(SAMPLE).unwrap();
        manifest.spec.agents[0]
            .profile
            .allowed_tools
            .push("does_not_exist".to_string());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_kind() {
        let mut manifest = OrchestratorConfigManifest::default();
        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchyard.yaml");
        let manifest = OrchestratorConfigManifest::from_yaml_str(SAMPLE).unwrap();
        manifest.to_yaml_file(&path).unwrap();

        let loaded = OrchestratorConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "test-node");
        assert_eq!(loaded.spec.agents.len(), 2);
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(OrchestratorConfigManifest::load_or_default(Some(missing)).is_err());
    }
}
