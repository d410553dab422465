// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Orchestrator Bootstrap
//!
//! Wires every component of the core out of one [`OrchestratorConfigManifest`]:
//!
//! 1. seed the shared [`TuningHandle`]
//! 2. open the signed audit log and the performance ledger
//! 3. register tools, grant per-agent permissions, freeze the registry
//! 4. build the scanner, cache, completion provider and agents
//! 5. hand everything to the [`Supervisor`]
//!
//! The selection heuristic is supplied by the caller through a factory so
//! this crate does not depend on any particular [`AgentSelector`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::reflection::ReflectionEngine;
use crate::application::supervisor::{OrchestrationResponse, Supervisor, SupervisorComponents};
use crate::domain::agent::{Agent, AgentId, AgentProfile};
use crate::domain::audit::AuditEventType;
use crate::domain::decision::AgentSelector;
use crate::domain::execution::OrchestrationRequest;
use crate::domain::orchestrator_config::{OrchestratorConfigManifest, SelectionConfig};
use crate::domain::supervisor::SupervisorObserver;
use crate::domain::tool::Tool;
use crate::domain::tuning::{ExecutionTuning, Tuning, TuningHandle};
use crate::infrastructure::agent_directory::AgentDirectory;
use crate::infrastructure::agents::TemplatedAgent;
use crate::infrastructure::audit_log::AuditLog;
use crate::infrastructure::envelope::{EnvelopeCodec, EnvelopeError, OrchestrationEnvelope};
use crate::infrastructure::llm::provider_from_config;
use crate::infrastructure::performance_ledger::PerformanceLedger;
use crate::infrastructure::prompt_template_engine::PromptTemplateEngine;
use crate::infrastructure::security_scanner::SecurityScanner;
use crate::infrastructure::semantic_cache::SemanticCache;
use crate::infrastructure::signing::HmacSigner;
use crate::infrastructure::tool_handlers::tool_from_binding;
use crate::infrastructure::tool_registry::ToolRegistry;

/// Collects tools and agents before the registry is frozen.
pub struct OrchestratorBuilder {
    config: OrchestratorConfigManifest,
    tools: Vec<(Tool, Option<Duration>)>,
    agents: Vec<(AgentProfile, Arc<dyn Agent>)>,
    observer: Option<Arc<dyn SupervisorObserver>>,
    audit_signer: Option<HmacSigner>,
    envelope_signer: Option<HmacSigner>,
}

impl OrchestratorBuilder {
    pub fn new(config: OrchestratorConfigManifest) -> Self {
        Self {
            config,
            tools: Vec::new(),
            agents: Vec::new(),
            observer: None,
            audit_signer: None,
            envelope_signer: None,
        }
    }

    pub fn with_tool(mut self, tool: Tool, timeout: Option<Duration>) -> Self {
        self.tools.push((tool, timeout));
        self
    }

    pub fn with_agent(mut self, profile: AgentProfile, agent: Arc<dyn Agent>) -> Self {
        self.agents.push((profile, agent));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SupervisorObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Overrides the key read from the configured environment variable.
    pub fn with_audit_signer(mut self, signer: HmacSigner) -> Self {
        self.audit_signer = Some(signer);
        self
    }

    pub fn with_envelope_signer(mut self, signer: HmacSigner) -> Self {
        self.envelope_signer = Some(signer);
        self
    }

    pub fn build<F>(self, selector_factory: F) -> anyhow::Result<Orchestrator>
    where
        F: FnOnce(TuningHandle, &SelectionConfig) -> Arc<dyn AgentSelector>,
    {
        let spec = &self.config.spec;

        let tuning = TuningHandle::new(Tuning {
            selection: spec.selection.tuning.clone(),
            ledger: spec.ledger.tuning,
            execution: ExecutionTuning {
                default_agent_timeout: spec.supervisor.agent_timeout,
                agent_timeouts: Default::default(),
                context_window: spec.supervisor.context_window,
            },
        });

        let audit_signer = match self.audit_signer {
            Some(signer) => signer,
            None => HmacSigner::from_env_or_ephemeral(&spec.audit.signing_key_env)
                .context("Failed to load the audit signing key")?,
        };
        let envelope_signer = match self.envelope_signer {
            Some(signer) => signer,
            None => HmacSigner::from_env_or_ephemeral(&spec.envelope.signing_key_env)
                .context("Failed to load the envelope signing key")?,
        };

        let audit = Arc::new(AuditLog::new(audit_signer, spec.audit.stream_capacity));
        let ledger = Arc::new(PerformanceLedger::new(spec.ledger.window_size, tuning.clone()));
        let registry = Arc::new(ToolRegistry::new(
            spec.tools.default_timeout,
            ledger.clone(),
            audit.clone(),
        ));

        for (tool, timeout) in self.tools {
            let name = tool.name().to_string();
            registry
                .register_with_timeout(tool, timeout)
                .with_context(|| format!("Failed to register tool '{}'", name))?;
        }

        let directory = Arc::new(AgentDirectory::new());
        for (profile, agent) in self.agents {
            let agent_id = profile.id.clone();
            registry
                .grant(&agent_id, profile.allowed_tools.iter().cloned())
                .with_context(|| format!("Failed to grant tools to agent '{}'", agent_id))?;
            directory
                .register(profile, agent, &ledger)
                .with_context(|| format!("Failed to register agent '{}'", agent_id))?;
        }
        registry.initialize().context("Failed to initialize the tool registry")?;

        let scanner = Arc::new(
            SecurityScanner::from_config(&spec.security)
                .context("Failed to compile security patterns")?,
        );
        let cache = Arc::new(SemanticCache::from_config(&spec.cache));
        let reflection =
            Arc::new(ReflectionEngine::new(ledger.clone(), tuning.clone(), audit.clone()));
        let selector = selector_factory(tuning.clone(), &spec.selection);

        let mut supervisor = Supervisor::new(
            SupervisorComponents {
                registry: registry.clone(),
                scanner,
                cache: cache.clone(),
                ledger: ledger.clone(),
                directory: directory.clone(),
                selector,
                reflection,
                audit: audit.clone(),
                tuning: tuning.clone(),
            },
            spec.supervisor.clone(),
        )?;
        if let Some(observer) = self.observer {
            supervisor = supervisor.with_observer(observer);
        }

        let codec = EnvelopeCodec::new(envelope_signer, spec.envelope.max_clock_skew);

        audit.append(
            AuditEventType::Lifecycle,
            None,
            serde_json::json!({
                "event": "orchestrator_started",
                "name": self.config.metadata.name,
                "agents": directory.ids(),
                "tools": registry.len(),
            }),
        );
        info!(
            name = %self.config.metadata.name,
            agents = directory.len(),
            tools = registry.len(),
            "Orchestrator ready"
        );

        Ok(Orchestrator {
            supervisor,
            registry,
            directory,
            ledger,
            cache,
            audit,
            tuning,
            codec,
            shutdown: CancellationToken::new(),
        })
    }
}

/// A fully wired orchestration core.
pub struct Orchestrator {
    supervisor: Supervisor,
    registry: Arc<ToolRegistry>,
    directory: Arc<AgentDirectory>,
    ledger: Arc<PerformanceLedger>,
    cache: Arc<SemanticCache>,
    audit: Arc<AuditLog>,
    tuning: TuningHandle,
    codec: EnvelopeCodec,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Build from configuration: tool bindings become registry entries and
    /// agent configs become [`TemplatedAgent`]s sharing one completion provider.
    pub fn from_config<F>(
        config: OrchestratorConfigManifest,
        selector_factory: F,
    ) -> anyhow::Result<Self>
    where
        F: FnOnce(TuningHandle, &SelectionConfig) -> Arc<dyn AgentSelector>,
    {
        config.validate()?;

        let provider = provider_from_config(&config.spec.llm.provider)?;
        let templates = Arc::new(PromptTemplateEngine::new());
        for agent in &config.spec.agents {
            if let Some(template) = &agent.prompt_template {
                templates.validate_template(template).with_context(|| {
                    format!("Invalid prompt template for agent '{}'", agent.profile.id)
                })?;
            }
        }

        let mut builder = OrchestratorBuilder::new(config.clone());
        for binding in &config.spec.tools.bindings {
            builder = builder.with_tool(tool_from_binding(binding), binding.timeout);
        }
        for agent in &config.spec.agents {
            let templated = TemplatedAgent::from_config(
                agent,
                provider.clone(),
                templates.clone(),
                config.spec.llm.timeout,
            );
            builder = builder.with_agent(agent.profile.clone(), Arc::new(templated));
        }
        builder.build(selector_factory)
    }

    /// Route a request. Cancelled when the orchestrator shuts down.
    pub async fn handle(&self, request: OrchestrationRequest) -> OrchestrationResponse {
        self.handle_with_cancel(request, self.shutdown.child_token()).await
    }

    pub async fn handle_with_cancel(
        &self,
        request: OrchestrationRequest,
        cancel: CancellationToken,
    ) -> OrchestrationResponse {
        self.supervisor.handle(request, cancel).await
    }

    /// Verify and route a signed JSON envelope.
    pub async fn handle_envelope(&self, raw: &str) -> Result<OrchestrationResponse, EnvelopeError> {
        let request = self.codec.open_json(raw)?;
        Ok(self.handle(request).await)
    }

    pub fn seal(
        &self,
        request: &OrchestrationRequest,
    ) -> Result<OrchestrationEnvelope, EnvelopeError> {
        self.codec.seal(request)
    }

    /// Probe every agent and record its availability in the ledger.
    pub async fn check_agent_health(&self) -> Vec<(AgentId, bool)> {
        let mut results = Vec::with_capacity(self.directory.len());
        for agent in self.directory.agents() {
            let healthy = agent.health_check().await;
            if !healthy {
                warn!(agent_id = %agent.id(), "Agent failed its health check");
            }
            self.ledger.set_available(agent.id(), healthy);
            results.push((agent.id().clone(), healthy));
        }
        results
    }

    /// Cancel in-flight requests and stop accepting tool calls. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.registry.shutdown();
        info!("Orchestrator shut down");
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn ledger(&self) -> &Arc<PerformanceLedger> {
        &self.ledger
    }

    pub fn cache(&self) -> &Arc<SemanticCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn directory(&self) -> &Arc<AgentDirectory> {
        &self.directory
    }

    pub fn tuning(&self) -> &TuningHandle {
        &self.tuning
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::supervisor::ResponseStatus;
    use crate::domain::agent::{AgentDescriptor, AgentStatus};
    use crate::domain::decision::{CoordinationMode, Decision, SelectionError};
    use crate::domain::execution::Task;
    use chrono::Utc;

    struct FirstPick;

    impl AgentSelector for FirstPick {
        fn select(
            &self,
            _task: &Task,
            candidates: &[AgentDescriptor],
        ) -> Result<Decision, SelectionError> {
            let primary = candidates
                .iter()
                .find(|c| c.is_selectable())
                .ok_or(SelectionError::NoEligibleAgent {
                    candidates: candidates.len(),
                })?;
            Ok(Decision {
                primary_agent: primary.id.clone(),
                supporting_agents: vec![],
                coordination_mode: CoordinationMode::Hierarchical,
                confidence: 0.9,
                directed: false,
                decided_at: Utc::now(),
            })
        }

        fn select_directed(
            &self,
            task: &Task,
            _target: &AgentId,
            candidates: &[AgentDescriptor],
        ) -> Result<Decision, SelectionError> {
            self.select(task, candidates)
        }
    }

    const MANIFEST: &str = r#"
apiVersion: switchyard/v1
kind: OrchestratorConfig
metadata:
  name: test
spec:
  tools:
    bindings:
      - name: market_data
        category: analysis
        handler:
          type: stub
          response: { price: 42 }
  agents:
    - id: market_analyst
      capabilities: [market, finance]
      allowed_tools: [market_data]
      tool_plan:
        - tool: market_data
      prompt_template: "price {{json tool_results.market_data.price}}"
  llm:
    provider:
      type: static
"#;

    fn build() -> Orchestrator {
        let config = OrchestratorConfigManifest::from_yaml_str(MANIFEST).unwrap();
        Orchestrator::from_config(config, |_, _| Arc::new(FirstPick)).unwrap()
    }

    #[tokio::test]
    async fn test_from_config_wires_tools_and_agents() {
        let orchestrator = build();
        assert_eq!(orchestrator.registry().len(), 1);
        assert_eq!(orchestrator.directory().ids(), vec![AgentId::new("market_analyst")]);
        assert!(orchestrator
            .registry()
            .is_permitted(&AgentId::new("market_analyst"), "market_data"));

        let response = orchestrator
            .handle(OrchestrationRequest::new("alice", Task::new("What is the market price?")))
            .await;
        assert_eq!(response.status, ResponseStatus::Completed);
        assert_eq!(response.messages.last().map(|m| m.content.as_str()), Some("price 42"));
        assert!(orchestrator.audit().verify_all().is_ok());
    }

    #[tokio::test]
    async fn test_envelope_round_trip_through_orchestrator() {
        let orchestrator = build();
        let request = OrchestrationRequest::new("bob", Task::new("market update please"));
        let envelope = orchestrator.seal(&request).unwrap();
        let raw = serde_json::to_string(&envelope).unwrap();

        let response = orchestrator.handle_envelope(&raw).await.unwrap();
        assert_eq!(response.request_id, request.request_id);

        let mut tampered: serde_json::Value = serde_json::from_str(&raw).unwrap();
        tampered["params"]["payload"]["userId"] = serde_json::json!("mallory");
        let err = orchestrator
            .handle_envelope(&tampered.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::SignatureMismatch));
    }

    #[tokio::test]
    async fn test_health_check_updates_availability() {
        let orchestrator = build();
        let results = orchestrator.check_agent_health().await;
        assert_eq!(results, vec![(AgentId::new("market_analyst"), true)]);
        assert_eq!(
            orchestrator.ledger().status(&AgentId::new("market_analyst")),
            AgentStatus::Available
        );
    }

    #[tokio::test]
    async fn test_shutdown_cancels_requests() {
        let orchestrator = build();
        orchestrator.shutdown();
        orchestrator.shutdown();
        let response = orchestrator
            .handle(OrchestrationRequest::new("alice", Task::new("market price")))
            .await;
        assert_eq!(response.status, ResponseStatus::Failed);
    }

    #[test]
    fn test_invalid_prompt_template_rejected() {
        let mut config = OrchestratorConfigManifest::from_yaml_str(MANIFEST).unwrap();
        config.spec.agents[0].prompt_template = Some("{{#if}}".to_string());
        assert!(Orchestrator::from_config(config, |_, _| Arc::new(FirstPick)).is_err());
    }
}
