//! End-to-end routing through a configured orchestrator using the swarm selector.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use switchyard_core::application::{Orchestrator, ResponseStatus};
use switchyard_core::domain::agent::AgentId;
use switchyard_core::domain::audit::AuditEventType;
use switchyard_core::domain::decision::AgentSelector;
use switchyard_core::domain::execution::{OrchestrationRequest, Task};
use switchyard_core::domain::orchestrator_config::OrchestratorConfigManifest;
use switchyard_swarm::SwarmSelector;

const MANIFEST: &str = r#"
apiVersion: switchyard/v1
kind: OrchestratorConfig
metadata:
  name: routing-scenarios
spec:
  tools:
    bindings:
      - name: market_data
        category: analysis
        input_schema:
          type: object
          properties:
            task: { type: string }
          required: [task]
        handler:
          type: stub
          response: { ticker: ACME, trend: up }
  agents:
    - id: market_analyst
      capabilities: [market, finance]
      allowed_tools: [market_data]
      tool_plan:
        - tool: market_data
          include_task: true
      prompt_template: "ACME trend is {{tool_results.market_data.trend}}"
    - id: triage
      capabilities: [triage, support]
      delegate_to: writer
      prompt_template: "handing {{task}} to the writer"
    - id: writer
      capabilities: [writing]
      prompt_template: "drafted a reply"
  llm:
    provider:
      type: static
"#;

const QUARTERLY_MANIFEST: &str = r#"
apiVersion: switchyard/v1
kind: OrchestratorConfig
metadata:
  name: quarterly-analysis
spec:
  supervisor:
    request_timeout: 5s
  agents:
    - id: market_agent
      capabilities:
        - market
        - quarterly_reporting
        - finance
        - forecasting
        - equities
        - valuation
        - statistics
        - macroeconomics
        - visualization
      prompt_template: "quarterly market analysis for {{task}}"
    - id: generic_agent
      capabilities: [market, compliance, writing]
      prompt_template: "generic answer"
  llm:
    provider:
      type: static
"#;

const QUARTERLY_REQUIREMENTS: [&str; 10] = [
    "market",
    "quarterly_reporting",
    "finance",
    "forecasting",
    "equities",
    "valuation",
    "statistics",
    "macroeconomics",
    "visualization",
    "compliance",
];

fn orchestrator() -> Orchestrator {
    let config = OrchestratorConfigManifest::from_yaml_str(MANIFEST).unwrap();
    Orchestrator::from_config(config, |tuning, selection| {
        Arc::new(SwarmSelector::from_config(tuning, selection))
    })
    .unwrap()
}

#[tokio::test]
async fn market_question_routes_to_market_analyst() {
    let orchestrator = orchestrator();
    let response = orchestrator
        .handle(OrchestrationRequest::new(
            "alice",
            Task::new("What are the latest market trends for ACME stock?"),
        ))
        .await;

    assert_eq!(response.status, ResponseStatus::Completed);
    let decision = response.decision.expect("decision recorded");
    assert_eq!(decision.primary_agent, AgentId::new("market_analyst"));
    assert!(decision.confidence > 0.5);
    assert_eq!(response.contributing_agents, vec![AgentId::new("market_analyst")]);
    assert_eq!(
        response.messages.last().map(|m| m.content.as_str()),
        Some("ACME trend is up")
    );
    assert_eq!(orchestrator.ledger().agent_stats(&AgentId::new("market_analyst")).samples, 1);
}

#[tokio::test]
async fn repeated_question_is_served_from_cache() {
    let orchestrator = orchestrator();
    let ask = || OrchestrationRequest::new("alice", Task::new("market trends for ACME"));

    let first = orchestrator.handle(ask()).await;
    assert_eq!(first.status, ResponseStatus::Completed);

    let second = orchestrator.handle(ask()).await;
    assert_eq!(second.status, ResponseStatus::Cached);
    assert_eq!(second.messages, first.messages);
    assert_eq!(orchestrator.cache().stats().hits, 1);
}

#[tokio::test]
async fn agent_requested_delegation_is_directed() {
    let orchestrator = orchestrator();
    let response = orchestrator
        .handle(OrchestrationRequest::new(
            "bob",
            Task::new("Please triage this support ticket about billing"),
        ))
        .await;

    assert_eq!(response.status, ResponseStatus::Completed);
    assert_eq!(response.hops, 1);
    assert_eq!(
        response.contributing_agents,
        vec![AgentId::new("triage"), AgentId::new("writer")]
    );
    let decision = response.decision.expect("decision recorded");
    assert!(decision.directed);
    assert_eq!(decision.primary_agent, AgentId::new("writer"));
}

#[tokio::test]
async fn unrelated_request_escalates_instead_of_guessing() {
    let orchestrator = orchestrator();
    let mut task = Task::new("translate this poem");
    task.required_capabilities = vec!["translation".into()];
    let response = orchestrator.handle(OrchestrationRequest::new("carol", task)).await;

    assert_eq!(response.status, ResponseStatus::Escalated);
    assert!(response.contributing_agents.is_empty());
}

#[test]
fn selection_is_deterministic_for_identical_snapshots() {
    let orchestrator = orchestrator();
    let selector = SwarmSelector::new(orchestrator.tuning().clone());
    let task = Task::new("finance and market outlook");
    let snapshot = orchestrator
        .directory()
        .descriptors(orchestrator.ledger(), task.task_type(), &HashSet::new());

    let first = selector.select(&task, &snapshot).unwrap();
    for _ in 0..50 {
        let again = selector.select(&task, &snapshot).unwrap();
        assert_eq!(again.primary_agent, first.primary_agent);
        assert_eq!(again.supporting_agents, first.supporting_agents);
        assert_eq!(again.confidence, first.confidence);
    }
}

#[tokio::test]
async fn quarterly_market_analysis_goes_to_the_market_agent() {
    let config = OrchestratorConfigManifest::from_yaml_str(QUARTERLY_MANIFEST).unwrap();
    let request_timeout = config.spec.supervisor.request_timeout;
    let orchestrator = Orchestrator::from_config(config, |tuning, selection| {
        Arc::new(SwarmSelector::from_config(tuning, selection))
    })
    .unwrap();

    let mut task = Task::new("generate a quarterly market analysis");
    task.required_capabilities = QUARTERLY_REQUIREMENTS.iter().map(|c| c.to_string()).collect();

    // Capability match: 9 of 10 requirements against 2 of 10
    let snapshot = orchestrator
        .directory()
        .descriptors(orchestrator.ledger(), task.task_type(), &HashSet::new());
    let selector = SwarmSelector::new(orchestrator.tuning().clone());
    let (profile, ranked) = selector.rank(&task, &snapshot);
    assert_eq!(profile.requirements.len(), 10);
    let match_of = |id: &str| {
        ranked
            .iter()
            .find(|c| c.agent_id == AgentId::new(id))
            .map(|c| c.capability_match)
            .unwrap()
    };
    assert!((match_of("market_agent") - 0.9).abs() < 1e-9);
    assert!((match_of("generic_agent") - 0.2).abs() < 1e-9);
    assert_eq!(orchestrator.cache().stats().hits, 0);

    let started = Instant::now();
    let response = orchestrator.handle(OrchestrationRequest::new("dana", task)).await;
    let elapsed = started.elapsed();

    assert_eq!(response.status, ResponseStatus::Completed);
    let decision = response.decision.clone().expect("decision recorded");
    assert_eq!(decision.primary_agent, AgentId::new("market_agent"));
    assert!(decision.confidence > 0.5);

    let transition_entries: Vec<_> = orchestrator
        .audit()
        .entries_for(response.request_id)
        .into_iter()
        .filter(|e| e.event_type == AuditEventType::StateTransition)
        .collect();
    assert_eq!(transition_entries.len(), response.transitions.len());
    assert!(transition_entries.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    assert!(elapsed < request_timeout);
    assert!(response.rendered.contains("market_agent"));
}
