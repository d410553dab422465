// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Reflection Engine
//!
//! Turns a finished request's [`ExecutionTrace`] into bounded improvement
//! actions and applies them to the shared [`TuningHandle`]. Only selection
//! and execution tuning is ever touched; the tool registry and its
//! permission table are out of reach by construction (no handle to them).
//!
//! | Signal | Action |
//! |--------|--------|
//! | agent failure or timeout in the trace | raise supporting-agent count |
//! | agent consistently fast and reliable | lower its invocation timeout |
//! | history longer than the context window | shrink the window |
//! | primary agent unreliable | shift score weight from capability to performance |

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::domain::audit::AuditEventType;
use crate::domain::execution::RequestId;
use crate::domain::improvement::{
    ExecutionTrace, Improvement, ImprovementKind, ImprovementTarget, StepOutcome, SuggestedAction,
};
use crate::domain::tuning::TuningHandle;
use crate::infrastructure::audit_log::AuditLog;
use crate::infrastructure::performance_ledger::PerformanceLedger;

/// Limits every adjustment has to respect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionBounds {
    pub max_supporting_agents: usize,
    #[serde(with = "humantime_serde")]
    pub min_agent_timeout: Duration,
    pub min_context_window: usize,
    pub min_capability_weight: f64,
    pub weight_step: f64,
    /// Samples an agent needs before its timeout may be lowered.
    pub fast_agent_min_samples: usize,
    pub fast_agent_success_rate: f64,
    /// Proposed timeout is this multiple of the agent's average latency.
    pub timeout_headroom: f64,
    pub poor_reliability: f64,
    pub poor_reliability_min_samples: usize,
}

impl Default for ReflectionBounds {
    fn default() -> Self {
        Self {
            max_supporting_agents: 5,
            min_agent_timeout: Duration::from_secs(1),
            min_context_window: 4,
            min_capability_weight: 0.3,
            weight_step: 0.05,
            fast_agent_min_samples: 10,
            fast_agent_success_rate: 0.95,
            timeout_headroom: 4.0,
            poor_reliability: 0.5,
            poor_reliability_min_samples: 5,
        }
    }
}

pub struct ReflectionEngine {
    ledger: Arc<PerformanceLedger>,
    tuning: TuningHandle,
    audit: Arc<AuditLog>,
    bounds: ReflectionBounds,
}

impl ReflectionEngine {
    pub fn new(ledger: Arc<PerformanceLedger>, tuning: TuningHandle, audit: Arc<AuditLog>) -> Self {
        Self {
            ledger,
            tuning,
            audit,
            bounds: ReflectionBounds::default(),
        }
    }

    pub fn with_bounds(mut self, bounds: ReflectionBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn analyze(&self, trace: &ExecutionTrace) -> Vec<Improvement> {
        let tuning = self.tuning.snapshot();
        let mut improvements = Vec::new();

        let failures: Vec<_> = trace.failures().collect();
        if !failures.is_empty()
            && tuning.selection.max_supporting_agents < self.bounds.max_supporting_agents
        {
            let timeouts = failures
                .iter()
                .filter(|s| matches!(s.outcome, StepOutcome::Failed(kind) if kind.is_timeout()))
                .count();
            improvements.push(Improvement {
                kind: ImprovementKind::PerformanceOptimization,
                target: ImprovementTarget::Selector,
                suggested_action: SuggestedAction::IncreaseSupportingAgents {
                    to: tuning.selection.max_supporting_agents + 1,
                },
                rationale: format!(
                    "{} agent failure(s), {} of them timeouts, in request {}",
                    failures.len(),
                    timeouts,
                    trace.request_id
                ),
            });
        }

        let succeeded: BTreeSet<_> = trace
            .steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::Success)
            .map(|s| &s.agent_id)
            .collect();
        for agent_id in succeeded {
            let stats = self.ledger.agent_stats(agent_id);
            if stats.samples < self.bounds.fast_agent_min_samples
                || stats.success_rate < self.bounds.fast_agent_success_rate
            {
                continue;
            }
            let current = tuning.execution.timeout_for(agent_id);
            let headroom = stats.avg_latency_ms * self.bounds.timeout_headroom;
            let proposed_ms = (stats.max_latency_ms as f64).max(headroom).ceil() as u64;
            let proposed = Duration::from_millis(proposed_ms).max(self.bounds.min_agent_timeout);
            if proposed < current {
                improvements.push(Improvement {
                    kind: ImprovementKind::PerformanceOptimization,
                    target: ImprovementTarget::Agent(agent_id.clone()),
                    suggested_action: SuggestedAction::ReduceTimeout {
                        to_ms: proposed.as_millis() as u64,
                    },
                    rationale: format!(
                        "{} averages {:.0}ms over {} samples against a {}ms timeout",
                        agent_id,
                        stats.avg_latency_ms,
                        stats.samples,
                        current.as_millis()
                    ),
                });
            }
        }

        let window = tuning.execution.context_window;
        if trace.history_len > window {
            let to = (window - window / 4).max(self.bounds.min_context_window);
            if to < window {
                improvements.push(Improvement {
                    kind: ImprovementKind::ContextManagement,
                    target: ImprovementTarget::Supervisor,
                    suggested_action: SuggestedAction::PruneContext { to },
                    rationale: format!(
                        "history reached {} messages with a window of {}",
                        trace.history_len, window
                    ),
                });
            }
        }

        if let Some(primary) = trace.primary_agent() {
            let score = self.ledger.score(primary);
            let weights = tuning.selection.weights;
            if score.samples >= self.bounds.poor_reliability_min_samples
                && score.reliability < self.bounds.poor_reliability
                && weights.capability - self.bounds.weight_step >= self.bounds.min_capability_weight
            {
                improvements.push(Improvement {
                    kind: ImprovementKind::SelectionTuning,
                    target: ImprovementTarget::Selector,
                    suggested_action: SuggestedAction::ShiftWeightToPerformance {
                        delta: self.bounds.weight_step,
                    },
                    rationale: format!(
                        "primary {} reliability {:.2} was selected on capability",
                        primary, score.reliability
                    ),
                });
            }
        }

        debug!(
            request_id = %trace.request_id,
            count = improvements.len(),
            "Reflection analysis complete"
        );
        improvements
    }

    /// Apply improvements within bounds. Returns how many changed tuning.
    pub fn apply_improvements(
        &self,
        request_id: Option<RequestId>,
        improvements: &[Improvement],
    ) -> usize {
        let mut applied = 0;
        for improvement in improvements {
            let bounds = &self.bounds;
            let action = (&improvement.suggested_action, &improvement.target);
            let changed = self.tuning.update(|t| match action {
                (SuggestedAction::IncreaseSupportingAgents { to }, _) => {
                    let to = (*to).min(bounds.max_supporting_agents);
                    let changed = to > t.selection.max_supporting_agents;
                    t.selection.max_supporting_agents = t.selection.max_supporting_agents.max(to);
                    changed
                }
                (SuggestedAction::ReduceTimeout { to_ms }, ImprovementTarget::Agent(agent_id)) => {
                    let to = Duration::from_millis(*to_ms).max(bounds.min_agent_timeout);
                    if to < t.execution.timeout_for(agent_id) {
                        t.execution.agent_timeouts.insert(agent_id.clone(), to);
                        true
                    } else {
                        false
                    }
                }
                (SuggestedAction::ReduceTimeout { .. }, _) => false,
                (SuggestedAction::PruneContext { to }, _) => {
                    let to = (*to).max(bounds.min_context_window);
                    let changed = to < t.execution.context_window;
                    t.execution.context_window = t.execution.context_window.min(to);
                    changed
                }
                (SuggestedAction::ShiftWeightToPerformance { delta }, _) => {
                    let room =
                        (t.selection.weights.capability - bounds.min_capability_weight).max(0.0);
                    let delta = delta.clamp(0.0, room);
                    if delta > 0.0 {
                        t.selection.weights.capability -= delta;
                        t.selection.weights.performance += delta;
                        true
                    } else {
                        false
                    }
                }
            });

            if !changed {
                continue;
            }
            applied += 1;
            counter!("switchyard_improvements_applied_total", "kind" => improvement.kind.as_str())
                .increment(1);
            info!(
                kind = improvement.kind.as_str(),
                target = ?improvement.target,
                action = ?improvement.suggested_action,
                "Applied improvement"
            );
            self.audit.append(
                AuditEventType::ImprovementApplied,
                request_id,
                json!({
                    "improvement": improvement,
                }),
            );
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentFailureKind, AgentId};
    use crate::domain::decision::{CoordinationMode, Decision};
    use crate::domain::improvement::TraceStep;
    use chrono::Utc;

    fn engine() -> (ReflectionEngine, Arc<PerformanceLedger>, TuningHandle, Arc<AuditLog>) {
        let tuning = TuningHandle::default();
        let ledger = Arc::new(PerformanceLedger::new(100, tuning.clone()));
        let audit = Arc::new(AuditLog::ephemeral());
        let engine = ReflectionEngine::new(ledger.clone(), tuning.clone(), audit.clone());
        (engine, ledger, tuning, audit)
    }

    fn decision(primary: &str) -> Decision {
        Decision {
            primary_agent: AgentId::new(primary),
            supporting_agents: vec![],
            coordination_mode: CoordinationMode::Hierarchical,
            confidence: 0.8,
            directed: false,
            decided_at: Utc::now(),
        }
    }

    fn trace(steps: Vec<TraceStep>, history_len: usize) -> ExecutionTrace {
        ExecutionTrace {
            request_id: RequestId::new(),
            task_type: "general".into(),
            decisions: vec![decision("primary")],
            steps,
            hops: 0,
            degraded: false,
            history_len,
            total_duration_ms: 10,
        }
    }

    fn step(agent: &str, outcome: StepOutcome) -> TraceStep {
        TraceStep {
            agent_id: AgentId::new(agent),
            hop: 0,
            duration_ms: 5,
            outcome,
            tools_used: vec![],
        }
    }

    #[test]
    fn test_clean_trace_yields_nothing() {
        let (engine, _, _, _) = engine();
        let t = trace(vec![step("primary", StepOutcome::Success)], 2);
        assert!(engine.analyze(&t).is_empty());
    }

    #[test]
    fn test_timeout_raises_supporting_agents() {
        let (engine, _, tuning, audit) = engine();
        let t = trace(vec![step("primary", StepOutcome::Failed(AgentFailureKind::ToolTimeout))], 2);
        let improvements = engine.analyze(&t);
        assert_eq!(
            improvements[0].suggested_action,
            SuggestedAction::IncreaseSupportingAgents { to: 4 }
        );

        assert_eq!(engine.apply_improvements(Some(t.request_id), &improvements), 1);
        assert_eq!(tuning.selection().max_supporting_agents, 4);
        let entries = audit.entries_for(t.request_id);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, AuditEventType::ImprovementApplied);
    }

    #[test]
    fn test_supporting_agents_bounded() {
        let (engine, _, tuning, _) = engine();
        tuning.update(|t| t.selection.max_supporting_agents = 5);
        let t = trace(vec![step("primary", StepOutcome::Failed(AgentFailureKind::ToolFailure))], 2);
        assert!(engine.analyze(&t).is_empty());
    }

    #[test]
    fn test_fast_reliable_agent_gets_shorter_timeout() {
        let (engine, ledger, tuning, _) = engine();
        let agent = AgentId::new("primary");
        for _ in 0..20 {
            ledger.record_for_task(&agent, "general", 200, true);
        }
        let t = trace(vec![step("primary", StepOutcome::Success)], 2);
        let improvements = engine.analyze(&t);
        assert_eq!(improvements.len(), 1);
        assert_eq!(
            improvements[0].suggested_action,
            SuggestedAction::ReduceTimeout { to_ms: 1000 }
        );

        engine.apply_improvements(None, &improvements);
        assert_eq!(tuning.agent_timeout(&agent), Duration::from_secs(1));
        assert_eq!(tuning.agent_timeout(&AgentId::new("other")), Duration::from_secs(60));
    }

    #[test]
    fn test_long_history_prunes_context() {
        let (engine, _, tuning, _) = engine();
        let t = trace(vec![step("primary", StepOutcome::Success)], 30);
        let improvements = engine.analyze(&t);
        assert_eq!(improvements[0].suggested_action, SuggestedAction::PruneContext { to: 15 });
        engine.apply_improvements(None, &improvements);
        assert_eq!(tuning.context_window(), 15);
    }

    #[test]
    fn test_unreliable_primary_shifts_weight() {
        let (engine, ledger, tuning, _) = engine();
        let agent = AgentId::new("primary");
        for _ in 0..10 {
            ledger.record_for_task(&agent, "general", 5000, false);
        }
        let t = trace(vec![step("primary", StepOutcome::Success)], 2);
        let improvements = engine.analyze(&t);
        assert!(improvements
            .iter()
            .any(|i| i.kind == ImprovementKind::SelectionTuning));

        engine.apply_improvements(None, &improvements);
        let weights = tuning.selection().weights;
        assert!((weights.capability - 0.45).abs() < 1e-9);
        assert!((weights.performance - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_capability_weight_never_below_floor() {
        let (engine, _, tuning, _) = engine();
        tuning.update(|t| t.selection.weights.capability = 0.32);
        let shift = Improvement {
            kind: ImprovementKind::SelectionTuning,
            target: ImprovementTarget::Selector,
            suggested_action: SuggestedAction::ShiftWeightToPerformance { delta: 0.05 },
            rationale: String::new(),
        };
        engine.apply_improvements(None, &[shift.clone(), shift]);
        assert!((tuning.selection().weights.capability - 0.3).abs() < 1e-9);
    }
}
