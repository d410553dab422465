// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution traces and the improvement actions reflection derives from them.

use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentFailureKind, AgentId};
use crate::domain::decision::Decision;
use crate::domain::execution::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "kind")]
pub enum StepOutcome {
    Success,
    Failed(AgentFailureKind),
}

/// One agent invocation within a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub agent_id: AgentId,
    pub hop: u32,
    pub duration_ms: u64,
    pub outcome: StepOutcome,
    pub tools_used: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub request_id: RequestId,
    pub task_type: String,
    pub decisions: Vec<Decision>,
    pub steps: Vec<TraceStep>,
    pub hops: u32,
    pub degraded: bool,
    pub history_len: usize,
    pub total_duration_ms: u64,
}

impl ExecutionTrace {
    pub fn failures(&self) -> impl Iterator<Item = &TraceStep> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
    }

    pub fn primary_agent(&self) -> Option<&AgentId> {
        self.decisions.first().map(|d| &d.primary_agent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementKind {
    PerformanceOptimization,
    ContextManagement,
    SelectionTuning,
}

impl ImprovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImprovementKind::PerformanceOptimization => "performance_optimization",
            ImprovementKind::ContextManagement => "context_management",
            ImprovementKind::SelectionTuning => "selection_tuning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum ImprovementTarget {
    Agent(AgentId),
    Selector,
    Supervisor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum SuggestedAction {
    IncreaseSupportingAgents { to: usize },
    ReduceTimeout { to_ms: u64 },
    PruneContext { to: usize },
    /// Move `delta` of score weight from capability match to performance.
    ShiftWeightToPerformance { delta: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub kind: ImprovementKind,
    pub target: ImprovementTarget,
    pub suggested_action: SuggestedAction,
    pub rationale: String,
}
