// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Routing Decisions
//!
//! A [`Decision`] is produced once per Supervisor selection cycle, never
//! mutated afterwards, and always audited. The scoring that produces it sits
//! behind [`AgentSelector`] so the Supervisor does not depend on any one
//! heuristic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentDescriptor, AgentId};
use crate::domain::execution::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationMode {
    Pipeline,
    ScatterGather,
    Hierarchical,
}

impl CoordinationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinationMode::Pipeline => "pipeline",
            CoordinationMode::ScatterGather => "scatter_gather",
            CoordinationMode::Hierarchical => "hierarchical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub primary_agent: AgentId,
    /// Next-ranked agents in rank order; the first one is the retry target.
    pub supporting_agents: Vec<AgentId>,
    pub coordination_mode: CoordinationMode,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// True when an agent named the primary via delegation.
    #[serde(default)]
    pub directed: bool,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn involves(&self, agent_id: &AgentId) -> bool {
        &self.primary_agent == agent_id || self.supporting_agents.contains(agent_id)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    #[error("no eligible agent among {candidates} candidates")]
    NoEligibleAgent { candidates: usize },
}

/// Chooses which agent(s) handle a task.
///
/// Implementations must be deterministic for identical inputs unless an
/// explicitly seeded exploration source was injected.
pub trait AgentSelector: Send + Sync {
    fn select(
        &self,
        task: &Task,
        candidates: &[AgentDescriptor],
    ) -> Result<Decision, SelectionError>;

    /// Honour an agent-requested delegation to `target`. Falls back to
    /// [`AgentSelector::select`] when the target is not a selectable candidate.
    fn select_directed(
        &self,
        task: &Task,
        target: &AgentId,
        candidates: &[AgentDescriptor],
    ) -> Result<Decision, SelectionError>;
}
