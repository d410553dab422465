// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Runtime Tuning
//!
//! The weights and thresholds that selection, the ledger and the Supervisor
//! read on every request. They start from configuration and are adjusted at
//! runtime only by the reflection engine, through a shared [`TuningHandle`].
//! Permission data is deliberately absent: nothing here can widen what an
//! agent may call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;

/// `agentScore = capability*capabilityMatch + performance*reliability + load*(1 - load)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub capability: f64,
    pub performance: f64,
    pub load: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            capability: 0.5,
            performance: 0.3,
            load: 0.2,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.capability + self.performance + self.load
    }
}

/// Weights of the confidence blend: candidate pool, inverse complexity and
/// resource availability. Normalized by their sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub pool: f64,
    pub complexity: f64,
    pub availability: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            pool: 0.4,
            complexity: 0.3,
            availability: 0.3,
        }
    }
}

impl ConfidenceWeights {
    pub fn sum(&self) -> f64 {
        self.pool + self.complexity + self.availability
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionTuning {
    pub weights: ScoreWeights,
    pub confidence: ConfidenceWeights,
    pub max_supporting_agents: usize,
    /// Minimum capability match for an agent to be eligible at all.
    pub capability_floor: f64,
    /// Below this confidence the Supervisor escalates instead of delegating.
    pub low_confidence_floor: f64,
    /// Eligible-agent count at which the pool factor saturates to 1.
    pub pool_saturation: usize,
}

impl Default for SelectionTuning {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            confidence: ConfidenceWeights::default(),
            max_supporting_agents: 3,
            capability_floor: 0.3,
            low_confidence_floor: 0.5,
            pool_saturation: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerTuning {
    /// Latency considered "on time"; `timeFactor = min(1, reference / avg)`.
    pub reference_latency_ms: f64,
    /// Share of reliability taken from the success rate; the rest is time factor.
    pub success_weight: f64,
    /// Reliability reported for keys without samples.
    pub cold_start_score: f64,
}

impl Default for LedgerTuning {
    fn default() -> Self {
        Self {
            reference_latency_ms: 1000.0,
            success_weight: 0.7,
            cold_start_score: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionTuning {
    pub default_agent_timeout: Duration,
    /// Per-agent overrides written by reflection.
    pub agent_timeouts: HashMap<AgentId, Duration>,
    pub context_window: usize,
}

impl Default for ExecutionTuning {
    fn default() -> Self {
        Self {
            default_agent_timeout: Duration::from_secs(60),
            agent_timeouts: HashMap::new(),
            context_window: 20,
        }
    }
}

impl ExecutionTuning {
    pub fn timeout_for(&self, agent_id: &AgentId) -> Duration {
        self.agent_timeouts
            .get(agent_id)
            .copied()
            .unwrap_or(self.default_agent_timeout)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tuning {
    pub selection: SelectionTuning,
    pub ledger: LedgerTuning,
    pub execution: ExecutionTuning,
}

/// Shared, lock-protected tuning. Readers take cheap snapshots.
#[derive(Debug, Clone, Default)]
pub struct TuningHandle(Arc<RwLock<Tuning>>);

impl TuningHandle {
    pub fn new(tuning: Tuning) -> Self {
        Self(Arc::new(RwLock::new(tuning)))
    }

    pub fn snapshot(&self) -> Tuning {
        self.0.read().clone()
    }

    pub fn selection(&self) -> SelectionTuning {
        self.0.read().selection.clone()
    }

    pub fn ledger(&self) -> LedgerTuning {
        self.0.read().ledger
    }

    pub fn agent_timeout(&self, agent_id: &AgentId) -> Duration {
        self.0.read().execution.timeout_for(agent_id)
    }

    pub fn context_window(&self) -> usize {
        self.0.read().execution.context_window
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut Tuning) -> R) -> R {
        let mut guard = self.0.write();
        f(&mut guard)
    }
}
