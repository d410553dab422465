// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;

/// Derived reliability figures for one ledger key.
///
/// `reliability` blends `success_rate` and `time_factor`; selection reads
/// `reliability`, nothing outside the ledger sees raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceScore {
    pub success_rate: f64,
    pub time_factor: f64,
    pub reliability: f64,
    pub samples: usize,
}

impl PerformanceScore {
    /// Score used before any samples exist.
    pub fn cold(value: f64) -> Self {
        let value = value.clamp(0.0, 1.0);
        Self {
            success_rate: value,
            time_factor: value,
            reliability: value,
            samples: 0,
        }
    }
}

impl Default for PerformanceScore {
    fn default() -> Self {
        Self::cold(0.5)
    }
}

/// Aggregated per-agent figures handed to reflection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub agent_id: AgentId,
    pub samples: usize,
    pub successes: usize,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
    pub success_rate: f64,
}
