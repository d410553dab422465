// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Performance Ledger
//!
//! Rolling execution statistics per `(agent, task type)` and per tool, plus
//! in-flight load and availability per agent. Updated on every request's hot
//! path, so all state sits in sharded maps (`DashMap`) rather than behind
//! one lock.
//!
//! Callers only ever see derived figures ([`PerformanceScore`],
//! [`AgentStats`]); raw samples stay private.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::domain::agent::{AgentId, AgentStatus};
use crate::domain::errors::OrchestrationError;
use crate::domain::execution::Task;
use crate::domain::performance::{AgentStats, PerformanceScore};
use crate::domain::tuning::{LedgerTuning, TuningHandle};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LedgerKey {
    Agent { agent_id: AgentId, task_type: String },
    Tool(String),
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    duration_ms: u64,
    success: bool,
}

#[derive(Debug, Default)]
struct Window {
    samples: VecDeque<Sample>,
}

impl Window {
    fn push(&mut self, sample: Sample, capacity: usize) {
        while self.samples.len() >= capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    count: usize,
    successes: usize,
    latency_sum: u64,
    latency_max: u64,
}

impl Totals {
    fn add(&mut self, window: &Window) {
        for s in &window.samples {
            self.count += 1;
            self.latency_sum += s.duration_ms;
            self.latency_max = self.latency_max.max(s.duration_ms);
            if s.success {
                self.successes += 1;
            }
        }
    }

    fn score(&self, tuning: &LedgerTuning) -> PerformanceScore {
        if self.count == 0 {
            return PerformanceScore::cold(tuning.cold_start_score);
        }
        let success_rate = self.successes as f64 / self.count as f64;
        let avg_latency = self.latency_sum as f64 / self.count as f64;
        let time_factor = if avg_latency <= 0.0 {
            1.0
        } else {
            (tuning.reference_latency_ms / avg_latency).min(1.0)
        };
        let w = tuning.success_weight.clamp(0.0, 1.0);
        PerformanceScore {
            success_rate,
            time_factor,
            reliability: w * success_rate + (1.0 - w) * time_factor,
            samples: self.count,
        }
    }
}

#[derive(Debug)]
struct LoadState {
    in_flight: usize,
    capacity: usize,
    available: bool,
}

impl Default for LoadState {
    fn default() -> Self {
        Self {
            in_flight: 0,
            capacity: 1,
            available: true,
        }
    }
}

pub struct PerformanceLedger {
    windows: DashMap<LedgerKey, Window>,
    loads: Arc<DashMap<AgentId, LoadState>>,
    window_size: usize,
    tuning: TuningHandle,
}

impl PerformanceLedger {
    pub fn new(window_size: usize, tuning: TuningHandle) -> Self {
        Self {
            windows: DashMap::new(),
            loads: Arc::new(DashMap::new()),
            window_size: window_size.max(1),
            tuning,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Declare an agent and its concurrency ceiling.
    pub fn register_agent(&self, agent_id: &AgentId, capacity: usize) {
        let mut load = self.loads.entry(agent_id.clone()).or_default();
        load.capacity = capacity.max(1);
    }

    /// Record one execution. With a tool name the sample lands on that
    /// tool's window; without one it lands on the agent's general window.
    pub fn record(
        &self,
        agent_id: &AgentId,
        tool_name: Option<&str>,
        duration_ms: u64,
        success: bool,
    ) {
        match tool_name {
            Some(tool) => self.push(LedgerKey::Tool(tool.to_string()), duration_ms, success),
            None => self.record_for_task(agent_id, Task::GENERAL, duration_ms, success),
        }
    }

    pub fn record_for_task(
        &self,
        agent_id: &AgentId,
        task_type: &str,
        duration_ms: u64,
        success: bool,
    ) {
        self.push(
            LedgerKey::Agent {
                agent_id: agent_id.clone(),
                task_type: task_type.to_string(),
            },
            duration_ms,
            success,
        );
    }

    fn push(&self, key: LedgerKey, duration_ms: u64, success: bool) {
        debug!(?key, duration_ms, success, "Recording performance sample");
        self.windows
            .entry(key)
            .or_default()
            .push(Sample { duration_ms, success }, self.window_size);
    }

    fn agent_totals(&self, agent_id: &AgentId, task_type: Option<&str>) -> Totals {
        let mut totals = Totals::default();
        for entry in self.windows.iter() {
            if let LedgerKey::Agent { agent_id: a, task_type: t } = entry.key() {
                if a == agent_id && task_type.map_or(true, |wanted| wanted == t) {
                    totals.add(entry.value());
                }
            }
        }
        totals
    }

    /// Reliability across all task types for this agent.
    pub fn score(&self, agent_id: &AgentId) -> PerformanceScore {
        self.agent_totals(agent_id, None).score(&self.tuning.ledger())
    }

    /// Reliability for one task type, falling back to the agent-wide figure
    /// when that task type has no samples yet.
    pub fn score_for_task(&self, agent_id: &AgentId, task_type: &str) -> PerformanceScore {
        let totals = self.agent_totals(agent_id, Some(task_type));
        if totals.count == 0 {
            return self.score(agent_id);
        }
        totals.score(&self.tuning.ledger())
    }

    pub fn tool_score(&self, tool_name: &str) -> PerformanceScore {
        let mut totals = Totals::default();
        if let Some(window) = self.windows.get(&LedgerKey::Tool(tool_name.to_string())) {
            totals.add(&window);
        }
        totals.score(&self.tuning.ledger())
    }

    pub fn agent_stats(&self, agent_id: &AgentId) -> AgentStats {
        let totals = self.agent_totals(agent_id, None);
        AgentStats {
            agent_id: agent_id.clone(),
            samples: totals.count,
            successes: totals.successes,
            avg_latency_ms: if totals.count == 0 {
                0.0
            } else {
                totals.latency_sum as f64 / totals.count as f64
            },
            max_latency_ms: totals.latency_max,
            success_rate: if totals.count == 0 {
                0.0
            } else {
                totals.successes as f64 / totals.count as f64
            },
        }
    }

    /// In-flight load in `[0, 1]`.
    pub fn load(&self, agent_id: &AgentId) -> f64 {
        self.loads
            .get(agent_id)
            .map(|l| (l.in_flight as f64 / l.capacity as f64).min(1.0))
            .unwrap_or(0.0)
    }

    pub fn status(&self, agent_id: &AgentId) -> AgentStatus {
        match self.loads.get(agent_id) {
            Some(l) if !l.available => AgentStatus::Unavailable,
            Some(l) if l.in_flight >= l.capacity => AgentStatus::Saturated,
            _ => AgentStatus::Available,
        }
    }

    pub fn is_available(&self, agent_id: &AgentId) -> bool {
        self.loads.get(agent_id).map_or(true, |l| l.available)
    }

    pub fn set_available(&self, agent_id: &AgentId, available: bool) {
        let mut load = self.loads.entry(agent_id.clone()).or_default();
        if load.available != available {
            info!(agent_id = %agent_id, available, "Agent availability changed");
        }
        load.available = available;
    }

    /// Reserve one slot for an invocation. The slot is released when the
    /// guard drops.
    pub fn begin(&self, agent_id: &AgentId) -> Result<LoadGuard, OrchestrationError> {
        let mut load = self.loads.entry(agent_id.clone()).or_default();
        if !load.available {
            return Err(OrchestrationError::AgentUnavailable {
                agent_id: agent_id.clone(),
                reason: "marked unavailable".to_string(),
            });
        }
        if load.in_flight >= load.capacity {
            return Err(OrchestrationError::AgentUnavailable {
                agent_id: agent_id.clone(),
                reason: format!("at capacity ({} in flight)", load.in_flight),
            });
        }
        load.in_flight += 1;
        Ok(LoadGuard {
            loads: Arc::clone(&self.loads),
            agent_id: agent_id.clone(),
        })
    }
}

/// Held while an agent is executing.
#[must_use = "dropping the guard releases the load slot immediately"]
pub struct LoadGuard {
    loads: Arc<DashMap<AgentId, LoadState>>,
    agent_id: AgentId,
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        if let Some(mut load) = self.loads.get_mut(&self.agent_id) {
            load.in_flight = load.in_flight.saturating_sub(1);
        }
    }
}
