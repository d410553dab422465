// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # SwarmSelector
//!
//! Implements [`AgentSelector`] over a descriptor snapshot:
//!
//! 1. profile the task (requirements, complexity)
//! 2. score each candidate with the injected [`ScoringStrategy`]
//! 3. rank, keep the eligible ones (selectable, capability match at or above
//!    the floor), take the best as primary and the next few as supporting
//! 4. pick a coordination mode and compute confidence
//!
//! Weights and thresholds are read from the shared [`TuningHandle`] on every
//! call, so reflection adjustments take effect on the next selection.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tracing::debug;

use switchyard_core::domain::agent::{AgentDescriptor, AgentId};
use switchyard_core::domain::decision::{AgentSelector, CoordinationMode, Decision, SelectionError};
use switchyard_core::domain::execution::Task;
use switchyard_core::domain::orchestrator_config::SelectionConfig;
use switchyard_core::domain::tuning::{SelectionTuning, TuningHandle};

use crate::domain::scoring::{ExploratoryScoring, ScoreInput, ScoringStrategy, WeightedScoring};
use crate::domain::swarm::{RankedCandidate, TaskProfile};

pub struct SwarmSelector {
    tuning: TuningHandle,
    strategy: Arc<dyn ScoringStrategy>,
}

impl SwarmSelector {
    pub fn new(tuning: TuningHandle) -> Self {
        Self::with_strategy(tuning, Arc::new(WeightedScoring))
    }

    pub fn with_strategy(tuning: TuningHandle, strategy: Arc<dyn ScoringStrategy>) -> Self {
        Self { tuning, strategy }
    }

    /// Deterministic unless the configuration asks for seeded exploration.
    pub fn from_config(tuning: TuningHandle, config: &SelectionConfig) -> Self {
        match &config.exploration {
            Some(exploration) => Self::with_strategy(
                tuning,
                Arc::new(ExploratoryScoring::new(exploration.amplitude, exploration.seed)),
            ),
            None => Self::new(tuning),
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Every candidate, best first, with its score breakdown.
    pub fn rank(
        &self,
        task: &Task,
        candidates: &[AgentDescriptor],
    ) -> (TaskProfile, Vec<RankedCandidate>) {
        let tuning = self.tuning.selection();
        let profile = TaskProfile::analyze(task, candidates);
        let ranked = self.rank_with(&profile, &tuning, candidates);
        (profile, ranked)
    }

    fn rank_with(
        &self,
        profile: &TaskProfile,
        tuning: &SelectionTuning,
        candidates: &[AgentDescriptor],
    ) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = candidates
            .iter()
            .map(|candidate| {
                let input = ScoreInput {
                    capability_match: profile.capability_match(candidate),
                    performance: candidate.performance.reliability.clamp(0.0, 1.0),
                    load: candidate.load.clamp(0.0, 1.0),
                };
                RankedCandidate {
                    agent_id: candidate.id.clone(),
                    score: self.strategy.score(&input, &tuning.weights),
                    capability_match: input.capability_match,
                    performance: input.performance,
                    load: input.load,
                    eligible: candidate.is_selectable()
                        && input.capability_match >= tuning.capability_floor,
                }
            })
            .collect();
        ranked.sort_by(RankedCandidate::rank_order);
        ranked
    }

    fn confidence(tuning: &SelectionTuning, pool: f64, complexity: f64, primary_load: f64) -> f64 {
        let weights = &tuning.confidence;
        let sum = weights.sum();
        if sum <= 0.0 {
            return 0.0;
        }
        let raw = weights.pool * pool.clamp(0.0, 1.0)
            + weights.complexity * (1.0 - complexity.clamp(0.0, 1.0))
            + weights.availability * (1.0 - primary_load.clamp(0.0, 1.0));
        (raw / sum).clamp(0.0, 1.0)
    }

    fn pool_factor(tuning: &SelectionTuning, eligible: usize) -> f64 {
        (eligible as f64 / tuning.pool_saturation.max(1) as f64).min(1.0)
    }

    fn mode(task: &Task, supporting: usize) -> CoordinationMode {
        if task.sequential {
            CoordinationMode::Pipeline
        } else if supporting > 1 && task.parallelizable {
            CoordinationMode::ScatterGather
        } else {
            CoordinationMode::Hierarchical
        }
    }
}

impl AgentSelector for SwarmSelector {
    fn select(
        &self,
        task: &Task,
        candidates: &[AgentDescriptor],
    ) -> Result<Decision, SelectionError> {
        let tuning = self.tuning.selection();
        let profile = TaskProfile::analyze(task, candidates);
        let ranked = self.rank_with(&profile, &tuning, candidates);

        let mut eligible = ranked.iter().filter(|r| r.eligible);
        let Some(primary) = eligible.next() else {
            counter!("switchyard_selections_total", "outcome" => "no_eligible").increment(1);
            debug!(
                candidates = candidates.len(),
                requirements = ?profile.requirements,
                "No eligible agent"
            );
            return Err(SelectionError::NoEligibleAgent {
                candidates: candidates.len(),
            });
        };
        let supporting: Vec<AgentId> = eligible
            .take(tuning.max_supporting_agents)
            .map(|r| r.agent_id.clone())
            .collect();
        let eligible_count = ranked.iter().filter(|r| r.eligible).count();

        let confidence = Self::confidence(
            &tuning,
            Self::pool_factor(&tuning, eligible_count),
            profile.complexity,
            primary.load,
        );
        let decision = Decision {
            primary_agent: primary.agent_id.clone(),
            coordination_mode: Self::mode(task, supporting.len()),
            supporting_agents: supporting,
            confidence,
            directed: false,
            decided_at: Utc::now(),
        };

        counter!("switchyard_selections_total", "outcome" => "selected").increment(1);
        debug!(
            primary = %decision.primary_agent,
            score = primary.score,
            confidence = decision.confidence,
            mode = decision.coordination_mode.as_str(),
            eligible = eligible_count,
            strategy = self.strategy.name(),
            "Selected agent"
        );
        Ok(decision)
    }

    fn select_directed(
        &self,
        task: &Task,
        target: &AgentId,
        candidates: &[AgentDescriptor],
    ) -> Result<Decision, SelectionError> {
        let Some(named) = candidates.iter().find(|c| &c.id == target && c.is_selectable()) else {
            debug!(target = %target, "Delegation target not selectable, falling back to scoring");
            return self.select(task, candidates);
        };

        let tuning = self.tuning.selection();
        let profile = TaskProfile::analyze(task, candidates);
        let supporting: Vec<AgentId> = self
            .rank_with(&profile, &tuning, candidates)
            .into_iter()
            .filter(|r| r.eligible && &r.agent_id != target)
            .take(tuning.max_supporting_agents)
            .map(|r| r.agent_id)
            .collect();

        // An agent naming its successor counts as a saturated pool.
        let confidence = Self::confidence(&tuning, 1.0, profile.complexity, named.load);
        counter!("switchyard_selections_total", "outcome" => "directed").increment(1);
        Ok(Decision {
            primary_agent: named.id.clone(),
            coordination_mode: Self::mode(task, supporting.len()),
            supporting_agents: supporting,
            confidence,
            directed: true,
            decided_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::domain::agent::AgentStatus;
    use switchyard_core::domain::orchestrator_config::ExplorationConfig;
    use switchyard_core::domain::performance::PerformanceScore;
    use switchyard_core::domain::tuning::{ScoreWeights, Tuning};

    fn descriptor(id: &str, caps: &[&str], load: f64, reliability: f64) -> AgentDescriptor {
        AgentDescriptor {
            id: AgentId::new(id),
            capabilities: caps.iter().map(|c| c.to_string()).collect(),
            allowed_tools: Default::default(),
            load,
            status: AgentStatus::Available,
            performance: PerformanceScore::cold(reliability),
        }
    }

    fn selector() -> SwarmSelector {
        SwarmSelector::new(TuningHandle::default())
    }

    #[test]
    fn test_primary_is_best_capability_match() {
        let candidates = vec![
            descriptor("writer", &["writing"], 0.0, 0.5),
            descriptor("market_analyst", &["market", "finance"], 0.0, 0.5),
            descriptor("researcher", &["research"], 0.0, 0.5),
        ];
        let decision = selector()
            .select(&Task::new("Analyze market trends for ACME"), &candidates)
            .unwrap();
        assert_eq!(decision.primary_agent, AgentId::new("market_analyst"));
        assert!(decision.supporting_agents.is_empty());
        assert_eq!(decision.coordination_mode, CoordinationMode::Hierarchical);
        assert!(decision.confidence > 0.5 && decision.confidence <= 1.0);
        assert!(!decision.directed);
    }

    #[test]
    fn test_equal_scores_prefer_lower_load_then_id() {
        let candidates = vec![
            descriptor("b", &["finance"], 0.0, 0.5),
            descriptor("a", &["finance"], 0.0, 0.5),
        ];
        let decision = selector().select(&Task::new("finance"), &candidates).unwrap();
        assert_eq!(decision.primary_agent, AgentId::new("a"));

        // Same score: the extra reliability of "a" exactly offsets its load.
        let candidates = vec![
            descriptor("a", &["finance"], 0.5, 0.9),
            descriptor("b", &["finance"], 0.0, 0.9 - 1.0 / 3.0),
        ];
        let decision = selector().select(&Task::new("finance"), &candidates).unwrap();
        assert_eq!(decision.primary_agent, AgentId::new("b"));
    }

    #[test]
    fn test_supporting_agents_capped_and_above_floor() {
        let mut candidates: Vec<AgentDescriptor> = (0..6)
            .map(|i| descriptor(&format!("fin_{i}"), &["finance"], 0.1 * i as f64, 0.5))
            .collect();
        candidates.push(descriptor("poet", &["poetry"], 0.0, 1.0));

        let decision = selector()
            .select(&Task::new("finance report"), &candidates)
            .unwrap();
        assert_eq!(decision.primary_agent, AgentId::new("fin_0"));
        assert_eq!(decision.supporting_agents.len(), 3);
        assert!(!decision.involves(&AgentId::new("poet")));
        assert_eq!(
            decision.supporting_agents,
            vec![AgentId::new("fin_1"), AgentId::new("fin_2"), AgentId::new("fin_3")]
        );
    }

    #[test]
    fn test_coordination_modes() {
        let candidates = vec![
            descriptor("a", &["finance"], 0.0, 0.5),
            descriptor("b", &["finance"], 0.1, 0.5),
            descriptor("c", &["finance"], 0.2, 0.5),
        ];

        let mut task = Task::new("finance");
        task.parallelizable = true;
        let decision = selector().select(&task, &candidates).unwrap();
        assert_eq!(decision.coordination_mode, CoordinationMode::ScatterGather);

        task.sequential = true;
        let decision = selector().select(&task, &candidates).unwrap();
        assert_eq!(decision.coordination_mode, CoordinationMode::Pipeline);

        let decision = selector().select(&task, &candidates[..2]).unwrap();
        assert_eq!(decision.coordination_mode, CoordinationMode::Pipeline);

        let mut task = Task::new("finance");
        task.parallelizable = true;
        let decision = selector().select(&task, &candidates[..2]).unwrap();
        assert_eq!(decision.coordination_mode, CoordinationMode::Hierarchical);
    }

    #[test]
    fn test_unavailable_and_unmatched_agents_are_not_eligible() {
        let mut down = descriptor("down", &["finance"], 0.0, 1.0);
        down.status = AgentStatus::Unavailable;
        let candidates = vec![down, descriptor("poet", &["poetry"], 0.0, 1.0)];

        let err = selector().select(&Task::new("finance"), &candidates).unwrap_err();
        assert_eq!(err, SelectionError::NoEligibleAgent { candidates: 2 });
        assert!(selector().select(&Task::new("finance"), &[]).is_err());
    }

    #[test]
    fn test_confidence_drops_with_complexity_and_load() {
        let candidates = vec![descriptor("a", &["finance"], 0.0, 0.5)];
        let simple = selector().select(&Task::new("finance"), &candidates).unwrap();

        let mut task = Task::new(format!("finance {}", "detail ".repeat(400)));
        task.multi_step = true;
        task.required_tools = vec!["a".into(), "b".into(), "c".into()];
        let busy = vec![descriptor("a", &["finance"], 0.9, 0.5)];
        let complex = selector().select(&task, &busy).unwrap();

        assert!(complex.confidence < simple.confidence);
        assert!(complex.confidence < 0.5);
    }

    #[test]
    fn test_tuning_changes_apply_to_next_selection() {
        let tuning = TuningHandle::default();
        let selector = SwarmSelector::new(tuning.clone());
        let candidates = vec![
            descriptor("capable", &["finance"], 0.0, 0.2),
            descriptor("reliable", &["finance", "legal"], 0.0, 1.0),
        ];
        let mut task = Task::new("finance question");
        task.required_capabilities = vec!["legal".into()];
        // capable: cap 0.5, reliable: cap 1.0
        assert_eq!(
            selector.select(&task, &candidates).unwrap().primary_agent,
            AgentId::new("reliable")
        );

        tuning.update(|t: &mut Tuning| {
            t.selection.weights = ScoreWeights {
                capability: 0.0,
                performance: 0.0,
                load: 1.0,
            };
            t.selection.capability_floor = 0.9;
        });
        let decision = selector.select(&task, &candidates).unwrap();
        assert_eq!(decision.primary_agent, AgentId::new("reliable"));
        assert!(decision.supporting_agents.is_empty());
    }

    #[test]
    fn test_directed_selection_honours_target() {
        let candidates = vec![
            descriptor("market_analyst", &["market"], 0.0, 0.5),
            descriptor("writer", &["writing"], 0.25, 0.5),
        ];
        let task = Task::new("market outlook");
        let decision = selector()
            .select_directed(&task, &AgentId::new("writer"), &candidates)
            .unwrap();
        assert!(decision.directed);
        assert_eq!(decision.primary_agent, AgentId::new("writer"));
        assert_eq!(decision.supporting_agents, vec![AgentId::new("market_analyst")]);

        let fallback = selector()
            .select_directed(&task, &AgentId::new("ghost"), &candidates)
            .unwrap();
        assert!(!fallback.directed);
        assert_eq!(fallback.primary_agent, AgentId::new("market_analyst"));
    }

    #[test]
    fn test_exploration_from_config_is_seeded() {
        let config = SelectionConfig {
            tuning: Default::default(),
            exploration: Some(ExplorationConfig {
                amplitude: 0.2,
                seed: 42,
            }),
        };
        let candidates: Vec<AgentDescriptor> = (0..4)
            .map(|i| descriptor(&format!("agent_{i}"), &["finance"], 0.0, 0.5))
            .collect();
        let run = || {
            let selector = SwarmSelector::from_config(TuningHandle::default(), &config);
            assert_eq!(selector.strategy_name(), "exploratory");
            (0..10)
                .map(|_| selector.select(&Task::new("finance"), &candidates).unwrap().primary_agent)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
        let plain =
            SwarmSelector::from_config(TuningHandle::default(), &SelectionConfig::default());
        assert_eq!(plain.strategy_name(), "weighted");
    }
}
