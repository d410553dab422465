// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Profiling and Ranked Candidates
//!
//! - [`TaskProfile`]: requirements inferred from a task plus its complexity.
//! - [`RankedCandidate`]: one candidate's score breakdown after ranking.
//!
//! Requirements are the capability names (from the candidates' combined
//! vocabulary) that the task text mentions, plus any capabilities the task
//! declares explicitly. A capability like `market_analysis` is mentioned when
//! the text contains the whole name or any of its `_`/`-` separated parts.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::Serialize;
use switchyard_core::domain::agent::{AgentDescriptor, AgentId};
use switchyard_core::domain::execution::Task;

/// Characters of task text at which the size component saturates.
pub const SIZE_SATURATION_CHARS: f64 = 2000.0;

/// Required tools at which the tool component saturates.
pub const TOOL_SATURATION: f64 = 5.0;

/// Capability match reported when a task mentions no known capability.
pub const NEUTRAL_CAPABILITY_MATCH: f64 = 0.5;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "for", "from", "how", "i", "in",
    "is", "it", "me", "my", "of", "on", "or", "our", "please", "should", "that", "the", "this",
    "to", "we", "what", "when", "which", "who", "why", "with", "you", "your",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskProfile {
    /// Lowercased capability names the task needs.
    pub requirements: BTreeSet<String>,
    /// In `[0, 1]`.
    pub complexity: f64,
}

impl TaskProfile {
    pub fn analyze(task: &Task, candidates: &[AgentDescriptor]) -> Self {
        let tokens = tokenize(&task.text);
        let vocabulary: BTreeSet<String> = candidates
            .iter()
            .flat_map(|c| c.capabilities.iter())
            .map(|c| c.to_lowercase())
            .collect();

        let mut requirements: BTreeSet<String> = vocabulary
            .into_iter()
            .filter(|capability| mentions(&tokens, capability))
            .collect();
        requirements.extend(task.required_capabilities.iter().map(|c| c.to_lowercase()));

        Self {
            requirements,
            complexity: complexity(task),
        }
    }

    /// Share of the requirements the agent declares, or
    /// [`NEUTRAL_CAPABILITY_MATCH`] when nothing specific is required.
    pub fn capability_match(&self, agent: &AgentDescriptor) -> f64 {
        if self.requirements.is_empty() {
            return NEUTRAL_CAPABILITY_MATCH;
        }
        let matched = agent
            .capabilities
            .iter()
            .filter(|c| self.requirements.contains(&c.to_lowercase()))
            .count();
        matched as f64 / self.requirements.len() as f64
    }
}

/// `0.4·size + 0.3·tools + 0.3·multi_step`, each component in `[0, 1]`.
pub fn complexity(task: &Task) -> f64 {
    let size = (task.scan_text().chars().count() as f64 / SIZE_SATURATION_CHARS).min(1.0);
    let tools = (task.required_tools.len() as f64 / TOOL_SATURATION).min(1.0);
    let multi_step = if task.multi_step { 1.0 } else { 0.0 };
    (0.4 * size + 0.3 * tools + 0.3 * multi_step).clamp(0.0, 1.0)
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .flat_map(|t| {
            // "markets" mentions "market"
            let singular = t.strip_suffix('s').filter(|s| s.len() > 2).map(str::to_string);
            std::iter::once(t).chain(singular)
        })
        .collect()
}

fn mentions(tokens: &BTreeSet<String>, capability: &str) -> bool {
    tokens.contains(capability)
        || capability
            .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
            .filter(|part| part.len() > 2 && !STOPWORDS.contains(part))
            .any(|part| tokens.contains(part))
}

/// Score breakdown for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub agent_id: AgentId,
    pub score: f64,
    pub capability_match: f64,
    pub performance: f64,
    pub load: f64,
    /// Selectable and at or above the capability floor.
    pub eligible: bool,
}

impl RankedCandidate {
    /// Higher score first; then lower load; then smaller id. Scores are
    /// compared at 1e-9 resolution so float noise cannot reorder equals.
    pub fn rank_order(a: &Self, b: &Self) -> Ordering {
        quantize(b.score)
            .cmp(&quantize(a.score))
            .then_with(|| a.load.total_cmp(&b.load))
            .then_with(|| a.agent_id.cmp(&b.agent_id))
    }
}

fn quantize(score: f64) -> i64 {
    (score * 1e9).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::domain::agent::AgentStatus;
    use switchyard_core::domain::performance::PerformanceScore;

    fn descriptor(id: &str, caps: &[&str]) -> AgentDescriptor {
        AgentDescriptor {
            id: AgentId::new(id),
            capabilities: caps.iter().map(|c| c.to_string()).collect(),
            allowed_tools: Default::default(),
            load: 0.0,
            status: AgentStatus::Available,
            performance: PerformanceScore::cold(0.5),
        }
    }

    #[test]
    fn test_requirements_come_from_known_capabilities() {
        let candidates = vec![
            descriptor("market_analyst", &["market_analysis", "finance"]),
            descriptor("writer", &["writing"]),
        ];
        let profile =
            TaskProfile::analyze(&Task::new("Summarize the markets for ACME"), &candidates);
        assert_eq!(profile.requirements, ["market_analysis".to_string()].into_iter().collect());
        assert_eq!(profile.capability_match(&candidates[0]), 1.0);
        assert_eq!(profile.capability_match(&candidates[1]), 0.0);
    }

    #[test]
    fn test_declared_capabilities_are_required() {
        let candidates = vec![
            descriptor("a", &["finance"]),
            descriptor("b", &["finance", "legal"]),
        ];
        let mut task = Task::new("review the contract");
        task.required_capabilities = vec!["Legal".into(), "finance".into()];
        let profile = TaskProfile::analyze(&task, &candidates);
        assert_eq!(profile.capability_match(&candidates[0]), 0.5);
        assert_eq!(profile.capability_match(&candidates[1]), 1.0);
    }

    #[test]
    fn test_no_requirements_is_neutral() {
        let candidates = vec![descriptor("a", &["finance"])];
        let profile = TaskProfile::analyze(&Task::new("hello there"), &candidates);
        assert!(profile.requirements.is_empty());
        assert_eq!(profile.capability_match(&candidates[0]), NEUTRAL_CAPABILITY_MATCH);
    }

    #[test]
    fn test_complexity_components() {
        assert!(complexity(&Task::new("short")) < 0.01);

        let mut task = Task::new("x".repeat(4000));
        task.required_tools = (0..10).map(|i| format!("tool_{i}")).collect();
        task.multi_step = true;
        assert!((complexity(&task) - 1.0).abs() < 1e-9);

        let mut task = Task::new("");
        task.multi_step = true;
        assert!((complexity(&task) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_rank_order_tie_breaks() {
        let make = |id: &str, score: f64, load: f64| RankedCandidate {
            agent_id: AgentId::new(id),
            score,
            capability_match: 1.0,
            performance: 0.5,
            load,
            eligible: true,
        };
        let mut ranked = vec![
            make("b", 0.8, 0.0),
            make("a", 0.8, 0.0),
            make("c", 0.8 + 1e-12, 0.5),
            make("d", 0.9, 0.9),
        ];
        ranked.sort_by(RankedCandidate::rank_order);
        let order: Vec<&str> = ranked.iter().map(|r| r.agent_id.as_str()).collect();
        assert_eq!(order, vec!["d", "a", "b", "c"]);
    }
}
