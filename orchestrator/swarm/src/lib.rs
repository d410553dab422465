// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `switchyard-swarm`: Swarm-Style Agent Selection
//!
//! Scores every candidate agent for a task and turns the ranking into a
//! [`Decision`](switchyard_core::domain::decision::Decision): a primary agent,
//! up to a configured number of supporting agents, a coordination mode and a
//! confidence in `[0, 1]`.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `TaskProfile`, `ScoringStrategy`, `RankedCandidate` |
//! | [`application`] | Application | `SwarmSelector` (implements `AgentSelector`) |
//!
//! ## Determinism
//!
//! Scoring is a pure function of the task, the descriptor snapshot and the
//! current tuning. Ties break on lower load, then on the lexicographically
//! smaller agent id. Exploration jitter is only applied when a seeded
//! [`domain::scoring::ExploratoryScoring`] is injected.

pub mod application;
pub mod domain;

pub use application::SwarmSelector;
pub use domain::*;
