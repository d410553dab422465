// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure scoring types. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`swarm`] | `TaskProfile`, `RankedCandidate` |
//! | [`scoring`] | `ScoringStrategy`, `WeightedScoring`, `ExploratoryScoring` |

pub mod scoring;
pub mod swarm;

pub use scoring::*;
pub use swarm::*;
