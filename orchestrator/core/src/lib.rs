// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `switchyard-core`
//!
//! Routes a request to one of many specialized agents, each limited to a
//! permission-scoped set of tools.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | agents, tools, decisions, audit records, config manifest |
//! | [`infrastructure`] | Infrastructure | registry, scanner, cache, ledger, audit log, envelope, adapters |
//! | [`application`] | Application | Supervisor loop, reflection, bootstrap |
//!
//! Agent selection plugs in through [`domain::decision::AgentSelector`]; the
//! swarm heuristic lives in the `switchyard-swarm` crate.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
