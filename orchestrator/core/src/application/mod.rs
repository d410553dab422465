// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod bootstrap;
pub mod reflection;
pub mod supervisor;

pub use bootstrap::{Orchestrator, OrchestratorBuilder};
pub use reflection::{ReflectionBounds, ReflectionEngine};
pub use supervisor::{
    OrchestrationResponse, ResponseError, ResponseStatus, Supervisor, SupervisorComponents,
};
