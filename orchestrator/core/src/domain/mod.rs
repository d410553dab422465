// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Pure types and traits of the orchestration core. No I/O lives here.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`agent`] | `AgentId`, `AgentProfile`, `AgentDescriptor`, `Agent` |
//! | [`tool`] | `Tool`, `ToolSpec`, `ToolHandler`, `ToolAccess` |
//! | [`execution`] | `ExecutionContext`, `Task`, `OrchestrationRequest` |
//! | [`decision`] | `Decision`, `CoordinationMode`, `AgentSelector` |
//! | [`security`] | `ThreatFinding`, `RiskAssessment` |
//! | [`audit`] | `AuditEntry`, `AuditEventType` |
//! | [`supervisor`] | `SupervisorState`, `SupervisorObserver` |
//! | [`improvement`] | `ExecutionTrace`, `Improvement` |
//! | [`tuning`] | `TuningHandle` and the weights it guards |
//! | [`orchestrator_config`] | `OrchestratorConfigManifest` |

pub mod agent;
pub mod audit;
pub mod decision;
pub mod errors;
pub mod execution;
pub mod improvement;
pub mod llm;
pub mod orchestrator_config;
pub mod performance;
pub mod security;
pub mod supervisor;
pub mod tool;
pub mod tuning;
