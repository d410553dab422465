// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Orchestration Error Taxonomy
//!
//! | Variant | Retried | Effect |
//! |---------|---------|--------|
//! | `PermissionDenied` | never | user-visible failure, audited |
//! | `ToolExecution` | once | surfaced after retry |
//! | `ToolTimeout` | once | fallback to a supporting agent |
//! | `SecurityThreatDetected` | never | request fails, audited |
//! | `AgentUnavailable` | yes | selection re-runs without the agent |
//! | `RecursionLimitExceeded` | n/a | degraded aggregation |
//!
//! Callers key retry policy on [`ErrorKind`], never on message text.

use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;
use crate::domain::supervisor::SupervisorState;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrchestrationError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("agent '{0}' is already registered")]
    DuplicateAgent(AgentId),

    #[error("agent '{agent_id}' is not permitted to call tool '{tool}'")]
    PermissionDenied { agent_id: AgentId, tool: String },

    #[error("tool '{tool}' failed after {elapsed_ms}ms: {message}")]
    ToolExecution {
        tool: String,
        elapsed_ms: u64,
        message: String,
    },

    #[error("tool '{tool}' timed out after {elapsed_ms}ms")]
    ToolTimeout { tool: String, elapsed_ms: u64 },

    #[error("security threat detected (risk {risk:.2}): {summary}")]
    SecurityThreatDetected { risk: f64, summary: String },

    #[error("agent '{agent_id}' is unavailable: {reason}")]
    AgentUnavailable { agent_id: AgentId, reason: String },

    #[error("delegation limit of {limit} hops reached")]
    RecursionLimitExceeded { limit: u32 },

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("unknown agent '{0}'")]
    UnknownAgent(AgentId),

    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidToolArguments { tool: String, reason: String },

    #[error("invalid input schema for tool '{tool}': {reason}")]
    InvalidToolSchema { tool: String, reason: String },

    #[error("permissions for agent '{0}' were already granted")]
    PermissionsAlreadyGranted(AgentId),

    #[error("tool registry is not accepting this operation while {0}")]
    RegistryUnavailable(String),

    #[error("no eligible agent for task: {0}")]
    NoEligibleAgent(String),

    #[error("invalid supervisor transition {from} -> {to}")]
    InvalidTransition {
        from: SupervisorState,
        to: SupervisorState,
    },

    #[error("request deadline exceeded after {elapsed_ms}ms")]
    DeadlineExceeded { elapsed_ms: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by retry/backoff policy and in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Registration,
    PermissionDenied,
    ToolExecution,
    ToolTimeout,
    SecurityThreat,
    AgentUnavailable,
    RecursionLimit,
    InvalidInput,
    Unavailable,
    NoEligibleAgent,
    Timeout,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Registration => "registration",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::ToolExecution => "tool_execution",
            ErrorKind::ToolTimeout => "tool_timeout",
            ErrorKind::SecurityThreat => "security_threat",
            ErrorKind::AgentUnavailable => "agent_unavailable",
            ErrorKind::RecursionLimit => "recursion_limit",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::NoEligibleAgent => "no_eligible_agent",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl OrchestrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestrationError::DuplicateTool(_)
            | OrchestrationError::DuplicateAgent(_)
            | OrchestrationError::PermissionsAlreadyGranted(_)
            | OrchestrationError::InvalidToolSchema { .. } => ErrorKind::Registration,
            OrchestrationError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            OrchestrationError::ToolExecution { .. } => ErrorKind::ToolExecution,
            OrchestrationError::ToolTimeout { .. } => ErrorKind::ToolTimeout,
            OrchestrationError::SecurityThreatDetected { .. } => ErrorKind::SecurityThreat,
            OrchestrationError::AgentUnavailable { .. } => ErrorKind::AgentUnavailable,
            OrchestrationError::RecursionLimitExceeded { .. } => ErrorKind::RecursionLimit,
            OrchestrationError::UnknownTool(_)
            | OrchestrationError::UnknownAgent(_)
            | OrchestrationError::InvalidToolArguments { .. } => ErrorKind::InvalidInput,
            OrchestrationError::RegistryUnavailable(_) => ErrorKind::Unavailable,
            OrchestrationError::NoEligibleAgent(_) => ErrorKind::NoEligibleAgent,
            OrchestrationError::DeadlineExceeded { .. } => ErrorKind::Timeout,
            OrchestrationError::Cancelled => ErrorKind::Cancelled,
            OrchestrationError::InvalidTransition { .. } | OrchestrationError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestrationError::ToolExecution { .. }
                | OrchestrationError::ToolTimeout { .. }
                | OrchestrationError::AgentUnavailable { .. }
        )
    }

    /// Handler failures get one more attempt at the registry. Timeouts are
    /// left to the supervisor's fallback to another agent.
    pub fn retries_in_place(&self) -> bool {
        self.is_retryable() && self.kind() == ErrorKind::ToolExecution
    }
}
