// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Domain Types
//!
//! Workers that execute a task and optionally ask the Supervisor to delegate
//! to another worker. The Supervisor only ever sees agents through the
//! [`Agent`] trait and the [`AgentDescriptor`] snapshot used for selection.
//!
//! Agents never raise: every failure comes back as an [`AgentFailure`] value
//! tagged with an [`AgentFailureKind`] so retry policy can key on it.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::OrchestrationError;
use crate::domain::execution::ExecutionContext;
use crate::domain::performance::PerformanceScore;
use crate::domain::tool::ToolAccess;

/// Stable, human-assigned agent identifier (e.g. `market-analyst`).
///
/// Ordering is lexicographic, which is what selection tie-breaking relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Availability of an agent as seen by the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Available,
    /// At its concurrency ceiling; still selectable but scored down by load.
    Saturated,
    /// Failed a health check or was marked down. Never selected.
    Unavailable,
}

/// Static registration data for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Tool names this agent may be handed. Resolved against the registry at
    /// call time; names the registry does not know are skipped.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    4
}

impl AgentProfile {
    pub fn new(id: impl Into<AgentId>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            capabilities: Vec::new(),
            allowed_tools: Vec::new(),
            max_concurrency: default_max_concurrency(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }
}

/// Point-in-time view of an agent handed to the selector.
///
/// Built from the profile plus the ledger's load and reliability figures.
/// Selection only reads snapshots, so identical snapshots always produce
/// identical decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub capabilities: BTreeSet<String>,
    pub allowed_tools: BTreeSet<String>,
    /// Current load estimate in `[0, 1]`.
    pub load: f64,
    pub status: AgentStatus,
    pub performance: PerformanceScore,
}

impl AgentDescriptor {
    pub fn is_selectable(&self) -> bool {
        self.status != AgentStatus::Unavailable
    }
}

/// Successful agent turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentReply {
    pub response_messages: Vec<String>,
    /// Ask the Supervisor to delegate to another agent next.
    pub next_agent: Option<AgentId>,
    pub tools_used: Vec<String>,
    /// Replaces this agent's private state in the execution context.
    pub updated_private_state: Option<Value>,
}

impl AgentReply {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            response_messages: vec![text.into()],
            ..Default::default()
        }
    }

    pub fn delegate_to(mut self, agent: impl Into<AgentId>) -> Self {
        self.next_agent = Some(agent.into());
        self
    }

    pub fn with_private_state(mut self, state: Value) -> Self {
        self.updated_private_state = Some(state);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentFailureKind {
    ToolTimeout,
    ToolFailure,
    PermissionDenied,
    SecurityThreat,
    Unavailable,
    GenerationTimeout,
    GenerationFailed,
    /// The agent itself ran past its invocation timeout.
    Timeout,
    Cancelled,
    Internal,
}

impl AgentFailureKind {
    /// Whether the Supervisor may hand the task to a supporting agent.
    pub fn allows_fallback(&self) -> bool {
        !matches!(
            self,
            AgentFailureKind::PermissionDenied
                | AgentFailureKind::SecurityThreat
                | AgentFailureKind::Cancelled
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            AgentFailureKind::ToolTimeout
                | AgentFailureKind::GenerationTimeout
                | AgentFailureKind::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentFailureKind::ToolTimeout => "tool_timeout",
            AgentFailureKind::ToolFailure => "tool_failure",
            AgentFailureKind::PermissionDenied => "permission_denied",
            AgentFailureKind::SecurityThreat => "security_threat",
            AgentFailureKind::Unavailable => "unavailable",
            AgentFailureKind::GenerationTimeout => "generation_timeout",
            AgentFailureKind::GenerationFailed => "generation_failed",
            AgentFailureKind::Timeout => "timeout",
            AgentFailureKind::Cancelled => "cancelled",
            AgentFailureKind::Internal => "internal",
        }
    }
}

/// Tagged agent failure. Agents return this instead of panicking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct AgentFailure {
    pub kind: AgentFailureKind,
    pub message: String,
}

impl AgentFailure {
    pub fn new(kind: AgentFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<OrchestrationError> for AgentFailure {
    fn from(err: OrchestrationError) -> Self {
        let kind = match &err {
            OrchestrationError::PermissionDenied { .. } => AgentFailureKind::PermissionDenied,
            OrchestrationError::ToolTimeout { .. } => AgentFailureKind::ToolTimeout,
            OrchestrationError::ToolExecution { .. }
            | OrchestrationError::InvalidToolArguments { .. }
            | OrchestrationError::UnknownTool(_) => AgentFailureKind::ToolFailure,
            OrchestrationError::SecurityThreatDetected { .. } => AgentFailureKind::SecurityThreat,
            OrchestrationError::AgentUnavailable { .. } => AgentFailureKind::Unavailable,
            OrchestrationError::Cancelled => AgentFailureKind::Cancelled,
            OrchestrationError::DeadlineExceeded { .. } => AgentFailureKind::Timeout,
            _ => AgentFailureKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

/// Worker contract consumed by the Supervisor.
///
/// `tools` is already scoped to this agent's permission list; anything the
/// agent calls through it is permission-checked, scanned and audited.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &AgentId;

    async fn invoke(
        &self,
        ctx: &ExecutionContext,
        tools: &dyn ToolAccess,
    ) -> Result<AgentReply, AgentFailure>;

    async fn health_check(&self) -> bool {
        true
    }
}

/// Private state keyed by agent, carried across hops of one request.
pub type PrivateState = HashMap<AgentId, Value>;
