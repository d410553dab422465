// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution Context
//!
//! Per-request state owned by the Supervisor. One [`ExecutionContext`] is
//! created for each incoming [`OrchestrationRequest`] and dropped once the
//! response is sent. Requests never share a context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::domain::agent::{AgentId, PrivateState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Agent,
    Supervisor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    /// Agent id for agent messages; user id for user messages.
    pub author: String,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(user_id: &str, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            author: user_id.to_string(),
            content: content.into(),
            at: Utc::now(),
        }
    }

    pub fn agent(agent_id: &AgentId, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Agent,
            author: agent_id.to_string(),
            content: content.into(),
            at: Utc::now(),
        }
    }
}

/// Caller identity plus the scanner's verdict for this request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityContext {
    pub principal: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Set when the risk score landed in the monitored band.
    #[serde(default)]
    pub monitored: bool,
    #[serde(default)]
    pub risk_score: f64,
}

impl SecurityContext {
    pub fn for_principal(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            ..Default::default()
        }
    }
}

/// The unit of work routed by the Supervisor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Task {
    pub text: String,
    /// Structured input forwarded to agents untouched.
    pub payload: Value,
    /// Used to key the performance ledger (`general` when absent).
    pub task_type: Option<String>,
    pub required_tools: Vec<String>,
    pub required_capabilities: Vec<String>,
    pub multi_step: bool,
    pub sequential: bool,
    pub parallelizable: bool,
}

impl Task {
    pub const GENERAL: &'static str = "general";

    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn task_type(&self) -> &str {
        self.task_type.as_deref().unwrap_or(Self::GENERAL)
    }

    /// Text the scanner and cache look at: the request text plus any payload.
    pub fn scan_text(&self) -> String {
        if self.payload.is_null() {
            self.text.clone()
        } else {
            format!("{}\n{}", self.text, self.payload)
        }
    }
}

/// Inbound request, either decoded from an envelope or built directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationRequest {
    pub request_id: RequestId,
    pub user_id: String,
    pub task: Task,
    pub security: SecurityContext,
}

impl OrchestrationRequest {
    pub fn new(user_id: impl Into<String>, task: Task) -> Self {
        let user_id = user_id.into();
        Self {
            request_id: RequestId::new(),
            security: SecurityContext::for_principal(user_id.clone()),
            user_id,
            task,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub request_id: RequestId,
    pub user_id: String,
    pub task: Task,
    history: Vec<ConversationMessage>,
    pub security: SecurityContext,
    private_state: PrivateState,
    /// Number of agent-requested delegations followed so far.
    pub hop: u32,
    /// How many history messages agents should look at.
    pub context_window: usize,
}

impl ExecutionContext {
    pub fn new(request: &OrchestrationRequest, context_window: usize) -> Self {
        Self {
            request_id: request.request_id,
            user_id: request.user_id.clone(),
            task: request.task.clone(),
            history: vec![ConversationMessage::user(&request.user_id, request.task.text.clone())],
            security: request.security.clone(),
            private_state: PrivateState::new(),
            hop: 0,
            context_window,
        }
    }

    /// Append-only within a request.
    pub fn push_message(&mut self, message: ConversationMessage) {
        self.history.push(message);
    }

    pub fn history(&self) -> &[ConversationMessage] {
        &self.history
    }

    /// The tail of the conversation that fits the configured window.
    pub fn recent_history(&self) -> &[ConversationMessage] {
        let start = self.history.len().saturating_sub(self.context_window.max(1));
        &self.history[start..]
    }

    pub fn private_state(&self, agent_id: &AgentId) -> Option<&Value> {
        self.private_state.get(agent_id)
    }

    pub fn set_private_state(&mut self, agent_id: AgentId, state: Value) {
        self.private_state.insert(agent_id, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_deserializes_with_defaults() {
        let task: Task =
            serde_json::from_str(r#"{"text":"plan a launch","multiStep":true}"#).unwrap();
        assert_eq!(task.text, "plan a launch");
        assert!(task.multi_step);
        assert!(!task.sequential);
        assert_eq!(task.task_type(), Task::GENERAL);
    }

    #[test]
    fn test_recent_history_respects_window() {
        let request = OrchestrationRequest::new("u-1", Task::new("hello"));
        let mut ctx = ExecutionContext::new(&request, 2);
        let agent = AgentId::new("writer");
        ctx.push_message(ConversationMessage::agent(&agent, "one"));
        ctx.push_message(ConversationMessage::agent(&agent, "two"));

        assert_eq!(ctx.history().len(), 3);
        let recent = ctx.recent_history();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "one");
        assert_eq!(recent[1].content, "two");
    }

    #[test]
    fn test_private_state_is_per_agent() {
        let request = OrchestrationRequest::new("u-1", Task::new("hello"));
        let mut ctx = ExecutionContext::new(&request, 8);
        let a = AgentId::new("a");
        ctx.set_private_state(a.clone(), serde_json::json!({"step": 1}));
        assert_eq!(ctx.private_state(&a).unwrap()["step"], 1);
        assert!(ctx.private_state(&AgentId::new("b")).is_none());
    }

    #[test]
    fn test_scan_text_includes_payload() {
        let mut task = Task::new("summarize");
        assert_eq!(task.scan_text(), "summarize");
        task.payload = serde_json::json!({"doc": "q3"});
        assert!(task.scan_text().contains("q3"));
    }
}
