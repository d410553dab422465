// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Supervisor State Machine
//!
//! ## Transition Table
//! | From | To | When |
//! |------|----|------|
//! | `Received` | `CacheCheck` | always |
//! | `CacheCheck` | `Respond` | cache hit |
//! | `CacheCheck` | `SecurityCheck` | cache miss or cache disabled |
//! | `SecurityCheck` | `Select` | risk below block threshold |
//! | `Select` | `Delegate` | eligible agent with enough confidence |
//! | `Delegate` | `Select` | chosen agent unavailable, re-select without it |
//! | `Delegate` | `AwaitResult` | agent invoked |
//! | `AwaitResult` | `Delegate` | agent failed, retry with a supporting agent |
//! | `AwaitResult` | `Select` | agent requested delegation |
//! | `AwaitResult` | `Aggregate` | agent done, or hop limit reached (degraded) |
//! | `Aggregate` | `Reflect` | always |
//! | `Reflect` | `Respond` | always |
//! | any non-terminal | `Failed` / `Escalated` | unrecoverable error / no viable agent |
//!
//! The runtime loop lives in `application::supervisor`; this module only
//! holds the pure pieces it is built from.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentFailure, AgentId};
use crate::domain::decision::Decision;
use crate::domain::execution::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupervisorState {
    Received,
    CacheCheck,
    SecurityCheck,
    Select,
    Delegate,
    AwaitResult,
    Aggregate,
    Reflect,
    Respond,
    Failed,
    Escalated,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorState::Received => "RECEIVED",
            SupervisorState::CacheCheck => "CACHE_CHECK",
            SupervisorState::SecurityCheck => "SECURITY_CHECK",
            SupervisorState::Select => "SELECT",
            SupervisorState::Delegate => "DELEGATE",
            SupervisorState::AwaitResult => "AWAIT_RESULT",
            SupervisorState::Aggregate => "AGGREGATE",
            SupervisorState::Reflect => "REFLECT",
            SupervisorState::Respond => "RESPOND",
            SupervisorState::Failed => "FAILED",
            SupervisorState::Escalated => "ESCALATED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SupervisorState::Respond | SupervisorState::Failed | SupervisorState::Escalated
        )
    }

    pub fn can_transition_to(&self, next: SupervisorState) -> bool {
        use SupervisorState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Failed | Escalated) {
            return true;
        }
        matches!(
            (self, next),
            (Received, CacheCheck)
                | (CacheCheck, Respond)
                | (CacheCheck, SecurityCheck)
                | (SecurityCheck, Select)
                | (Select, Delegate)
                | (Delegate, Select)
                | (Delegate, AwaitResult)
                | (AwaitResult, Delegate)
                | (AwaitResult, Select)
                | (AwaitResult, Aggregate)
                | (Aggregate, Reflect)
                | (Reflect, Respond)
        )
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge taken by the Supervisor for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: SupervisorState,
    pub to: SupervisorState,
}

/// Hooks for following a request through the state machine.
#[async_trait]
pub trait SupervisorObserver: Send + Sync {
    async fn on_transition(&self, request_id: RequestId, transition: Transition);
    async fn on_decision(&self, request_id: RequestId, decision: &Decision);
    async fn on_delegation(&self, request_id: RequestId, from: &AgentId, to: &AgentId, hop: u32);
    async fn on_agent_failure(
        &self,
        request_id: RequestId,
        agent_id: &AgentId,
        failure: &AgentFailure,
    );
}

/// Observer that ignores everything.
pub struct NoopObserver;

#[async_trait]
impl SupervisorObserver for NoopObserver {
    async fn on_transition(&self, _request_id: RequestId, _transition: Transition) {}
    async fn on_decision(&self, _request_id: RequestId, _decision: &Decision) {}
    async fn on_delegation(
        &self,
        _request_id: RequestId,
        _from: &AgentId,
        _to: &AgentId,
        _hop: u32,
    ) {
    }
    async fn on_agent_failure(
        &self,
        _request_id: RequestId,
        _agent_id: &AgentId,
        _failure: &AgentFailure,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::SupervisorState::*;
    use super::*;

    #[test]
    fn test_happy_path_is_legal() {
        let path = [
            Received,
            CacheCheck,
            SecurityCheck,
            Select,
            Delegate,
            AwaitResult,
            Aggregate,
            Reflect,
            Respond,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_terminal_states_are_reachable_from_any_step() {
        for state in [
            Received,
            CacheCheck,
            SecurityCheck,
            Select,
            Delegate,
            AwaitResult,
            Aggregate,
            Reflect,
        ] {
            assert!(state.can_transition_to(Failed));
            assert!(state.can_transition_to(Escalated));
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        for state in [Respond, Failed, Escalated] {
            assert!(!state.can_transition_to(Received));
            assert!(!state.can_transition_to(Failed));
        }
    }

    #[test]
    fn test_shortcuts_are_rejected() {
        assert!(!Received.can_transition_to(Select));
        assert!(!SecurityCheck.can_transition_to(Respond));
        assert!(!Select.can_transition_to(Aggregate));
        assert!(!Aggregate.can_transition_to(Respond));
    }

    #[test]
    fn test_state_names_match_wire_form() {
        assert_eq!(serde_json::to_string(&AwaitResult).unwrap(), "\"AWAIT_RESULT\"");
        assert_eq!(CacheCheck.to_string(), "CACHE_CHECK");
    }
}
