// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Audit Records
//!
//! Wire shape of one signed audit record. Entries are append-only: nothing
//! in the crate exposes a way to mutate or remove one after it was appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::execution::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    StateTransition,
    Decision,
    ToolInvocation,
    PermissionViolation,
    SecurityBlock,
    ImprovementApplied,
    Lifecycle,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::StateTransition => "state_transition",
            AuditEventType::Decision => "decision",
            AuditEventType::ToolInvocation => "tool_invocation",
            AuditEventType::PermissionViolation => "permission_violation",
            AuditEventType::SecurityBlock => "security_block",
            AuditEventType::ImprovementApplied => "improvement_applied",
            AuditEventType::Lifecycle => "lifecycle",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Process-wide, strictly increasing, starting at 1.
    pub sequence: u64,
    pub event_type: AuditEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    /// Hex SHA-256 of the canonical payload.
    pub payload_hash: String,
    /// Strictly increasing across the whole log.
    pub timestamp: DateTime<Utc>,
    /// Hex HMAC-SHA256 over event type, payload hash, timestamp, sequence and request id.
    pub signature: String,
    pub payload: Value,
}

impl AuditEntry {
    /// Value of a top-level payload field, if the payload is an object.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}
