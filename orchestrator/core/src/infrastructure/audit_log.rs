// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Signed Audit Log
//!
//! Append-only record of every decision, state transition and tool
//! invocation. Each entry carries a SHA-256 hash of its payload and an
//! HMAC-SHA256 signature over `(event, payload hash, timestamp, sequence,
//! request id)`.
//!
//! ## Ordering
//!
//! Appends are serialized under one lock. Sequence numbers and timestamps
//! are both strictly increasing across the whole log, so entries of one
//! request are totally ordered even when two appends land in the same
//! clock tick. Entries of different requests may interleave.
//!
//! Appended entries are also broadcast to subscribers (CLI tailing, tests).

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::audit::{AuditEntry, AuditEventType};
use crate::domain::execution::RequestId;
use crate::infrastructure::signing::{canonical_json, sha256_hex, HmacSigner};

struct LogState {
    entries: Vec<AuditEntry>,
    last_timestamp: Option<DateTime<Utc>>,
}

pub struct AuditLog {
    signer: HmacSigner,
    state: Mutex<LogState>,
    stream: broadcast::Sender<AuditEntry>,
}

impl AuditLog {
    pub fn new(signer: HmacSigner, stream_capacity: usize) -> Self {
        let (stream, _) = broadcast::channel(stream_capacity.max(1));
        Self {
            signer,
            state: Mutex::new(LogState {
                entries: Vec::new(),
                last_timestamp: None,
            }),
            stream,
        }
    }

    /// Log with an ephemeral signing key, mostly for tests.
    pub fn ephemeral() -> Self {
        Self::new(HmacSigner::ephemeral(), 1024)
    }

    pub fn append(
        &self,
        event_type: AuditEventType,
        request_id: Option<RequestId>,
        payload: Value,
    ) -> AuditEntry {
        let payload_hash = sha256_hex(canonical_json(&payload).as_bytes());

        let entry = {
            let mut state = self.state.lock();
            let sequence = state.entries.len() as u64 + 1;

            let now = Utc::now();
            let timestamp = match state.last_timestamp {
                Some(last) if now <= last => last + ChronoDuration::microseconds(1),
                _ => now,
            };
            state.last_timestamp = Some(timestamp);

            let input = signing_input(event_type, &payload_hash, &timestamp, sequence, request_id);
            let signature = self.signer.sign(input.as_bytes());

            let entry = AuditEntry {
                sequence,
                event_type,
                request_id,
                payload_hash,
                timestamp,
                signature,
                payload,
            };
            state.entries.push(entry.clone());
            entry
        };

        debug!(
            sequence = entry.sequence,
            event = entry.event_type.as_str(),
            request_id = ?entry.request_id,
            "Audit entry appended"
        );
        // No subscribers is fine
        let _ = self.stream.send(entry.clone());
        entry
    }

    /// Checks both the payload hash and the signature.
    pub fn verify(&self, entry: &AuditEntry) -> bool {
        if sha256_hex(canonical_json(&entry.payload).as_bytes()) != entry.payload_hash {
            return false;
        }
        let input = signing_input(
            entry.event_type,
            &entry.payload_hash,
            &entry.timestamp,
            entry.sequence,
            entry.request_id,
        );
        self.signer.verify(input.as_bytes(), &entry.signature)
    }

    /// Sequence number of the first entry that fails verification, if any.
    pub fn verify_all(&self) -> Result<(), u64> {
        let state = self.state.lock();
        for entry in &state.entries {
            if !self.verify(entry) {
                return Err(entry.sequence);
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.state.lock().entries.clone()
    }

    pub fn entries_for(&self, request_id: RequestId) -> Vec<AuditEntry> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| e.request_id == Some(request_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEntry> {
        self.stream.subscribe()
    }
}

fn signing_input(
    event_type: AuditEventType,
    payload_hash: &str,
    timestamp: &DateTime<Utc>,
    sequence: u64,
    request_id: Option<RequestId>,
) -> String {
    canonical_json(&json!({
        "eventType": event_type.as_str(),
        "payloadHash": payload_hash,
        "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        "sequence": sequence,
        "requestId": request_id.map(|id| id.to_string()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_and_timestamps_strictly_increase() {
        let log = AuditLog::ephemeral();
        let request = RequestId::new();
        for i in 0..50 {
            log.append(AuditEventType::StateTransition, Some(request), json!({ "i": i }));
        }
        let entries = log.entries_for(request);
        assert_eq!(entries.len(), 50);
        for pair in entries.windows(2) {
            assert!(pair[0].sequence < pair[1].sequence);
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[test]
    fn test_entries_verify() {
        let log = AuditLog::ephemeral();
        let entry = log.append(AuditEventType::Decision, None, json!({"primary": "a"}));
        assert!(log.verify(&entry));
        assert!(log.verify_all().is_ok());
    }

    #[test]
    fn test_tampered_entry_fails_verification() {
        let log = AuditLog::ephemeral();
        let entry = log.append(AuditEventType::ToolInvocation, None, json!({"tool": "web_search"}));

        let mut tampered = entry.clone();
        tampered.payload = json!({"tool": "send_email"});
        assert!(!log.verify(&tampered));

        let mut resigned = entry.clone();
        resigned.timestamp = entry.timestamp + ChronoDuration::seconds(1);
        assert!(!log.verify(&resigned));
    }

    #[test]
    fn test_entries_for_filters_by_request() {
        let log = AuditLog::ephemeral();
        let a = RequestId::new();
        let b = RequestId::new();
        log.append(AuditEventType::StateTransition, Some(a), json!({}));
        log.append(AuditEventType::StateTransition, Some(b), json!({}));
        log.append(AuditEventType::StateTransition, Some(a), json!({}));
        assert_eq!(log.entries_for(a).len(), 2);
        assert_eq!(log.entries_for(b).len(), 1);
        assert_eq!(log.len(), 3);
    }

    #[tokio::test]
    async fn test_subscribers_receive_entries() {
        let log = AuditLog::ephemeral();
        let mut rx = log.subscribe();
        log.append(AuditEventType::Lifecycle, None, json!({"event": "initialized"}));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, AuditEventType::Lifecycle);
        assert_eq!(received.sequence, 1);
    }
}
