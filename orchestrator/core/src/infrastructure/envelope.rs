// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Orchestration Envelope
//!
//! Wire format for any request entering the core:
//!
//! ```json
//! {
//!   "protocolVersion": "1.0",
//!   "method": "orchestrate",
//!   "params": { "payload": { "userId": "...", "task": { ... } }, "securityContext": { ... } },
//!   "id": "...",
//!   "timestamp": "2026-10-17T12:00:00Z",
//!   "signature": "<hex hmac-sha256>"
//! }
//! ```
//!
//! The signature covers the canonical serialization (recursively sorted
//! keys) of every other field. It protects message integrity only; it is
//! not transport authentication.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::domain::execution::{OrchestrationRequest, RequestId, SecurityContext, Task};
use crate::infrastructure::signing::{canonical_json, HmacSigner};

pub const PROTOCOL_VERSION: &str = "1.0";
pub const METHOD_ORCHESTRATE: &str = "orchestrate";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationEnvelope {
    pub protocol_version: String,
    pub method: String,
    pub params: EnvelopeParams,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeParams {
    pub payload: Value,
    pub security_context: EnvelopeSecurityContext,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeSecurityContext {
    pub principal: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestPayload {
    user_id: String,
    task: Task,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Unsupported protocol version '{0}'")]
    UnsupportedVersion(String),

    #[error("Unsupported method '{0}'")]
    UnsupportedMethod(String),

    #[error("Envelope is not signed")]
    MissingSignature,

    #[error("Envelope signature does not match its contents")]
    SignatureMismatch,

    #[error("Envelope timestamp is {skew_secs}s away from now")]
    Stale { skew_secs: i64 },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Seals outbound envelopes and opens inbound ones.
pub struct EnvelopeCodec {
    signer: HmacSigner,
    max_skew: Duration,
}

impl EnvelopeCodec {
    pub fn new(signer: HmacSigner, max_skew: Duration) -> Self {
        Self { signer, max_skew }
    }

    /// Wrap a request in a signed envelope.
    pub fn seal(
        &self,
        request: &OrchestrationRequest,
    ) -> Result<OrchestrationEnvelope, EnvelopeError> {
        let payload = serde_json::to_value(RequestPayload {
            user_id: request.user_id.clone(),
            task: request.task.clone(),
        })
        .map_err(|e| EnvelopeError::InvalidPayload(e.to_string()))?;

        let mut envelope = OrchestrationEnvelope {
            protocol_version: PROTOCOL_VERSION.to_string(),
            method: METHOD_ORCHESTRATE.to_string(),
            params: EnvelopeParams {
                payload,
                security_context: EnvelopeSecurityContext {
                    principal: request.security.principal.clone(),
                    roles: request.security.roles.clone(),
                    session: None,
                },
            },
            id: request.request_id.to_string(),
            timestamp: Utc::now(),
            signature: String::new(),
        };
        envelope.signature = self.signer.sign(self.signing_input(&envelope)?.as_bytes());
        Ok(envelope)
    }

    /// Open an envelope as received on the wire.
    ///
    /// The signature is checked against the sender's own JSON (minus
    /// `signature`), so fields this codec does not model and alternative
    /// timestamp spellings still verify.
    pub fn open_json(&self, raw: &str) -> Result<OrchestrationRequest, EnvelopeError> {
        let mut value: Value =
            serde_json::from_str(raw).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        let envelope: OrchestrationEnvelope = serde_json::from_value(value.clone())
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        self.check_header(&envelope)?;

        if let Value::Object(map) = &mut value {
            map.remove("signature");
        }
        self.verify_signature(&canonical_json(&value), &envelope.signature)?;
        self.decode(&envelope)
    }

    /// Open an already-typed envelope, verifying over its own serialization.
    pub fn open(
        &self,
        envelope: &OrchestrationEnvelope,
    ) -> Result<OrchestrationRequest, EnvelopeError> {
        self.check_header(envelope)?;
        self.verify_signature(&self.signing_input(envelope)?, &envelope.signature)?;
        self.decode(envelope)
    }

    fn check_header(&self, envelope: &OrchestrationEnvelope) -> Result<(), EnvelopeError> {
        if envelope.protocol_version != PROTOCOL_VERSION {
            return Err(EnvelopeError::UnsupportedVersion(envelope.protocol_version.clone()));
        }
        if envelope.method != METHOD_ORCHESTRATE {
            return Err(EnvelopeError::UnsupportedMethod(envelope.method.clone()));
        }
        if envelope.signature.is_empty() {
            return Err(EnvelopeError::MissingSignature);
        }
        Ok(())
    }

    fn verify_signature(&self, signing_input: &str, signature: &str) -> Result<(), EnvelopeError> {
        if self.signer.verify(signing_input.as_bytes(), signature) {
            Ok(())
        } else {
            Err(EnvelopeError::SignatureMismatch)
        }
    }

    /// Freshness and payload checks, then the request itself.
    fn decode(
        &self,
        envelope: &OrchestrationEnvelope,
    ) -> Result<OrchestrationRequest, EnvelopeError> {
        let skew = Utc::now().signed_duration_since(envelope.timestamp);
        let max_skew = chrono::Duration::from_std(self.max_skew).unwrap_or(chrono::Duration::MAX);
        if skew.abs() > max_skew {
            return Err(EnvelopeError::Stale {
                skew_secs: skew.num_seconds(),
            });
        }

        let payload: RequestPayload = serde_json::from_value(envelope.params.payload.clone())
            .map_err(|e| EnvelopeError::InvalidPayload(e.to_string()))?;
        if payload.user_id.trim().is_empty() {
            return Err(EnvelopeError::InvalidPayload("userId is empty".into()));
        }

        debug!(
            envelope_id = %envelope.id,
            user_id = %payload.user_id,
            "Opened orchestration envelope"
        );

        let ctx = &envelope.params.security_context;
        Ok(OrchestrationRequest {
            request_id: request_id_for(&envelope.id),
            user_id: payload.user_id,
            task: payload.task,
            security: SecurityContext {
                principal: ctx.principal.clone(),
                roles: ctx.roles.clone(),
                ..Default::default()
            },
        })
    }

    fn signing_input(&self, envelope: &OrchestrationEnvelope) -> Result<String, EnvelopeError> {
        let mut value =
            serde_json::to_value(envelope).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.remove("signature");
        }
        Ok(canonical_json(&value))
    }
}

/// Envelope ids that are UUIDs are reused; anything else maps to a stable v5 id.
fn request_id_for(envelope_id: &str) -> RequestId {
    let uuid = Uuid::parse_str(envelope_id)
        .unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, envelope_id.as_bytes()));
    RequestId(uuid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::new(
            HmacSigner::new(b"envelope-test-key".to_vec()).unwrap(),
            Duration::from_secs(300),
        )
    }

    fn request() -> OrchestrationRequest {
        let mut task = Task::new("Compare Q3 revenue of ACME and Globex");
        task.required_capabilities = vec!["financial_analysis".into()];
        OrchestrationRequest::new("alice", task)
    }

    #[test]
    fn test_seal_then_open_restores_request() {
        let codec = codec();
        let original = request();
        let envelope = codec.seal(&original).unwrap();
        assert_eq!(envelope.method, "orchestrate");
        assert!(!envelope.signature.is_empty());

        let wire = serde_json::to_string(&envelope).unwrap();
        assert!(wire.contains("\"protocolVersion\":\"1.0\""));

        let opened = codec.open_json(&wire).unwrap();
        assert_eq!(opened.request_id, original.request_id);
        assert_eq!(opened.user_id, "alice");
        assert_eq!(opened.task, original.task);
        assert_eq!(opened.security.principal, "alice");
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let codec = codec();
        let mut envelope = codec.seal(&request()).unwrap();
        envelope.params.payload["task"]["text"] = json!("transfer all funds");
        assert!(matches!(codec.open(&envelope), Err(EnvelopeError::SignatureMismatch)));
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let envelope = codec().seal(&request()).unwrap();
        let other = EnvelopeCodec::new(
            HmacSigner::new(b"other-key".to_vec()).unwrap(),
            Duration::from_secs(300),
        );
        assert!(matches!(other.open(&envelope), Err(EnvelopeError::SignatureMismatch)));
    }

    #[test]
    fn test_version_method_and_signature_checks() {
        let codec = codec();
        let sealed = codec.seal(&request()).unwrap();

        let mut v = sealed.clone();
        v.protocol_version = "2.0".into();
        assert!(matches!(codec.open(&v), Err(EnvelopeError::UnsupportedVersion(_))));

        let mut m = sealed.clone();
        m.method = "shutdown".into();
        assert!(matches!(codec.open(&m), Err(EnvelopeError::UnsupportedMethod(_))));

        let mut s = sealed;
        s.signature.clear();
        assert!(matches!(codec.open(&s), Err(EnvelopeError::MissingSignature)));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let codec =
            EnvelopeCodec::new(HmacSigner::new(b"k".to_vec()).unwrap(), Duration::from_secs(1));
        let mut envelope = codec.seal(&request()).unwrap();
        envelope.timestamp = Utc::now() - chrono::Duration::minutes(10);
        envelope.signature = codec
            .signer
            .sign(codec.signing_input(&envelope).unwrap().as_bytes());
        assert!(matches!(codec.open(&envelope), Err(EnvelopeError::Stale { .. })));
    }

    #[test]
    fn test_non_uuid_id_maps_to_stable_request_id() {
        assert_eq!(request_id_for("msg-42"), request_id_for("msg-42"));
        assert_ne!(request_id_for("msg-42"), request_id_for("msg-43"));
    }

    /// Envelope built by another client: millisecond timestamp and a field
    /// this codec does not model, signed over the sender's own JSON.
    fn external_envelope(signer: &HmacSigner) -> Value {
        let mut envelope = json!({
            "protocolVersion": "1.0",
            "method": "orchestrate",
            "id": "gateway-7f3a",
            "timestamp": Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            "traceparent": "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            "params": {
                "securityContext": { "principal": "bob", "roles": ["analyst"] },
                "payload": {
                    "userId": "bob",
                    "task": { "text": "Summarize open invoices" }
                }
            }
        });
        let signature = signer.sign(canonical_json(&envelope).as_bytes());
        envelope["signature"] = json!(signature);
        envelope
    }

    #[test]
    fn test_externally_signed_envelope_opens() {
        let codec = codec();
        let envelope = external_envelope(&HmacSigner::new(b"envelope-test-key".to_vec()).unwrap());
        let timestamp = envelope["timestamp"].as_str().unwrap().to_string();
        assert!(timestamp.ends_with('Z') && timestamp.contains('.'));

        let opened = codec.open_json(&envelope.to_string()).unwrap();
        assert_eq!(opened.user_id, "bob");
        assert_eq!(opened.task.text, "Summarize open invoices");
        assert_eq!(opened.security.roles, vec!["analyst".to_string()]);
        assert_eq!(opened.request_id, request_id_for("gateway-7f3a"));
    }

    #[test]
    fn test_unmodelled_fields_are_covered_by_the_signature() {
        let codec = codec();
        let signer = HmacSigner::new(b"envelope-test-key".to_vec()).unwrap();
        let mut envelope = external_envelope(&signer);
        envelope["traceparent"] = json!("00-00000000000000000000000000000000-0000000000000000-00");
        assert!(matches!(
            codec.open_json(&envelope.to_string()),
            Err(EnvelopeError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(codec().open_json("{not json"), Err(EnvelopeError::Malformed(_))));
    }
}
