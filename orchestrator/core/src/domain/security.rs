// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Threat Classification Types
//!
//! Value objects produced by the security scanner. Findings are ephemeral:
//! they live for one request and only survive in the audit entry they feed.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatCategory {
    PrivilegeEscalation,
    CodeInjection,
    SensitiveDataExposure,
    IntegrityOnly,
}

impl ThreatCategory {
    pub const ALL: [ThreatCategory; 4] = [
        ThreatCategory::PrivilegeEscalation,
        ThreatCategory::CodeInjection,
        ThreatCategory::SensitiveDataExposure,
        ThreatCategory::IntegrityOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatCategory::PrivilegeEscalation => "privilege_escalation",
            ThreatCategory::CodeInjection => "code_injection",
            ThreatCategory::SensitiveDataExposure => "sensitive_data_exposure",
            ThreatCategory::IntegrityOnly => "integrity_only",
        }
    }
}

impl fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Multiplier applied to the category weight.
    pub fn factor(&self) -> f64 {
        match self {
            Severity::Low => 0.3,
            Severity::Medium => 0.6,
            Severity::High => 0.85,
            Severity::Critical => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatFinding {
    pub category: ThreatCategory,
    pub detected: bool,
    /// Highest severity among matching patterns, `None` when not detected.
    pub severity: Option<Severity>,
    /// Descriptions of the patterns that matched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched: Vec<String>,
}

impl ThreatFinding {
    pub fn clear(category: ThreatCategory) -> Self {
        Self {
            category,
            detected: false,
            severity: None,
            matched: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Clear,
    Monitored,
    Blocked,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Clear => "clear",
            RiskLevel::Monitored => "monitored",
            RiskLevel::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// In `[0, 1]`.
    pub risk_score: f64,
    pub level: RiskLevel,
    /// One finding per category, in [`ThreatCategory::ALL`] order.
    pub findings: Vec<ThreatFinding>,
}

impl RiskAssessment {
    pub fn is_blocked(&self) -> bool {
        self.level == RiskLevel::Blocked
    }

    pub fn is_monitored(&self) -> bool {
        self.level == RiskLevel::Monitored
    }

    pub fn detected(&self) -> impl Iterator<Item = &ThreatFinding> {
        self.findings.iter().filter(|f| f.detected)
    }

    /// Short human-readable summary, e.g. `privilege_escalation(critical)`.
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .detected()
            .map(|f| match f.severity {
                Some(sev) => format!("{}({:?})", f.category, sev).to_lowercase(),
                None => f.category.to_string(),
            })
            .collect();
        if parts.is_empty() {
            "no threats detected".to_string()
        } else {
            parts.join(", ")
        }
    }
}
