// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Security Scanner
//!
//! Stateless threat classifier run before a task executes and before every
//! tool call an agent makes. Matching is pure regex evaluation, so identical
//! input always yields an identical assessment.
//!
//! ## Scoring
//!
//! Each category that matches contributes `weight(category) * severity`,
//! where severity is the highest tier among its matching patterns. The
//! contributions are combined with a noisy-OR:
//!
//! ```text
//! risk = 1 - Π (1 - contribution)
//! ```
//!
//! | Risk | Outcome |
//! |------|---------|
//! | `>= block` (0.7) | blocked, `SecurityThreatDetected` |
//! | `>= monitor` (0.3) | proceeds, context tagged monitored |
//! | below | proceeds untagged |

use metrics::counter;
use regex::Regex;
use tracing::{debug, warn};

use crate::domain::agent::AgentId;
use crate::domain::orchestrator_config::{CategoryWeights, PatternConfig, SecurityConfig};
use crate::domain::security::{RiskAssessment, RiskLevel, Severity, ThreatCategory, ThreatFinding};

struct CompiledPattern {
    category: ThreatCategory,
    severity: Severity,
    regex: Regex,
    description: String,
}

impl CompiledPattern {
    fn compile(
        category: ThreatCategory,
        severity: Severity,
        pattern: &str,
        description: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            category,
            severity,
            regex: Regex::new(pattern)?,
            description: description.to_string(),
        })
    }

    fn from_config(config: &PatternConfig) -> Result<Self, regex::Error> {
        let description = config.description.clone().unwrap_or_else(|| config.pattern.clone());
        Self::compile(config.category, config.severity, &config.pattern, &description)
    }
}

const BUILTIN_PATTERNS: &[(ThreatCategory, Severity, &str, &str)] = &[
    (
        ThreatCategory::PrivilegeEscalation,
        Severity::Critical,
        r"(?i)\bsudo\s+rm\s+-(rf|fr)\b",
        "sudo rm -rf",
    ),
    (
        ThreatCategory::PrivilegeEscalation,
        Severity::Critical,
        r"(?i)\brm\s+-(rf|fr)\s+/(\s|$|\*)",
        "recursive delete of filesystem root",
    ),
    (
        ThreatCategory::PrivilegeEscalation,
        Severity::Critical,
        r"(?i)/etc/(shadow|sudoers)\b",
        "credential store access",
    ),
    (
        ThreatCategory::PrivilegeEscalation,
        Severity::High,
        r"(?i)\bchmod\s+(-R\s+)?0?777\b",
        "world-writable permissions",
    ),
    (
        ThreatCategory::PrivilegeEscalation,
        Severity::High,
        r"(?i)\bchown\s+(-R\s+)?root\b",
        "ownership change to root",
    ),
    (
        ThreatCategory::PrivilegeEscalation,
        Severity::High,
        r"(?i)\b(setuid|setgid|cap_sys_admin)\b",
        "privilege bits",
    ),
    (ThreatCategory::PrivilegeEscalation, Severity::Medium, r"(?i)\bsudo\b", "sudo invocation"),
    (
        ThreatCategory::CodeInjection,
        Severity::Critical,
        r"(?i);\s*(drop|truncate)\s+table\b",
        "destructive SQL injection",
    ),
    (
        ThreatCategory::CodeInjection,
        Severity::High,
        r"(?i)\bunion\s+(all\s+)?select\b",
        "SQL union injection",
    ),
    (ThreatCategory::CodeInjection, Severity::High, r"(?i)\beval\s*\(", "dynamic evaluation"),
    (ThreatCategory::CodeInjection, Severity::High, r"(?i)__import__\s*\(", "dynamic import"),
    (ThreatCategory::CodeInjection, Severity::High, r"(?i)<script\b", "script tag"),
    (
        ThreatCategory::CodeInjection,
        Severity::High,
        r"(?i)\b(shellcode|buffer\s+overflow|heap\s+spray)\b",
        "memory corruption",
    ),
    (
        ThreatCategory::CodeInjection,
        Severity::Medium,
        r"(?i)\b(exec|system|popen)\s*\(",
        "process execution call",
    ),
    (ThreatCategory::CodeInjection, Severity::Low, r"\$\([^)]*\)|`[^`]+`", "shell substitution"),
    (
        ThreatCategory::SensitiveDataExposure,
        Severity::Critical,
        r"-----BEGIN [A-Z ]*PRIVATE KEY-----",
        "private key material",
    ),
    (
        ThreatCategory::SensitiveDataExposure,
        Severity::High,
        r"\b\d{3}-\d{2}-\d{4}\b",
        "social security number",
    ),
    (
        ThreatCategory::SensitiveDataExposure,
        Severity::High,
        r"\b(?:\d{4}[ -]?){3}\d{4}\b",
        "payment card number",
    ),
    (
        ThreatCategory::SensitiveDataExposure,
        Severity::Medium,
        r"(?i)\b(password|passwd|secret|api[_-]?key|access[_-]?token|private[_-]?key)\b",
        "credential keyword",
    ),
    (
        ThreatCategory::IntegrityOnly,
        Severity::High,
        r"(?i)\b(disable|clear|wipe)\s+(the\s+)?(audit|logging|logs)\b",
        "audit tampering",
    ),
    (
        ThreatCategory::IntegrityOnly,
        Severity::Medium,
        r"(?i)\b(tamper(ed|ing)?|forge[ds]?)\b",
        "tampering keyword",
    ),
    (
        ThreatCategory::IntegrityOnly,
        Severity::Low,
        r"(?i)\b(checksum|hash|signature)\s+mismatch\b",
        "integrity mismatch",
    ),
];

pub struct SecurityScanner {
    patterns: Vec<CompiledPattern>,
    target_patterns: Vec<CompiledPattern>,
    weights: CategoryWeights,
    block_threshold: f64,
    monitor_threshold: f64,
}

impl SecurityScanner {
    pub fn from_config(config: &SecurityConfig) -> Result<Self, regex::Error> {
        let mut patterns = Vec::new();
        if config.builtin_patterns {
            for (category, severity, pattern, description) in BUILTIN_PATTERNS {
                patterns.push(CompiledPattern::compile(
                    *category,
                    *severity,
                    pattern,
                    description,
                )?);
            }
        }
        for extra in &config.patterns {
            patterns.push(CompiledPattern::from_config(extra)?);
        }
        let target_patterns = config
            .sensitive_targets
            .iter()
            .map(CompiledPattern::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            target_patterns,
            weights: config.weights,
            block_threshold: config.block_threshold,
            monitor_threshold: config.monitor_threshold,
        })
    }

    /// Scanner with the built-in catalogue and default thresholds.
    pub fn with_defaults() -> Result<Self, regex::Error> {
        Self::from_config(&SecurityConfig::default())
    }

    pub fn block_threshold(&self) -> f64 {
        self.block_threshold
    }

    pub fn scan(
        &self,
        task: &str,
        target_agent: Option<&AgentId>,
        target_tool: Option<&str>,
    ) -> RiskAssessment {
        let mut findings: Vec<ThreatFinding> =
            ThreatCategory::ALL.iter().map(|c| ThreatFinding::clear(*c)).collect();

        let mut note = |pattern: &CompiledPattern| {
            if let Some(finding) = findings.iter_mut().find(|f| f.category == pattern.category) {
                finding.detected = true;
                finding.severity = Some(match finding.severity {
                    Some(current) => current.max(pattern.severity),
                    None => pattern.severity,
                });
                if !finding.matched.contains(&pattern.description) {
                    finding.matched.push(pattern.description.clone());
                }
            }
        };

        for pattern in &self.patterns {
            if pattern.regex.is_match(task) {
                note(pattern);
            }
        }

        let targets = target_agent
            .map(|a| a.as_str())
            .into_iter()
            .chain(target_tool);
        for target in targets {
            for pattern in &self.target_patterns {
                if pattern.regex.is_match(target) {
                    note(pattern);
                }
            }
        }

        let risk_score = findings
            .iter()
            .filter_map(|f| f.severity.map(|s| self.weights.weight(f.category) * s.factor()))
            .fold(1.0, |keep, contribution| keep * (1.0 - contribution.clamp(0.0, 1.0)));
        let risk_score = (1.0 - risk_score).clamp(0.0, 1.0);

        let level = if risk_score >= self.block_threshold {
            RiskLevel::Blocked
        } else if risk_score >= self.monitor_threshold {
            RiskLevel::Monitored
        } else {
            RiskLevel::Clear
        };

        let assessment = RiskAssessment {
            risk_score,
            level,
            findings,
        };

        counter!("switchyard_security_scans_total", "level" => level.as_str()).increment(1);
        match level {
            RiskLevel::Blocked => warn!(
                risk = risk_score,
                threats = %assessment.summary(),
                tool = target_tool.unwrap_or("-"),
                "Security scan blocked execution"
            ),
            RiskLevel::Monitored => debug!(
                risk = risk_score,
                threats = %assessment.summary(),
                "Security scan flagged request for monitoring"
            ),
            RiskLevel::Clear => debug!(risk = risk_score, "Security scan clear"),
        }

        assessment
    }
}
