// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tool Registry
//!
//! Owns the tool catalog and the per-agent permission table, and is the only
//! path through which a tool handler ever runs.
//!
//! ## Lifecycle
//!
//! ```text
//! Building --initialize()--> Running --shutdown()--> ShutDown
//! ```
//!
//! Tools are registered and permissions granted while `Building`. Once
//! initialized, the catalog and permission table are read-only: there is no
//! runtime permission mutation. `shutdown()` cancels in-flight invocations
//! and rejects new ones.
//!
//! ## Invocation Pipeline
//!
//! 1. Registry must be `Running`.
//! 2. Permission check. On failure: `PermissionDenied`, violation counter
//!    bumped, handler never called.
//! 3. Arguments validated against the tool's JSON schema.
//! 4. Handler runs under a timeout, raced against cancellation. Panics and
//!    handler errors are normalized, never propagated raw.
//! 5. A handler failure is retried once. Timeouts, permission and argument
//!    errors and cancellation are not.
//! 6. Each attempt records its duration and outcome in the performance
//!    ledger and appends exactly one audit entry.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use metrics::{counter, histogram};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::agent::AgentId;
use crate::domain::audit::AuditEventType;
use crate::domain::errors::OrchestrationError;
use crate::domain::execution::RequestId;
use crate::domain::tool::{Tool, ToolAccess, ToolCategory, ToolSpec};
use crate::infrastructure::audit_log::AuditLog;
use crate::infrastructure::performance_ledger::PerformanceLedger;
use crate::infrastructure::security_scanner::SecurityScanner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    Building,
    Running,
    ShutDown,
}

impl fmt::Display for RegistryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegistryState::Building => "building",
            RegistryState::Running => "running",
            RegistryState::ShutDown => "shut down",
        })
    }
}

struct RegisteredTool {
    tool: Tool,
    validator: jsonschema::Validator,
    timeout: Option<Duration>,
}

/// Correlation and cancellation for one invocation.
#[derive(Debug, Clone, Default)]
pub struct InvocationScope {
    pub request_id: Option<RequestId>,
    pub cancel: CancellationToken,
}

impl InvocationScope {
    pub fn for_request(request_id: RequestId, cancel: CancellationToken) -> Self {
        Self {
            request_id: Some(request_id),
            cancel,
        }
    }
}

/// Extra attempts a failing handler gets before the error is surfaced.
const HANDLER_RETRIES: u32 = 1;

pub struct ToolRegistry {
    state: RwLock<RegistryState>,
    tools: RwLock<HashMap<String, Arc<RegisteredTool>>>,
    permissions: RwLock<HashMap<AgentId, Vec<String>>>,
    default_timeout: Duration,
    ledger: Arc<PerformanceLedger>,
    audit: Arc<AuditLog>,
    violations: AtomicU64,
    violations_by_agent: DashMap<AgentId, u64>,
    shutdown: CancellationToken,
}

impl ToolRegistry {
    pub fn new(
        default_timeout: Duration,
        ledger: Arc<PerformanceLedger>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            state: RwLock::new(RegistryState::Building),
            tools: RwLock::new(HashMap::new()),
            permissions: RwLock::new(HashMap::new()),
            default_timeout,
            ledger,
            audit,
            violations: AtomicU64::new(0),
            violations_by_agent: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> RegistryState {
        *self.state.read()
    }

    fn require_state(&self, expected: RegistryState) -> Result<(), OrchestrationError> {
        let state = self.state();
        if state != expected {
            return Err(OrchestrationError::RegistryUnavailable(state.to_string()));
        }
        Ok(())
    }

    pub fn register(&self, tool: Tool) -> Result<(), OrchestrationError> {
        self.register_with_timeout(tool, None)
    }

    /// Register a tool with its own timeout instead of the registry default.
    pub fn register_with_timeout(
        &self,
        tool: Tool,
        timeout: Option<Duration>,
    ) -> Result<(), OrchestrationError> {
        self.require_state(RegistryState::Building)?;

        let validator = jsonschema::validator_for(&tool.spec().input_schema).map_err(|e| {
            OrchestrationError::InvalidToolSchema {
                tool: tool.name().to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut tools = self.tools.write();
        if tools.contains_key(tool.name()) {
            return Err(OrchestrationError::DuplicateTool(tool.name().to_string()));
        }
        info!(
            tool = tool.name(),
            category = %tool.category(),
            handler = tool.handler().kind(),
            "Registered tool"
        );
        tools.insert(
            tool.name().to_string(),
            Arc::new(RegisteredTool {
                tool,
                validator,
                timeout,
            }),
        );
        Ok(())
    }

    /// Write-once permission list for an agent.
    pub fn grant<I, S>(&self, agent_id: &AgentId, tool_names: I) -> Result<(), OrchestrationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.require_state(RegistryState::Building)?;
        let mut permissions = self.permissions.write();
        if permissions.contains_key(agent_id) {
            return Err(OrchestrationError::PermissionsAlreadyGranted(agent_id.clone()));
        }
        let names: Vec<String> = tool_names.into_iter().map(Into::into).collect();
        debug!(agent_id = %agent_id, tools = ?names, "Granted tool permissions");
        permissions.insert(agent_id.clone(), names);
        Ok(())
    }

    /// Seal the catalog and permission table.
    pub fn initialize(&self) -> Result<(), OrchestrationError> {
        {
            let mut state = self.state.write();
            if *state != RegistryState::Building {
                return Err(OrchestrationError::RegistryUnavailable(state.to_string()));
            }
            *state = RegistryState::Running;
        }

        let tools = self.tools.read();
        let permissions = self.permissions.read();
        for (agent_id, names) in permissions.iter() {
            for name in names.iter().filter(|n| !tools.contains_key(n.as_str())) {
                warn!(
                    agent_id = %agent_id,
                    tool = %name,
                    "Permission references unregistered tool; it will be skipped"
                );
            }
        }
        info!(tools = tools.len(), agents = permissions.len(), "Tool registry initialized");
        self.audit.append(
            AuditEventType::Lifecycle,
            None,
            json!({ "component": "tool_registry", "event": "initialized", "tools": tools.len() }),
        );
        Ok(())
    }

    /// Cancel in-flight invocations and refuse new ones. Idempotent.
    pub fn shutdown(&self) {
        let mut state = self.state.write();
        if *state == RegistryState::ShutDown {
            return;
        }
        *state = RegistryState::ShutDown;
        drop(state);

        self.shutdown.cancel();
        info!("Tool registry shut down");
        self.audit.append(
            AuditEventType::Lifecycle,
            None,
            json!({ "component": "tool_registry", "event": "shutdown" }),
        );
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn describe_tool(&self, name: &str) -> Option<ToolSpec> {
        self.tools.read().get(name).map(|t| t.tool.spec().clone())
    }

    pub fn tools_by_category(&self) -> BTreeMap<ToolCategory, Vec<ToolSpec>> {
        let mut grouped: BTreeMap<ToolCategory, Vec<ToolSpec>> = BTreeMap::new();
        for registered in self.tools.read().values() {
            grouped
                .entry(registered.tool.category())
                .or_default()
                .push(registered.tool.spec().clone());
        }
        for specs in grouped.values_mut() {
            specs.sort_by(|a, b| a.name.cmp(&b.name));
        }
        grouped
    }

    /// Tools the agent may be handed. Permission entries naming unknown
    /// tools are logged and skipped, never granted.
    pub fn get_tools_for_agent(&self, agent_id: &AgentId) -> Vec<ToolSpec> {
        let permissions = self.permissions.read();
        let Some(names) = permissions.get(agent_id) else {
            return Vec::new();
        };
        let tools = self.tools.read();
        let mut seen = BTreeSet::new();
        let mut specs = Vec::new();
        for name in names {
            if !seen.insert(name.as_str()) {
                continue;
            }
            match tools.get(name) {
                Some(registered) => specs.push(registered.tool.spec().clone()),
                None => warn!(
                    agent_id = %agent_id,
                    tool = %name,
                    "Skipping unknown tool in permission list"
                ),
            }
        }
        specs
    }

    pub fn is_permitted(&self, agent_id: &AgentId, tool_name: &str) -> bool {
        self.permissions
            .read()
            .get(agent_id)
            .is_some_and(|names| names.iter().any(|n| n == tool_name))
    }

    pub fn violation_count(&self) -> u64 {
        self.violations.load(Ordering::SeqCst)
    }

    pub fn violations_for(&self, agent_id: &AgentId) -> u64 {
        self.violations_by_agent.get(agent_id).map(|v| *v).unwrap_or(0)
    }

    pub async fn invoke(
        &self,
        agent_id: &AgentId,
        tool_name: &str,
        args: Value,
    ) -> Result<Value, OrchestrationError> {
        self.invoke_with(&InvocationScope::default(), agent_id, tool_name, args).await
    }

    pub async fn invoke_with(
        &self,
        scope: &InvocationScope,
        agent_id: &AgentId,
        tool_name: &str,
        args: Value,
    ) -> Result<Value, OrchestrationError> {
        let started = Instant::now();

        let registered = match self.authorize(agent_id, tool_name) {
            Ok(registered) => registered,
            Err(err) => {
                self.finish(scope, agent_id, tool_name, elapsed_ms(started), 1, &err);
                return Err(err);
            }
        };

        if let Err(reason) = validate_args(&registered.validator, &args) {
            let err = OrchestrationError::InvalidToolArguments {
                tool: tool_name.to_string(),
                reason,
            };
            self.finish(scope, agent_id, tool_name, elapsed_ms(started), 1, &err);
            return Err(err);
        }

        let mut attempt = 1;
        loop {
            let outcome = self
                .attempt(scope, agent_id, tool_name, &registered, args.clone(), attempt)
                .await;
            match outcome {
                Err(err) if attempt <= HANDLER_RETRIES && err.retries_in_place() => {
                    debug!(
                        agent_id = %agent_id,
                        tool = tool_name,
                        attempt,
                        error = %err,
                        "Retrying tool after handler failure"
                    );
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    /// One handler run: timeout, cancellation, ledger sample, audit entry.
    async fn attempt(
        &self,
        scope: &InvocationScope,
        agent_id: &AgentId,
        tool_name: &str,
        registered: &RegisteredTool,
        args: Value,
        attempt: u32,
    ) -> Result<Value, OrchestrationError> {
        let started = Instant::now();
        let timeout = registered.timeout.unwrap_or(self.default_timeout);
        let handler = registered.tool.handler();
        let call = AssertUnwindSafe(handler.call(args)).catch_unwind();

        let outcome = tokio::select! {
            biased;
            _ = scope.cancel.cancelled() => Err(OrchestrationError::Cancelled),
            _ = self.shutdown.cancelled() => Err(OrchestrationError::Cancelled),
            result = tokio::time::timeout(timeout, call) => {
                let elapsed_ms = elapsed_ms(started);
                match result {
                    Err(_) => Err(OrchestrationError::ToolTimeout {
                        tool: tool_name.to_string(),
                        elapsed_ms,
                    }),
                    Ok(Err(panic)) => Err(OrchestrationError::ToolExecution {
                        tool: tool_name.to_string(),
                        elapsed_ms,
                        message: format!("handler panicked: {}", panic_message(panic.as_ref())),
                    }),
                    Ok(Ok(Err(handler_err))) => Err(OrchestrationError::ToolExecution {
                        tool: tool_name.to_string(),
                        elapsed_ms,
                        message: handler_err.to_string(),
                    }),
                    Ok(Ok(Ok(value))) => Ok(value),
                }
            }
        };

        let duration_ms = elapsed_ms(started);
        if !matches!(outcome, Err(OrchestrationError::Cancelled)) {
            self.ledger.record(agent_id, Some(tool_name), duration_ms, outcome.is_ok());
        }

        match &outcome {
            Ok(_) => self.audit_invocation(scope, agent_id, tool_name, duration_ms, attempt, None),
            Err(err) => self.finish(scope, agent_id, tool_name, duration_ms, attempt, err),
        }
        outcome
    }

    fn authorize(
        &self,
        agent_id: &AgentId,
        tool_name: &str,
    ) -> Result<Arc<RegisteredTool>, OrchestrationError> {
        self.require_state(RegistryState::Running)?;

        if !self.is_permitted(agent_id, tool_name) {
            return Err(OrchestrationError::PermissionDenied {
                agent_id: agent_id.clone(),
                tool: tool_name.to_string(),
            });
        }

        self.tools
            .read()
            .get(tool_name)
            .cloned()
            .ok_or_else(|| OrchestrationError::UnknownTool(tool_name.to_string()))
    }

    /// Bookkeeping for every failed attempt: counters, logs, one audit entry.
    fn finish(
        &self,
        scope: &InvocationScope,
        agent_id: &AgentId,
        tool_name: &str,
        duration_ms: u64,
        attempt: u32,
        err: &OrchestrationError,
    ) {
        if let OrchestrationError::PermissionDenied { .. } = err {
            self.violations.fetch_add(1, Ordering::SeqCst);
            *self.violations_by_agent.entry(agent_id.clone()).or_insert(0) += 1;
            counter!("switchyard_permission_violations_total", "agent" => agent_id.to_string())
                .increment(1);
            warn!(agent_id = %agent_id, tool = tool_name, "Permission denied for tool invocation");
            self.audit.append(
                AuditEventType::PermissionViolation,
                scope.request_id,
                json!({
                    "agentId": agent_id,
                    "tool": tool_name,
                    "violations": self.violation_count(),
                }),
            );
            return;
        }

        warn!(
            agent_id = %agent_id,
            tool = tool_name,
            duration_ms,
            error = %err,
            "Tool invocation failed"
        );
        self.audit_invocation(scope, agent_id, tool_name, duration_ms, attempt, Some(err));
    }

    fn audit_invocation(
        &self,
        scope: &InvocationScope,
        agent_id: &AgentId,
        tool_name: &str,
        duration_ms: u64,
        attempt: u32,
        error: Option<&OrchestrationError>,
    ) {
        let outcome = error.map_or("success", |e| e.kind().as_str());
        counter!(
            "switchyard_tool_invocations_total",
            "tool" => tool_name.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!("switchyard_tool_duration_ms", "tool" => tool_name.to_string())
            .record(duration_ms as f64);
        if error.is_none() {
            debug!(
                agent_id = %agent_id,
                tool = tool_name,
                duration_ms,
                "Tool invocation succeeded"
            );
        }
        self.audit.append(
            AuditEventType::ToolInvocation,
            scope.request_id,
            json!({
                "agentId": agent_id,
                "tool": tool_name,
                "outcome": outcome,
                "durationMs": duration_ms,
                "attempt": attempt,
                "error": error.map(|e| e.to_string()),
            }),
        );
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn validate_args(validator: &jsonschema::Validator, args: &Value) -> Result<(), String> {
    let errors: Vec<String> = validator.iter_errors(args).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Agent-scoped view of the registry handed to an agent for one delegation.
///
/// Every call is scanned before it reaches the registry; blocked calls get
/// a `SecurityBlock` audit entry instead of an invocation entry.
pub struct ToolBelt {
    registry: Arc<ToolRegistry>,
    scanner: Arc<SecurityScanner>,
    audit: Arc<AuditLog>,
    agent_id: AgentId,
    scope: InvocationScope,
    used: Mutex<Vec<String>>,
}

impl ToolBelt {
    pub fn new(
        registry: Arc<ToolRegistry>,
        scanner: Arc<SecurityScanner>,
        audit: Arc<AuditLog>,
        agent_id: AgentId,
        scope: InvocationScope,
    ) -> Self {
        Self {
            registry,
            scanner,
            audit,
            agent_id,
            scope,
            used: Mutex::new(Vec::new()),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Tool names that reached the registry, in call order.
    pub fn tools_used(&self) -> Vec<String> {
        self.used.lock().clone()
    }
}

#[async_trait]
impl ToolAccess for ToolBelt {
    fn available_tools(&self) -> Vec<ToolSpec> {
        self.registry.get_tools_for_agent(&self.agent_id)
    }

    async fn call(&self, tool: &str, args: Value) -> Result<Value, OrchestrationError> {
        let assessment = self.scanner.scan(&args.to_string(), Some(&self.agent_id), Some(tool));
        if assessment.is_blocked() {
            self.audit.append(
                AuditEventType::SecurityBlock,
                self.scope.request_id,
                json!({
                    "agentId": self.agent_id,
                    "tool": tool,
                    "risk": assessment.risk_score,
                    "findings": assessment.summary(),
                }),
            );
            return Err(OrchestrationError::SecurityThreatDetected {
                risk: assessment.risk_score,
                summary: assessment.summary(),
            });
        }

        self.used.lock().push(tool.to_string());
        self.registry.invoke_with(&self.scope, &self.agent_id, tool, args).await
    }
}
