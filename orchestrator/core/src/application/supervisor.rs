// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Supervisor
//!
//! Drives one request through the state machine defined in
//! [`crate::domain::supervisor`]: cache check, security check, selection,
//! delegation, aggregation and reflection.
//!
//! Every transition taken appends exactly one `StateTransition` audit entry,
//! so a request's audit trail replays its path through the machine. Requests
//! run concurrently; the only state they share is the registry, ledger,
//! cache, audit log and tuning.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::reflection::ReflectionEngine;
use crate::domain::agent::{Agent, AgentFailure, AgentFailureKind, AgentId, AgentReply};
use crate::domain::audit::AuditEventType;
use crate::domain::decision::{AgentSelector, Decision};
use crate::domain::errors::OrchestrationError;
use crate::domain::execution::{
    ConversationMessage, ExecutionContext, OrchestrationRequest, RequestId,
};
use crate::domain::improvement::{ExecutionTrace, StepOutcome, TraceStep};
use crate::domain::orchestrator_config::SupervisorConfig;
use crate::domain::supervisor::{NoopObserver, SupervisorObserver, SupervisorState, Transition};
use crate::domain::tuning::TuningHandle;
use crate::infrastructure::agent_directory::AgentDirectory;
use crate::infrastructure::audit_log::AuditLog;
use crate::infrastructure::performance_ledger::{LoadGuard, PerformanceLedger};
use crate::infrastructure::prompt_template_engine::{ResponseRenderer, ResponseView};
use crate::infrastructure::security_scanner::SecurityScanner;
use crate::infrastructure::semantic_cache::{CacheHit, CachedResponse, SemanticCache};
use crate::infrastructure::tool_registry::{panic_message, InvocationScope, ToolBelt, ToolRegistry};

use SupervisorState::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Completed,
    /// Hop limit reached; carries whatever the agents produced.
    Degraded,
    Cached,
    Escalated,
    Failed,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Completed => "completed",
            ResponseStatus::Degraded => "degraded",
            ResponseStatus::Cached => "cached",
            ResponseStatus::Escalated => "escalated",
            ResponseStatus::Failed => "failed",
        }
    }
}

/// User-visible error attached to non-completed responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub kind: String,
    pub message: String,
}

impl From<&OrchestrationError> for ResponseError {
    fn from(err: &OrchestrationError) -> Self {
        Self {
            kind: err.kind().as_str().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<&AgentFailure> for ResponseError {
    fn from(failure: &AgentFailure) -> Self {
        Self {
            kind: failure.kind.as_str().to_string(),
            message: failure.message.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResponse {
    pub request_id: RequestId,
    pub status: ResponseStatus,
    pub messages: Vec<ConversationMessage>,
    pub decision: Option<Decision>,
    pub contributing_agents: Vec<AgentId>,
    pub hops: u32,
    pub transitions: Vec<Transition>,
    pub error: Option<ResponseError>,
    pub risk_score: f64,
    pub monitored: bool,
    pub rendered: String,
}

/// Shared components a Supervisor routes through.
pub struct SupervisorComponents {
    pub registry: Arc<ToolRegistry>,
    pub scanner: Arc<SecurityScanner>,
    pub cache: Arc<SemanticCache>,
    pub ledger: Arc<PerformanceLedger>,
    pub directory: Arc<AgentDirectory>,
    pub selector: Arc<dyn AgentSelector>,
    pub reflection: Arc<ReflectionEngine>,
    pub audit: Arc<AuditLog>,
    pub tuning: TuningHandle,
}

pub struct Supervisor {
    registry: Arc<ToolRegistry>,
    scanner: Arc<SecurityScanner>,
    cache: Arc<SemanticCache>,
    ledger: Arc<PerformanceLedger>,
    directory: Arc<AgentDirectory>,
    selector: Arc<dyn AgentSelector>,
    reflection: Arc<ReflectionEngine>,
    audit: Arc<AuditLog>,
    tuning: TuningHandle,
    renderer: ResponseRenderer,
    observer: Arc<dyn SupervisorObserver>,
    config: SupervisorConfig,
}

/// Per-request state. Never shared between requests.
struct Run {
    ctx: ExecutionContext,
    state: SupervisorState,
    transitions: Vec<Transition>,
    decisions: Vec<Decision>,
    steps: Vec<TraceStep>,
    messages: Vec<ConversationMessage>,
    contributing: Vec<AgentId>,
    hops: u32,
    degraded: bool,
    cached: Option<CacheHit>,
    error: Option<ResponseError>,
    started: Instant,
}

impl Run {
    fn new(request: &OrchestrationRequest, context_window: usize) -> Self {
        Self {
            ctx: ExecutionContext::new(request, context_window),
            state: Received,
            transitions: Vec::new(),
            decisions: Vec::new(),
            steps: Vec::new(),
            messages: Vec::new(),
            contributing: Vec::new(),
            hops: 0,
            degraded: false,
            cached: None,
            error: None,
            started: Instant::now(),
        }
    }

    fn request_id(&self) -> RequestId {
        self.ctx.request_id
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Loop variables that live across states within one request.
#[derive(Default)]
struct Cursor {
    current: Option<AgentId>,
    directed: Option<AgentId>,
    exclude: HashSet<AgentId>,
    retried: bool,
    guard: Option<LoadGuard>,
}

impl Supervisor {
    pub fn new(components: SupervisorComponents, config: SupervisorConfig) -> anyhow::Result<Self> {
        Ok(Self {
            registry: components.registry,
            scanner: components.scanner,
            cache: components.cache,
            ledger: components.ledger,
            directory: components.directory,
            selector: components.selector,
            reflection: components.reflection,
            audit: components.audit,
            tuning: components.tuning,
            renderer: ResponseRenderer::new()?,
            observer: Arc::new(NoopObserver),
            config,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn SupervisorObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Route one request to completion. Never panics and never returns an
    /// error: every outcome, including cancellation, is a response.
    pub async fn handle(
        &self,
        request: OrchestrationRequest,
        cancel: CancellationToken,
    ) -> OrchestrationResponse {
        let mut run = Run::new(&request, self.tuning.context_window());
        info!(
            request_id = %run.request_id(),
            user_id = %request.user_id,
            task_type = request.task.task_type(),
            "Received orchestration request"
        );

        let deadline = run.started + self.config.request_timeout;
        if let Err(err) = self.drive(&mut run, &cancel, deadline).await {
            error!(
                request_id = %run.request_id(),
                state = %run.state,
                error = %err,
                "Supervisor loop aborted"
            );
            if !run.state.is_terminal() {
                run.error = Some((&err).into());
                if let Err(e) = self.transition(&mut run, Failed).await {
                    error!(
                        request_id = %run.request_id(),
                        error = %e,
                        "Could not record failure transition"
                    );
                }
            }
        }

        self.respond(run)
    }

    async fn drive(
        &self,
        run: &mut Run,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<(), OrchestrationError> {
        let mut cursor = Cursor::default();

        while !run.state.is_terminal() {
            if cancel.is_cancelled() {
                return self.terminate(run, Failed, (&OrchestrationError::Cancelled).into()).await;
            }
            if Instant::now() >= deadline {
                let err = OrchestrationError::DeadlineExceeded {
                    elapsed_ms: run.elapsed_ms(),
                };
                return self.terminate(run, Failed, (&err).into()).await;
            }

            match run.state {
                Received => self.transition(run, CacheCheck).await?,
                CacheCheck => self.check_cache(run).await?,
                SecurityCheck => self.check_security(run).await?,
                Select => self.select(run, &mut cursor).await?,
                Delegate => self.delegate(run, &mut cursor).await?,
                AwaitResult => self.await_result(run, &mut cursor, cancel, deadline).await?,
                Aggregate => self.transition(run, Reflect).await?,
                Reflect => {
                    self.reflect(run);
                    self.transition(run, Respond).await?
                }
                Respond | Failed | Escalated => break,
            }
        }
        Ok(())
    }

    async fn transition(
        &self,
        run: &mut Run,
        to: SupervisorState,
    ) -> Result<(), OrchestrationError> {
        let from = run.state;
        if !from.can_transition_to(to) {
            return Err(OrchestrationError::InvalidTransition { from, to });
        }
        run.state = to;
        let transition = Transition { from, to };
        run.transitions.push(transition);

        self.audit.append(
            AuditEventType::StateTransition,
            Some(run.request_id()),
            json!({ "from": from, "to": to, "hop": run.hops }),
        );
        debug!(request_id = %run.request_id(), from = %from, to = %to, "Supervisor transition");
        self.observer.on_transition(run.request_id(), transition).await;
        Ok(())
    }

    async fn terminate(
        &self,
        run: &mut Run,
        to: SupervisorState,
        error: ResponseError,
    ) -> Result<(), OrchestrationError> {
        warn!(
            request_id = %run.request_id(),
            state = %run.state,
            outcome = %to,
            kind = %error.kind,
            "{}",
            error.message
        );
        run.error = Some(error);
        self.transition(run, to).await
    }

    async fn check_cache(&self, run: &mut Run) -> Result<(), OrchestrationError> {
        match self.cache.lookup(&run.ctx.task.text) {
            Some(hit) => {
                info!(
                    request_id = %run.request_id(),
                    similarity = hit.similarity,
                    "Semantic cache hit"
                );
                run.cached = Some(hit);
                self.transition(run, Respond).await
            }
            None => self.transition(run, SecurityCheck).await,
        }
    }

    async fn check_security(&self, run: &mut Run) -> Result<(), OrchestrationError> {
        let assessment = self.scanner.scan(&run.ctx.task.scan_text(), None, None);
        run.ctx.security.risk_score = assessment.risk_score;

        if assessment.is_blocked() {
            self.audit.append(
                AuditEventType::SecurityBlock,
                Some(run.request_id()),
                json!({ "risk": assessment.risk_score, "findings": assessment.summary() }),
            );
            let err = OrchestrationError::SecurityThreatDetected {
                risk: assessment.risk_score,
                summary: assessment.summary(),
            };
            return self.terminate(run, Failed, (&err).into()).await;
        }

        if assessment.is_monitored() {
            run.ctx.security.monitored = true;
            info!(
                request_id = %run.request_id(),
                risk = assessment.risk_score,
                findings = %assessment.summary(),
                "Request proceeds under monitoring"
            );
        }
        self.transition(run, Select).await
    }

    async fn select(&self, run: &mut Run, cursor: &mut Cursor) -> Result<(), OrchestrationError> {
        let candidates = self
            .directory
            .descriptors(&self.ledger, run.ctx.task.task_type(), &cursor.exclude);
        let result = match cursor.directed.take() {
            Some(target) => self.selector.select_directed(&run.ctx.task, &target, &candidates),
            None => self.selector.select(&run.ctx.task, &candidates),
        };

        let floor = self.tuning.selection().low_confidence_floor;
        let decision = match result {
            Ok(decision) if decision.directed || decision.confidence >= floor => decision,
            Ok(decision) => {
                let err = OrchestrationError::NoEligibleAgent(format!(
                    "confidence {:.2} for {} is below the {:.2} floor",
                    decision.confidence, decision.primary_agent, floor
                ));
                return self.terminate(run, Escalated, (&err).into()).await;
            }
            Err(e) => {
                let err = OrchestrationError::NoEligibleAgent(e.to_string());
                return self.terminate(run, Escalated, (&err).into()).await;
            }
        };

        info!(
            request_id = %run.request_id(),
            primary = %decision.primary_agent,
            supporting = ?decision.supporting_agents,
            mode = decision.coordination_mode.as_str(),
            confidence = decision.confidence,
            "Selected agent"
        );
        self.audit.append(
            AuditEventType::Decision,
            Some(run.request_id()),
            serde_json::to_value(&decision).unwrap_or_default(),
        );
        self.observer.on_decision(run.request_id(), &decision).await;

        cursor.current = Some(decision.primary_agent.clone());
        cursor.retried = false;
        run.decisions.push(decision);
        self.transition(run, Delegate).await
    }

    async fn delegate(&self, run: &mut Run, cursor: &mut Cursor) -> Result<(), OrchestrationError> {
        let agent_id = cursor
            .current
            .clone()
            .ok_or_else(|| {
                OrchestrationError::Internal("delegation without a chosen agent".into())
            })?;

        let reservation = match self.directory.get(&agent_id) {
            Some(_) => self.ledger.begin(&agent_id),
            None => Err(OrchestrationError::UnknownAgent(agent_id.clone())),
        };

        match reservation {
            Ok(guard) => {
                cursor.guard = Some(guard);
                self.transition(run, AwaitResult).await
            }
            Err(err) => {
                warn!(
                    request_id = %run.request_id(),
                    agent_id = %agent_id,
                    error = %err,
                    "Agent unavailable, re-selecting"
                );
                cursor.exclude.insert(agent_id);
                self.transition(run, Select).await
            }
        }
    }

    async fn await_result(
        &self,
        run: &mut Run,
        cursor: &mut Cursor,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<(), OrchestrationError> {
        let agent_id = cursor
            .current
            .clone()
            .ok_or_else(|| {
                OrchestrationError::Internal("awaiting result without an agent".into())
            })?;
        let agent = self
            .directory
            .get(&agent_id)
            .ok_or_else(|| OrchestrationError::UnknownAgent(agent_id.clone()))?;

        run.ctx.hop = run.hops;
        let started = Instant::now();
        let (result, tools_used) = self.invoke_agent(agent, &run.ctx, cancel, deadline).await;
        cursor.guard = None;
        let duration_ms = started.elapsed().as_millis() as u64;

        let cancelled = matches!(&result, Err(f) if f.kind == AgentFailureKind::Cancelled);
        if !cancelled {
            self.ledger
                .record_for_task(&agent_id, run.ctx.task.task_type(), duration_ms, result.is_ok());
        }
        run.steps.push(TraceStep {
            agent_id: agent_id.clone(),
            hop: run.hops,
            duration_ms,
            outcome: match &result {
                Ok(_) => StepOutcome::Success,
                Err(f) => StepOutcome::Failed(f.kind),
            },
            tools_used,
        });

        match result {
            Ok(reply) => self.accept_reply(run, cursor, agent_id, reply).await,
            Err(failure) => self.handle_failure(run, cursor, agent_id, failure).await,
        }
    }

    async fn invoke_agent(
        &self,
        agent: Arc<dyn Agent>,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> (Result<AgentReply, AgentFailure>, Vec<String>) {
        let agent_id = agent.id().clone();
        let belt = ToolBelt::new(
            self.registry.clone(),
            self.scanner.clone(),
            self.audit.clone(),
            agent_id.clone(),
            InvocationScope::for_request(ctx.request_id, cancel.child_token()),
        );
        let timeout = self
            .tuning
            .agent_timeout(&agent_id)
            .min(deadline.saturating_duration_since(Instant::now()));

        let result = {
            let call = AssertUnwindSafe(agent.invoke(ctx, &belt)).catch_unwind();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    Err(AgentFailure::new(AgentFailureKind::Cancelled, "request cancelled"))
                }
                outcome = tokio::time::timeout(timeout, call) => match outcome {
                    Err(_) => Err(AgentFailure::new(
                        AgentFailureKind::Timeout,
                        format!("{} did not finish within {}ms", agent_id, timeout.as_millis()),
                    )),
                    Ok(Err(panic)) => Err(AgentFailure::new(
                        AgentFailureKind::Internal,
                        format!("agent panicked: {}", panic_message(panic.as_ref())),
                    )),
                    Ok(Ok(reply)) => reply,
                },
            }
        };
        (result, belt.tools_used())
    }

    async fn accept_reply(
        &self,
        run: &mut Run,
        cursor: &mut Cursor,
        agent_id: AgentId,
        reply: AgentReply,
    ) -> Result<(), OrchestrationError> {
        debug!(
            request_id = %run.request_id(),
            agent_id = %agent_id,
            messages = reply.response_messages.len(),
            tools = ?reply.tools_used,
            "Agent replied"
        );
        if !run.contributing.contains(&agent_id) {
            run.contributing.push(agent_id.clone());
        }
        for text in reply.response_messages {
            let message = ConversationMessage::agent(&agent_id, text);
            run.ctx.push_message(message.clone());
            run.messages.push(message);
        }
        if let Some(state) = reply.updated_private_state {
            run.ctx.set_private_state(agent_id.clone(), state);
        }

        let Some(next) = reply.next_agent else {
            return self.transition(run, Aggregate).await;
        };

        run.hops += 1;
        self.observer.on_delegation(run.request_id(), &agent_id, &next, run.hops).await;
        if run.hops >= self.config.max_hops {
            let err = OrchestrationError::RecursionLimitExceeded {
                limit: self.config.max_hops,
            };
            warn!(request_id = %run.request_id(), agent_id = %agent_id, next = %next, "{}", err);
            run.degraded = true;
            run.error = Some((&err).into());
            return self.transition(run, Aggregate).await;
        }

        info!(
            request_id = %run.request_id(),
            from = %agent_id,
            to = %next,
            hop = run.hops,
            "Agent requested delegation"
        );
        cursor.directed = Some(next);
        self.transition(run, Select).await
    }

    async fn handle_failure(
        &self,
        run: &mut Run,
        cursor: &mut Cursor,
        agent_id: AgentId,
        failure: AgentFailure,
    ) -> Result<(), OrchestrationError> {
        warn!(
            request_id = %run.request_id(),
            agent_id = %agent_id,
            kind = failure.kind.as_str(),
            "Agent failed: {}",
            failure.message
        );
        self.observer.on_agent_failure(run.request_id(), &agent_id, &failure).await;

        if !failure.kind.allows_fallback() {
            return self.terminate(run, Failed, (&failure).into()).await;
        }

        cursor.exclude.insert(agent_id.clone());
        let fallback = if self.config.retry_with_supporting_agent && !cursor.retried {
            run.decisions.last().and_then(|d| {
                d.supporting_agents
                    .iter()
                    .find(|a| !cursor.exclude.contains(*a) && self.ledger.is_available(a))
                    .cloned()
            })
        } else {
            None
        };

        match fallback {
            Some(next) => {
                info!(
                    request_id = %run.request_id(),
                    failed = %agent_id,
                    retry_with = %next,
                    "Retrying with supporting agent"
                );
                cursor.retried = true;
                cursor.current = Some(next);
                self.transition(run, Delegate).await
            }
            None => self.terminate(run, Escalated, (&failure).into()).await,
        }
    }

    fn reflect(&self, run: &Run) {
        let trace = ExecutionTrace {
            request_id: run.request_id(),
            task_type: run.ctx.task.task_type().to_string(),
            decisions: run.decisions.clone(),
            steps: run.steps.clone(),
            hops: run.hops,
            degraded: run.degraded,
            history_len: run.ctx.history().len(),
            total_duration_ms: run.elapsed_ms(),
        };
        let improvements = self.reflection.analyze(&trace);
        if improvements.is_empty() {
            return;
        }
        if self.config.auto_apply_improvements {
            self.reflection.apply_improvements(Some(run.request_id()), &improvements);
        } else {
            info!(
                request_id = %run.request_id(),
                count = improvements.len(),
                "Improvements suggested, auto-apply disabled"
            );
        }
    }

    fn respond(&self, run: Run) -> OrchestrationResponse {
        let status = match run.state {
            Respond if run.cached.is_some() => ResponseStatus::Cached,
            Respond if run.degraded => ResponseStatus::Degraded,
            Respond => ResponseStatus::Completed,
            Escalated => ResponseStatus::Escalated,
            _ => ResponseStatus::Failed,
        };

        let (messages, decision, contributing_agents) = match run.cached {
            Some(hit) => (
                hit.response.messages,
                Some(hit.response.decision),
                hit.response.contributing_agents,
            ),
            None => (run.messages, run.decisions.last().cloned(), run.contributing),
        };

        // Cache hits skip the security scan, so monitored answers are never stored
        if status == ResponseStatus::Completed && !run.ctx.security.monitored {
            if let Some(decision) = &decision {
                self.cache.insert(
                    &run.ctx.task.text,
                    CachedResponse {
                        decision: decision.clone(),
                        messages: messages.clone(),
                        contributing_agents: contributing_agents.clone(),
                    },
                );
            }
        }

        let request_id = run.ctx.request_id;
        let rendered = self
            .renderer
            .render(&ResponseView {
                request_id: request_id.to_string(),
                status: status.as_str(),
                primary_agent: decision.as_ref().map(|d| d.primary_agent.as_str()),
                contributing_agents: contributing_agents.iter().map(AgentId::as_str).collect(),
                hops: run.hops,
                message_count: messages.len(),
                last_message: messages.last().map(|m| m.content.as_str()),
                error: run.error.as_ref().map(|e| e.message.as_str()),
            })
            .unwrap_or_else(|e| {
                warn!(request_id = %request_id, error = %e, "Response rendering failed");
                format!("[{}]", status.as_str())
            });

        let elapsed_ms = run.started.elapsed().as_millis() as u64;
        counter!("switchyard_requests_total", "status" => status.as_str()).increment(1);
        histogram!("switchyard_request_duration_ms").record(elapsed_ms as f64);
        info!(
            request_id = %request_id,
            status = status.as_str(),
            hops = run.hops,
            transitions = run.transitions.len(),
            duration_ms = elapsed_ms,
            "Request finished"
        );

        OrchestrationResponse {
            request_id,
            status,
            messages,
            decision,
            contributing_agents,
            hops: run.hops,
            transitions: run.transitions,
            error: run.error,
            risk_score: run.ctx.security.risk_score,
            monitored: run.ctx.security.monitored,
            rendered,
        }
    }
}
