// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tool handler adapters.
//!
//! Every tool has at least two possible backings: the real integration
//! ([`HttpToolHandler`]) and a deterministic stand-in ([`StubToolHandler`]).
//! Which one is used is decided by the binding's `handler.type`, never by
//! code inside the handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::orchestrator_config::{HandlerConfig, ToolBinding};
use crate::domain::tool::{Tool, ToolHandler, ToolHandlerError, ToolSpec};

/// Deterministic handler with a call counter.
#[derive(Debug, Default)]
pub struct StubToolHandler {
    response: Value,
    echo_args: bool,
    delay: Option<Duration>,
    fail_with: Option<String>,
    fail_first: usize,
    panic_with: Option<String>,
    calls: AtomicUsize,
}

impl StubToolHandler {
    pub fn returning(response: Value) -> Self {
        Self {
            response,
            ..Default::default()
        }
    }

    pub fn echo() -> Self {
        Self {
            echo_args: true,
            ..Default::default()
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Default::default()
        }
    }

    /// Fails the first `times` calls, then answers with `response`.
    pub fn flaky(times: usize, message: impl Into<String>, response: Value) -> Self {
        Self {
            response,
            fail_with: Some(message.into()),
            fail_first: times,
            ..Default::default()
        }
    }

    /// Panics when called. Exercises the registry's panic containment.
    pub fn panicking(message: impl Into<String>) -> Self {
        Self {
            panic_with: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolHandler for StubToolHandler {
    async fn call(&self, args: Value) -> Result<Value, ToolHandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.panic_with {
            panic!("{}", message);
        }
        if let Some(message) = &self.fail_with {
            if self.fail_first == 0 || call < self.fail_first {
                return Err(ToolHandlerError::Failed(message.clone()));
            }
        }
        if self.echo_args {
            return Ok(json!({ "echo": args }));
        }
        Ok(self.response.clone())
    }

    fn kind(&self) -> &'static str {
        "stub"
    }
}

/// POSTs arguments as JSON and returns the JSON response body.
pub struct HttpToolHandler {
    client: reqwest::Client,
    url: String,
    headers: HashMap<String, String>,
}

impl HttpToolHandler {
    pub fn new(url: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            headers,
        }
    }
}

#[async_trait]
impl ToolHandler for HttpToolHandler {
    async fn call(&self, args: Value) -> Result<Value, ToolHandlerError> {
        let mut request = self.client.post(&self.url).json(&args);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolHandlerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolHandlerError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ToolHandlerError::Transport(format!("invalid JSON body: {}", e)))
    }

    fn kind(&self) -> &'static str {
        "http"
    }
}

pub fn handler_from_config(config: &HandlerConfig) -> Arc<dyn ToolHandler> {
    match config {
        HandlerConfig::Stub {
            response,
            echo_args,
            delay,
            fail_with,
        } => Arc::new(StubToolHandler {
            response: response.clone(),
            echo_args: *echo_args,
            delay: *delay,
            fail_with: fail_with.clone(),
            ..Default::default()
        }),
        HandlerConfig::Http { url, headers } => {
            Arc::new(HttpToolHandler::new(url.clone(), headers.clone()))
        }
    }
}

/// Builds the registry-ready tool for a configured binding.
pub fn tool_from_binding(binding: &ToolBinding) -> Tool {
    let mut spec = ToolSpec::new(binding.name.clone(), binding.category)
        .with_description(binding.description.clone());
    if let Some(schema) = &binding.input_schema {
        spec = spec.with_schema(schema.clone());
    }
    Tool::new(spec, handler_from_config(&binding.handler))
}
