// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tool Domain Types
//!
//! A [`Tool`] pairs an immutable [`ToolSpec`] with a [`ToolHandler`] adapter.
//! Tools are owned by the registry once registered; agents only ever see the
//! spec and reach handlers through a [`ToolAccess`] view.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::OrchestrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Search,
    Communication,
    Calendar,
    CodeHosting,
    ImageGeneration,
    Analysis,
    Filesystem,
    System,
    Other,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Search => "search",
            ToolCategory::Communication => "communication",
            ToolCategory::Calendar => "calendar",
            ToolCategory::CodeHosting => "code_hosting",
            ToolCategory::ImageGeneration => "image_generation",
            ToolCategory::Analysis => "analysis",
            ToolCategory::Filesystem => "filesystem",
            ToolCategory::System => "system",
            ToolCategory::Other => "other",
        }
    }
}

impl Default for ToolCategory {
    fn default() -> Self {
        ToolCategory::Other
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public description of a tool. This is all an agent is ever handed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the call arguments.
    pub input_schema: Value,
    pub category: ToolCategory,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, category: ToolCategory) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: serde_json::json!({ "type": "object" }),
            category,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Raw failure reported by a handler. The registry normalizes it into an
/// [`OrchestrationError`] tagged with tool name and elapsed time.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolHandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },
}

/// Adapter behind a tool. Real integrations and deterministic stubs both
/// implement this; which one backs a tool is decided by configuration.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value, ToolHandlerError>;

    /// Short label used in logs (`stub`, `http`, ...).
    fn kind(&self) -> &'static str {
        "custom"
    }
}

/// Immutable tool definition.
#[derive(Clone)]
pub struct Tool {
    spec: ToolSpec,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(spec: ToolSpec, handler: Arc<dyn ToolHandler>) -> Self {
        Self { spec, handler }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub fn category(&self) -> ToolCategory {
        self.spec.category
    }

    pub(crate) fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("spec", &self.spec)
            .field("handler", &self.handler.kind())
            .finish()
    }
}

/// Agent-scoped access to tools.
#[async_trait]
pub trait ToolAccess: Send + Sync {
    /// Tools this agent may call.
    fn available_tools(&self) -> Vec<ToolSpec>;

    async fn call(&self, tool: &str, args: Value) -> Result<Value, OrchestrationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&ToolCategory::CodeHosting).unwrap();
        assert_eq!(json, "\"code_hosting\"");
        let parsed: ToolCategory = serde_json::from_str("\"image_generation\"").unwrap();
        assert_eq!(parsed, ToolCategory::ImageGeneration);
    }

    #[test]
    fn test_spec_defaults_to_object_schema() {
        let spec =
            ToolSpec::new("web_search", ToolCategory::Search).with_description("Search the web");
        assert_eq!(spec.input_schema["type"], "object");
        assert_eq!(spec.description, "Search the web");
    }
}
