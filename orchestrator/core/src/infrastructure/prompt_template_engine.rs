// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Prompt Template Engine
//!
//! Handlebars rendering for two things: the prompt an agent sends to its
//! completion provider, and the human-readable summary attached to every
//! orchestration response.
//!
//! # Prompt Placeholders
//!
//! - `{{agent_id}}` / `{{description}}` - the agent being prompted
//! - `{{task}}` - the user's task text
//! - `{{task_type}}` - task classification label
//! - `{{history}}` - recent conversation, one `author: content` line each
//! - `{{tool_results}}` - JSON object of tool name to tool output
//! - `{{monitored}}` - true when the request is under security monitoring
//!
//! # Usage
//!
//! ```ignore
//! let engine = PromptTemplateEngine::new();
//! let prompt = engine.render_with_fallback(config.prompt_template.as_deref(), &context)?;
//! ```

use anyhow::{Context, Result};
use handlebars::{Context as RenderData, Handlebars, Helper, HelperResult, Output, RenderContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::agent::AgentId;
use crate::domain::execution::ConversationMessage;

// ============================================================================
// Template Context
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptContext {
    pub agent_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub task: String,

    pub task_type: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub history: String,

    /// Tool name to tool output for every tool the agent ran this turn.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub tool_results: serde_json::Map<String, Value>,

    pub monitored: bool,

    /// Additional custom fields
    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

impl PromptContext {
    pub fn new(agent_id: &AgentId, task: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            task: task.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.is_empty()).then_some(description);
        self
    }

    pub fn task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    pub fn history(mut self, messages: &[ConversationMessage]) -> Self {
        self.history = messages
            .iter()
            .map(|m| format!("{}: {}", m.author, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        self
    }

    pub fn tool_result(mut self, tool: impl Into<String>, output: Value) -> Self {
        self.tool_results.insert(tool.into(), output);
        self
    }

    pub fn monitored(mut self, monitored: bool) -> Self {
        self.monitored = monitored;
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }
}

// ============================================================================
// Template Engine
// ============================================================================

pub struct PromptTemplateEngine {
    handlebars: Handlebars<'static>,
}

impl PromptTemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        // Missing placeholders render empty instead of failing the turn
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_helper("json", Box::new(json_helper));
        Self { handlebars }
    }

    pub fn render(&self, template: &str, context: &PromptContext) -> Result<String> {
        self.handlebars
            .render_template(template, context)
            .context("Failed to render prompt template")
    }

    /// Render the agent's template, or [`Self::default_template`] when none is configured.
    pub fn render_with_fallback(
        &self,
        template: Option<&str>,
        context: &PromptContext,
    ) -> Result<String> {
        self.render(template.unwrap_or(Self::default_template()), context)
    }

    pub fn default_template() -> &'static str {
        "{{#if description}}You are {{agent_id}}: {{description}}\n\n{{/if}}\
         Task: {{task}}\n\
         {{#if history}}\nConversation so far:\n{{history}}\n{{/if}}\
         {{#if tool_results}}\nTool results:\n{{json tool_results}}\n{{/if}}"
    }

    /// Validate template syntax without rendering
    pub fn validate_template(&self, template: &str) -> Result<()> {
        handlebars::template::Template::compile(template)
            .map(|_| ())
            .context("Invalid Handlebars template syntax")
    }
}

/// `{{json value}}` writes the parameter as compact JSON.
fn json_helper(
    h: &Helper,
    _: &Handlebars,
    _: &RenderData,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    if let Some(param) = h.param(0) {
        out.write(&param.value().to_string())?;
    }
    Ok(())
}

impl Default for PromptTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Response Rendering
// ============================================================================

/// Fields available to response templates.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseView<'a> {
    pub request_id: String,
    pub status: &'a str,
    pub primary_agent: Option<&'a str>,
    pub contributing_agents: Vec<&'a str>,
    pub hops: u32,
    pub message_count: usize,
    pub last_message: Option<&'a str>,
    pub error: Option<&'a str>,
}

const COMPLETED: &str = "[{{status}}] {{primary_agent}} answered in {{hops}} hop(s)\
{{#if contributing_agents}} with {{#each contributing_agents}}{{this}}{{#unless @last}}, {{/unless}}{{/each}}{{/if}}\
{{#if last_message}}: {{last_message}}{{/if}}";
const ESCALATED: &str = "[{{status}}] request {{request_id}} needs human review: {{error}}";
const FAILED: &str = "[{{status}}] request {{request_id}} failed: {{error}}";

/// One-line summaries keyed by response status.
pub struct ResponseRenderer {
    handlebars: Handlebars<'static>,
}

impl ResponseRenderer {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        for (name, template) in [
            ("completed", COMPLETED),
            ("degraded", COMPLETED),
            ("cached", COMPLETED),
            ("escalated", ESCALATED),
            ("failed", FAILED),
        ] {
            handlebars
                .register_template_string(name, template)
                .with_context(|| format!("Invalid response template '{}'", name))?;
        }
        Ok(Self { handlebars })
    }

    pub fn render(&self, view: &ResponseView<'_>) -> Result<String> {
        self.handlebars
            .render(view.status, view)
            .with_context(|| format!("Failed to render '{}' response", view.status))
    }
}

// ============================================================================
// Tests
// ============================================================================
