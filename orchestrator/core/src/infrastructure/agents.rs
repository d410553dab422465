// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Configuration-driven agent.
//!
//! A [`TemplatedAgent`] runs its tool plan through the scoped tool access it
//! is handed, renders a Handlebars prompt from the task, history and tool
//! output, and asks the completion provider to phrase the answer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::domain::agent::{Agent, AgentFailure, AgentFailureKind, AgentId, AgentReply};
use crate::domain::execution::ExecutionContext;
use crate::domain::llm::{GenerationOptions, LLMProvider};
use crate::domain::orchestrator_config::{AgentConfig, ToolStep};
use crate::domain::tool::ToolAccess;
use crate::infrastructure::prompt_template_engine::{PromptContext, PromptTemplateEngine};

pub struct TemplatedAgent {
    id: AgentId,
    description: String,
    prompt_template: Option<String>,
    tool_plan: Vec<ToolStep>,
    delegate_to: Option<AgentId>,
    generation: GenerationOptions,
    provider: Arc<dyn LLMProvider>,
    templates: Arc<PromptTemplateEngine>,
    generation_timeout: Duration,
}

impl TemplatedAgent {
    pub fn from_config(
        config: &AgentConfig,
        provider: Arc<dyn LLMProvider>,
        templates: Arc<PromptTemplateEngine>,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            id: config.profile.id.clone(),
            description: config.profile.description.clone(),
            prompt_template: config.prompt_template.clone(),
            tool_plan: config.tool_plan.clone(),
            delegate_to: config.delegate_to.clone(),
            generation: config.generation.clone(),
            provider,
            templates,
            generation_timeout,
        }
    }

    fn step_arguments(step: &ToolStep, ctx: &ExecutionContext) -> Value {
        let mut args = step.arguments.clone();
        if step.include_task {
            match &mut args {
                Value::Object(map) => {
                    map.insert("task".to_string(), Value::String(ctx.task.text.clone()));
                }
                _ => args = json!({ "task": ctx.task.text }),
            }
        }
        args
    }

    /// Delegate at most once per request so two configured agents cannot
    /// bounce a task back and forth forever.
    fn should_delegate(&self, ctx: &ExecutionContext) -> Option<AgentId> {
        let target = self.delegate_to.as_ref()?;
        let already = ctx
            .private_state(&self.id)
            .and_then(|s| s.get("delegated"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        (!already).then(|| target.clone())
    }
}

#[async_trait]
impl Agent for TemplatedAgent {
    fn id(&self) -> &AgentId {
        &self.id
    }

    async fn invoke(
        &self,
        ctx: &ExecutionContext,
        tools: &dyn ToolAccess,
    ) -> Result<AgentReply, AgentFailure> {
        let mut prompt_ctx = PromptContext::new(&self.id, ctx.task.text.clone())
            .description(self.description.clone())
            .task_type(ctx.task.task_type())
            .history(ctx.recent_history())
            .monitored(ctx.security.monitored);

        let mut tools_used = Vec::with_capacity(self.tool_plan.len());
        for step in &self.tool_plan {
            let output = tools.call(&step.tool, Self::step_arguments(step, ctx)).await?;
            debug!(agent_id = %self.id, tool = %step.tool, "Tool step completed");
            tools_used.push(step.tool.clone());
            prompt_ctx = prompt_ctx.tool_result(step.tool.clone(), output);
        }

        let prompt = self
            .templates
            .render_with_fallback(self.prompt_template.as_deref(), &prompt_ctx)
            .map_err(|e| AgentFailure::new(AgentFailureKind::Internal, format!("{:#}", e)))?;

        let generation = self.provider.generate(&prompt, &self.generation);
        let response = match tokio::time::timeout(self.generation_timeout, generation).await {
            Err(_) => {
                return Err(AgentFailure::new(
                    AgentFailureKind::GenerationTimeout,
                    format!(
                        "{} did not answer within {:?}",
                        self.provider.name(),
                        self.generation_timeout
                    ),
                ))
            }
            Ok(Err(e)) if e.is_timeout() => {
                return Err(AgentFailure::new(
                    AgentFailureKind::GenerationTimeout,
                    e.to_string(),
                ))
            }
            Ok(Err(e)) => {
                warn!(
                    agent_id = %self.id,
                    provider = self.provider.name(),
                    error = %e,
                    "Text generation failed"
                );
                return Err(AgentFailure::new(AgentFailureKind::GenerationFailed, e.to_string()));
            }
            Ok(Ok(response)) => response,
        };

        let mut reply = AgentReply::message(response.text);
        reply.tools_used = tools_used;
        if let Some(target) = self.should_delegate(ctx) {
            reply = reply.delegate_to(target).with_private_state(json!({ "delegated": true }));
        }
        Ok(reply)
    }

    async fn health_check(&self) -> bool {
        self.provider.health_check().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::OrchestrationError;
    use crate::domain::execution::{OrchestrationRequest, Task};
    use crate::domain::llm::{GenerationResponse, LLMError};
    use crate::domain::tool::{ToolCategory, ToolSpec};
    use crate::infrastructure::llm::StaticCompletionProvider;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTools {
        calls: Mutex<Vec<(String, Value)>>,
        deny: bool,
    }

    #[async_trait]
    impl ToolAccess for RecordingTools {
        fn available_tools(&self) -> Vec<ToolSpec> {
            vec![ToolSpec::new("web_search", ToolCategory::Search)]
        }

        async fn call(&self, tool: &str, args: Value) -> Result<Value, OrchestrationError> {
            if self.deny {
                return Err(OrchestrationError::PermissionDenied {
                    agent_id: AgentId::new("researcher"),
                    tool: tool.to_string(),
                });
            }
            self.calls.lock().push((tool.to_string(), args));
            Ok(json!({"hits": ["ACME 10-Q"]}))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl LLMProvider for SlowProvider {
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<GenerationResponse, LLMError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(LLMError::Provider("unreachable".into()))
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            Err(LLMError::Network("down".into()))
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn config(yaml: &str) -> AgentConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn context(text: &str) -> ExecutionContext {
        ExecutionContext::new(&OrchestrationRequest::new("alice", Task::new(text)), 20)
    }

    #[tokio::test]
    async fn test_runs_tool_plan_then_generates() {
        let cfg = config(
            r#"id: researcher
capabilities: [research]
tool_plan:
  - tool: web_search
    include_task: true
prompt_template: "{{task}} => {{json tool_results}}"
"#,
        );
        let agent = TemplatedAgent::from_config(
            &cfg,
            Arc::new(StaticCompletionProvider::echo()),
            Arc::new(PromptTemplateEngine::new()),
            Duration::from_secs(1),
        );
        let tools = RecordingTools::default();
        let reply = agent.invoke(&context("ACME revenue"), &tools).await.unwrap();

        assert_eq!(reply.tools_used, vec!["web_search".to_string()]);
        assert_eq!(tools.calls.lock()[0].1, json!({"task": "ACME revenue"}));
        assert_eq!(
            reply.response_messages[0],
            r#"ACME revenue => {"web_search":{"hits":["ACME 10-Q"]}}"#
        );
        assert!(reply.next_agent.is_none());
    }

    #[tokio::test]
    async fn test_tool_errors_become_agent_failures() {
        let cfg = config("id: researcher\ntool_plan:\n  - tool: web_search\n");
        let agent = TemplatedAgent::from_config(
            &cfg,
            Arc::new(StaticCompletionProvider::echo()),
            Arc::new(PromptTemplateEngine::new()),
            Duration::from_secs(1),
        );
        let tools = RecordingTools {
            deny: true,
            ..Default::default()
        };
        let failure = agent.invoke(&context("x"), &tools).await.unwrap_err();
        assert_eq!(failure.kind, AgentFailureKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_generation_timeout_is_distinct() {
        let agent = TemplatedAgent::from_config(
            &config("id: writer\n"),
            Arc::new(SlowProvider),
            Arc::new(PromptTemplateEngine::new()),
            Duration::from_millis(20),
        );
        let failure = agent.invoke(&context("x"), &RecordingTools::default()).await.unwrap_err();
        assert_eq!(failure.kind, AgentFailureKind::GenerationTimeout);
        assert!(!agent.health_check().await);
    }

    #[tokio::test]
    async fn test_delegates_only_once() {
        let agent = TemplatedAgent::from_config(
            &config("id: triage\ndelegate_to: specialist\n"),
            Arc::new(StaticCompletionProvider::fixed("routing")),
            Arc::new(PromptTemplateEngine::new()),
            Duration::from_secs(1),
        );
        let mut ctx = context("help");
        let first = agent.invoke(&ctx, &RecordingTools::default()).await.unwrap();
        assert_eq!(first.next_agent, Some(AgentId::new("specialist")));

        ctx.set_private_state(AgentId::new("triage"), first.updated_private_state.unwrap());
        let second = agent.invoke(&ctx, &RecordingTools::default()).await.unwrap();
        assert!(second.next_agent.is_none());
    }
}
