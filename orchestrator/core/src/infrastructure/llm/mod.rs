// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Completion Provider Infrastructure
//
// Adapters behind the `LLMProvider` port. The static provider keeps the
// orchestrator fully functional offline and in tests.

pub mod openai;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use crate::domain::llm::{
    FinishReason, GenerationOptions, GenerationResponse, LLMError, LLMProvider, TokenUsage,
};
use crate::domain::orchestrator_config::LlmProviderConfig;

pub use openai::OpenAIAdapter;

/// Returns a fixed text, or echoes the prompt when none is set.
#[derive(Debug, Default)]
pub struct StaticCompletionProvider {
    response: Option<String>,
    calls: AtomicUsize,
}

impl StaticCompletionProvider {
    pub fn echo() -> Self {
        Self::default()
    }

    pub fn fixed(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLMProvider for StaticCompletionProvider {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut text = self.response.clone().unwrap_or_else(|| prompt.to_string());
        let mut finish_reason = FinishReason::Stop;

        // Whitespace tokens stand in for model tokens
        if let Some(max) = options.max_tokens {
            let words: Vec<&str> = text.split_whitespace().collect();
            if words.len() > max as usize {
                text = words[..max as usize].join(" ");
                finish_reason = FinishReason::Length;
            }
        }

        let prompt_tokens = prompt.split_whitespace().count() as u32;
        let completion_tokens = text.split_whitespace().count() as u32;
        Ok(GenerationResponse {
            text,
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            provider: "static".to_string(),
            model: "static".to_string(),
            finish_reason,
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "static"
    }
}

pub fn provider_from_config(config: &LlmProviderConfig) -> anyhow::Result<Arc<dyn LLMProvider>> {
    match config {
        LlmProviderConfig::Static { response } => {
            info!(fixed = response.is_some(), "Using static completion provider");
            Ok(Arc::new(StaticCompletionProvider {
                response: response.clone(),
                calls: AtomicUsize::new(0),
            }))
        }
        LlmProviderConfig::Openai {
            endpoint,
            model,
            api_key_env,
        } => {
            let api_key = std::env::var(api_key_env)
                .with_context(|| format!("Environment variable {} is not set", api_key_env))?;
            info!(
                endpoint = %endpoint,
                model = %model,
                "Using OpenAI-compatible completion provider"
            );
            Ok(Arc::new(OpenAIAdapter::new(endpoint.clone(), api_key, model.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_echoes_and_truncates() {
        let provider = StaticCompletionProvider::echo();
        let options = GenerationOptions {
            max_tokens: Some(3),
            ..Default::default()
        };
        let response = provider.generate("one two three four five", &options).await.unwrap();
        assert_eq!(response.text, "one two three");
        assert_eq!(response.finish_reason, FinishReason::Length);
        assert_eq!(response.usage.total_tokens, 8);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_static_provider_fixed_response() {
        let provider = StaticCompletionProvider::fixed("Revenue grew 12%");
        let response = provider.generate("anything", &GenerationOptions::default()).await.unwrap();
        assert_eq!(response.text, "Revenue grew 12%");
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn test_openai_config_requires_key_env() {
        let config = LlmProviderConfig::Openai {
            endpoint: "http://localhost:8000/v1".into(),
            model: "m".into(),
            api_key_env: "SWITCHYARD_TEST_KEY_THAT_IS_NEVER_SET".into(),
        };
        assert!(provider_from_config(&config).is_err());
        assert_eq!(
            provider_from_config(&LlmProviderConfig::default()).unwrap().name(),
            "static"
        );
    }
}
