// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_directory;
pub mod agents;
pub mod audit_log;
pub mod envelope;
pub mod llm;
pub mod performance_ledger;
pub mod prompt_template_engine;
pub mod security_scanner;
pub mod semantic_cache;
pub mod signing;
pub mod tool_handlers;
pub mod tool_registry;

pub use agent_directory::AgentDirectory;
pub use audit_log::AuditLog;
pub use envelope::{EnvelopeCodec, EnvelopeError, OrchestrationEnvelope};
pub use performance_ledger::{LoadGuard, PerformanceLedger};
pub use security_scanner::SecurityScanner;
pub use semantic_cache::SemanticCache;
pub use tool_registry::{InvocationScope, ToolBelt, ToolRegistry};
