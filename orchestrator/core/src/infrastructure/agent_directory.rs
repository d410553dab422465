// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory directory of the agents the Supervisor may route to.
//!
//! Profiles are static; load, availability and reliability come from the
//! performance ledger at the moment a descriptor snapshot is taken.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::domain::agent::{Agent, AgentDescriptor, AgentId, AgentProfile};
use crate::domain::errors::OrchestrationError;
use crate::infrastructure::performance_ledger::PerformanceLedger;

struct DirectoryEntry {
    profile: AgentProfile,
    agent: Arc<dyn Agent>,
}

#[derive(Default)]
pub struct AgentDirectory {
    agents: RwLock<BTreeMap<AgentId, DirectoryEntry>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent and its capacity with the ledger.
    pub fn register(
        &self,
        profile: AgentProfile,
        agent: Arc<dyn Agent>,
        ledger: &PerformanceLedger,
    ) -> Result<(), OrchestrationError> {
        if profile.id != *agent.id() {
            return Err(OrchestrationError::Internal(format!(
                "profile '{}' registered with agent '{}'",
                profile.id,
                agent.id()
            )));
        }
        let mut agents = self.agents.write();
        if agents.contains_key(&profile.id) {
            return Err(OrchestrationError::DuplicateAgent(profile.id));
        }
        ledger.register_agent(&profile.id, profile.max_concurrency);
        info!(
            agent_id = %profile.id,
            capabilities = ?profile.capabilities,
            max_concurrency = profile.max_concurrency,
            "Registered agent"
        );
        agents.insert(profile.id.clone(), DirectoryEntry { profile, agent });
        Ok(())
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<Arc<dyn Agent>> {
        self.agents.read().get(agent_id).map(|e| e.agent.clone())
    }

    pub fn profile(&self, agent_id: &AgentId) -> Option<AgentProfile> {
        self.agents.read().get(agent_id).map(|e| e.profile.clone())
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.read().keys().cloned().collect()
    }

    pub fn agents(&self) -> Vec<Arc<dyn Agent>> {
        self.agents.read().values().map(|e| e.agent.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot every agent not in `exclude`, ordered by id.
    pub fn descriptors(
        &self,
        ledger: &PerformanceLedger,
        task_type: &str,
        exclude: &HashSet<AgentId>,
    ) -> Vec<AgentDescriptor> {
        self.agents
            .read()
            .values()
            .filter(|e| !exclude.contains(&e.profile.id))
            .map(|e| {
                let id = &e.profile.id;
                AgentDescriptor {
                    id: id.clone(),
                    capabilities: e.profile.capabilities.iter().cloned().collect(),
                    allowed_tools: e.profile.allowed_tools.iter().cloned().collect(),
                    load: ledger.load(id),
                    status: ledger.status(id),
                    performance: ledger.score_for_task(id, task_type),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentFailure, AgentReply, AgentStatus};
    use crate::domain::execution::ExecutionContext;
    use crate::domain::tool::ToolAccess;
    use crate::domain::tuning::TuningHandle;
    use async_trait::async_trait;

    struct Fixed(AgentId);

    #[async_trait]
    impl Agent for Fixed {
        fn id(&self) -> &AgentId {
            &self.0
        }

        async fn invoke(
            &self,
            _ctx: &ExecutionContext,
            _tools: &dyn ToolAccess,
        ) -> Result<AgentReply, AgentFailure> {
            Ok(AgentReply::message("ok"))
        }
    }

    fn register(dir: &AgentDirectory, ledger: &PerformanceLedger, id: &str, caps: &[&str]) {
        let profile = AgentProfile::new(id)
            .with_capabilities(caps.iter().copied())
            .with_max_concurrency(2);
        dir.register(profile, Arc::new(Fixed(AgentId::new(id))), ledger).unwrap();
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let ledger = PerformanceLedger::new(100, TuningHandle::default());
        let dir = AgentDirectory::new();
        register(&dir, &ledger, "analyst", &["finance"]);
        let duplicate = Arc::new(Fixed(AgentId::new("analyst")));
        let err = dir
            .register(AgentProfile::new("analyst"), duplicate, &ledger)
            .unwrap_err();
        assert_eq!(err, OrchestrationError::DuplicateAgent(AgentId::new("analyst")));
    }

    #[test]
    fn test_descriptors_reflect_ledger_state() {
        let ledger = PerformanceLedger::new(100, TuningHandle::default());
        let dir = AgentDirectory::new();
        register(&dir, &ledger, "b_agent", &["research"]);
        register(&dir, &ledger, "a_agent", &["finance", "analysis"]);

        let _guard = ledger.begin(&AgentId::new("a_agent")).unwrap();
        ledger.set_available(&AgentId::new("b_agent"), false);

        let snapshot = dir.descriptors(&ledger, "general", &HashSet::new());
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id.as_str(), "a_agent");
        assert!((snapshot[0].load - 0.5).abs() < 1e-9);
        assert!(snapshot[0].capabilities.contains("analysis"));
        assert_eq!(snapshot[1].status, AgentStatus::Unavailable);

        let exclude: HashSet<AgentId> = [AgentId::new("a_agent")].into_iter().collect();
        let snapshot = dir.descriptors(&ledger, "general", &exclude);
        assert_eq!(snapshot.len(), 1);
    }
}
