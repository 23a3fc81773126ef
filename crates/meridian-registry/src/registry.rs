//! The registry store: an in-memory catalog of agent descriptors.
//!
//! Instances are owned by the composition root and passed explicitly to the
//! planner, the supervisor, and the orchestrator. Several independent
//! registries can coexist, which is what the tests rely on.
//!
//! Registration rules:
//!
//! 1. A descriptor without an id or without capabilities is rejected.
//! 2. A self-dependency is dropped with a warning.
//! 3. Re-registering an id overwrites the previous descriptor with a warning.
//! 4. A registration that would close a dependency cycle (explicit or
//!    inferred from produced/consumed fields) is rejected and leaves the
//!    registry unchanged.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use meridian_contracts::{
    agent::{AgentDescriptor, AgentId, AgentStatus},
    error::{MeridianError, MeridianResult},
};

use crate::graph::{build_graph, find_cycle, DependencyGraph};

/// A non-fatal finding about a registered descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationWarning {
    pub agent_id: String,
    pub message: String,
}

impl RegistrationWarning {
    fn new(agent_id: &AgentId, message: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<AgentId, AgentDescriptor>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) a descriptor.
    ///
    /// Returns the warnings raised while normalizing the descriptor.
    ///
    /// # Errors
    ///
    /// `Registration` for a malformed descriptor, `DependencyCycle` when the
    /// new edges would close a cycle.
    pub fn register(
        &mut self,
        mut descriptor: AgentDescriptor,
    ) -> MeridianResult<Vec<RegistrationWarning>> {
        Self::check_well_formed(&descriptor)?;
        let mut warnings = Vec::new();

        let id = descriptor.id.clone();
        let before = descriptor.dependencies.len();
        descriptor.dependencies.retain(|d| d != &id);
        if descriptor.dependencies.len() != before {
            warn!(agent_id = %id, "self-dependency dropped");
            warnings.push(RegistrationWarning::new(&id, "self-dependency dropped"));
        }

        let mut candidate: Vec<&AgentDescriptor> =
            self.agents.values().filter(|a| a.id != id).collect();
        candidate.push(&descriptor);
        if let Some(cycle) = find_cycle(&build_graph(candidate)) {
            warn!(agent_id = %id, "registration rejected: dependency cycle");
            return Err(MeridianError::DependencyCycle {
                path: cycle.into_iter().map(|a| a.0).collect(),
            });
        }

        if self.agents.contains_key(&id) {
            warn!(agent_id = %id, "agent re-registered, previous descriptor overwritten");
            warnings.push(RegistrationWarning::new(&id, "previous registration overwritten"));
        }

        info!(
            agent_id = %id,
            priority = descriptor.priority,
            capabilities = descriptor.capabilities.len(),
            "agent registered"
        );
        self.agents.insert(id, descriptor);
        Ok(warnings)
    }

    pub fn deregister(&mut self, agent_id: &AgentId) -> Option<AgentDescriptor> {
        let removed = self.agents.remove(agent_id);
        if removed.is_some() {
            info!(agent_id = %agent_id, "agent deregistered");
        }
        removed
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<&AgentDescriptor> {
        self.agents.get(agent_id)
    }

    pub fn get_by_name(&self, agent_id: &str) -> Option<&AgentDescriptor> {
        self.agents.get(&AgentId::new(agent_id))
    }

    pub fn contains(&self, agent_id: &AgentId) -> bool {
        self.agents.contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// All descriptors by ascending priority, ties broken by id.
    pub fn list(&self) -> Vec<&AgentDescriptor> {
        let mut all: Vec<&AgentDescriptor> = self.agents.values().collect();
        all.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn active(&self) -> Vec<&AgentDescriptor> {
        self.list().into_iter().filter(|a| a.is_active()).collect()
    }

    pub fn find_by_capability(&self, capability: &str) -> Vec<&AgentDescriptor> {
        self.list()
            .into_iter()
            .filter(|a| a.capabilities.contains(capability))
            .collect()
    }

    /// Agents declaring `field` among their produced fields.
    pub fn producers_of(&self, field: &str) -> Vec<&AgentDescriptor> {
        self.list()
            .into_iter()
            .filter(|a| a.produced_fields.iter().any(|f| f == field))
            .collect()
    }

    pub fn primary_output(&self, agent_id: &AgentId) -> Option<&str> {
        self.agents.get(agent_id).and_then(AgentDescriptor::primary_output)
    }

    /// The effective dependency graph over every registered agent.
    pub fn dependency_graph(&self) -> DependencyGraph {
        build_graph(self.agents.values())
    }

    /// Fold one execution outcome into the agent's runtime metadata.
    pub fn record_execution(
        &mut self,
        agent_id: &AgentId,
        duration_ms: u64,
        success: bool,
    ) -> MeridianResult<()> {
        let descriptor = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| MeridianError::UnknownAgent {
                agent_id: agent_id.to_string(),
            })?;
        descriptor.runtime_metadata.record(duration_ms, success);
        debug!(
            agent_id = %agent_id,
            success,
            duration_ms,
            success_rate = descriptor.runtime_metadata.success_rate,
            "runtime metadata updated"
        );
        Ok(())
    }

    pub fn record_health_check(&mut self, agent_id: &AgentId) -> MeridianResult<()> {
        let descriptor = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| MeridianError::UnknownAgent {
                agent_id: agent_id.to_string(),
            })?;
        descriptor.runtime_metadata.last_health_check = Some(Utc::now());
        Ok(())
    }

    pub fn set_status(&mut self, agent_id: &AgentId, status: AgentStatus) -> MeridianResult<()> {
        let descriptor = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| MeridianError::UnknownAgent {
                agent_id: agent_id.to_string(),
            })?;
        info!(agent_id = %agent_id, ?status, "agent status changed");
        descriptor.status = status;
        Ok(())
    }

    /// Whole-registry consistency check, run after all registrations.
    ///
    /// Reports dependencies on unregistered or non-active agents and consumed
    /// fields nobody produces. None of these block planning.
    pub fn validate(&self) -> Vec<RegistrationWarning> {
        let mut warnings = Vec::new();
        for agent in self.list() {
            for dep in &agent.dependencies {
                match self.agents.get(dep) {
                    None => warnings.push(RegistrationWarning::new(
                        &agent.id,
                        format!("depends on unregistered agent '{dep}'"),
                    )),
                    Some(d) if !d.is_active() => warnings.push(RegistrationWarning::new(
                        &agent.id,
                        format!("depends on agent '{dep}' with status {:?}", d.status),
                    )),
                    Some(_) => {}
                }
            }
            for field in &agent.consumed_fields {
                if self.producers_of(field).iter().all(|p| p.id == agent.id) {
                    warnings.push(RegistrationWarning::new(
                        &agent.id,
                        format!("consumes field '{field}' that no other agent produces"),
                    ));
                }
            }
        }
        warnings
    }

    fn check_well_formed(descriptor: &AgentDescriptor) -> MeridianResult<()> {
        let reject = |reason: &str| MeridianError::Registration {
            agent_id: descriptor.id.to_string(),
            reason: reason.to_string(),
        };
        if descriptor.id.as_str().trim().is_empty() {
            return Err(reject("agent id is empty"));
        }
        if descriptor.capabilities.is_empty() {
            return Err(reject("no capabilities declared"));
        }
        if descriptor.capabilities.iter().any(|c| c.trim().is_empty()) {
            return Err(reject("capability names must be non-empty"));
        }
        if descriptor
            .dependencies
            .iter()
            .any(|d| d.as_str().trim().is_empty())
        {
            return Err(reject("dependency ids must be non-empty"));
        }
        if descriptor
            .produced_fields
            .iter()
            .chain(&descriptor.consumed_fields)
            .any(|f| f.trim().is_empty())
        {
            return Err(reject("state field names must be non-empty"));
        }
        Ok(())
    }
}
