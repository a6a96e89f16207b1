//! Agent (device) identities as enumerated by the telemetry provider

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque provider handle for one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent:{:#x}", self.0)
    }
}

/// Stable numeric node id assigned by the provider
pub type NodeId = u32;

/// Kind of processing agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentKind {
    Cpu,
    Gpu,
}

/// One accelerator (or host CPU) as seen by the provider. Immutable once enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub node_id: NodeId,
    pub kind: AgentKind,
}

impl Agent {
    pub fn gpu(id: u64, node_id: NodeId) -> Self {
        Self {
            id: AgentId(id),
            node_id,
            kind: AgentKind::Gpu,
        }
    }

    pub fn is_gpu(&self) -> bool {
        self.kind == AgentKind::Gpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_display() {
        assert_eq!(AgentId(0x2a).to_string(), "agent:0x2a");
    }

    #[test]
    fn test_gpu_constructor() {
        let agent = Agent::gpu(7, 2);
        assert!(agent.is_gpu());
        assert_eq!(agent.node_id, 2);

        let cpu = Agent {
            kind: AgentKind::Cpu,
            ..agent
        };
        assert!(!cpu.is_gpu());
    }
}
