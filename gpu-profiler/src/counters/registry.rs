//! Registry of device samplers, one per GPU agent

use super::sampler::{DeviceSampler, SamplerState};
use crate::error::SamplerError;
use crate::provider::CounterProvider;
use std::sync::Arc;
use tracing::{info, warn};

/// Owns the samplers for every GPU agent. Created once by the process entry
/// point and passed by reference to whatever needs sampling.
#[derive(Debug)]
pub struct SamplerRegistry {
    samplers: Vec<DeviceSampler>,
}

impl SamplerRegistry {
    /// Enumerate agents and create a sampler per GPU, in provider order.
    ///
    /// Fails if the provider is unavailable or reports no GPU agents.
    pub fn initialize(provider: Arc<dyn CounterProvider>) -> Result<Self, SamplerError> {
        let agents = provider.list_agents()?;
        let samplers: Vec<DeviceSampler> = agents
            .into_iter()
            .filter(|agent| agent.is_gpu())
            .map(|agent| DeviceSampler::new(agent, provider.clone()))
            .collect();

        if samplers.is_empty() {
            return Err(SamplerError::NoAgents);
        }

        info!("sampler registry initialized with {} GPU agents", samplers.len());
        Ok(Self { samplers })
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut DeviceSampler> {
        self.samplers.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceSampler> {
        self.samplers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DeviceSampler> {
        self.samplers.iter_mut()
    }

    /// Stop every active sampler and release them
    pub fn teardown(mut self) {
        for sampler in self.samplers.iter_mut() {
            if sampler.state() == SamplerState::Active {
                if let Err(e) = sampler.stop() {
                    warn!(node = sampler.agent().node_id, "failed to stop sampler: {}", e);
                }
            }
        }
        info!("sampler registry torn down");
    }
}
