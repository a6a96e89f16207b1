//! Per-agent device counter sampling
//!
//! A [`DeviceSampler`] owns the profile cache, the raw record buffer and the
//! aggregator for one agent. It is driven through `&mut self`, so concurrent
//! callers sharing one sampler must serialize access themselves (e.g. behind a
//! `Mutex`).

use super::aggregate::CounterAggregator;
use super::cache::{Profile, ProfileCache};
use crate::error::SamplerError;
use crate::provider::CounterProvider;
use lumen_shared::{Agent, RawRecord};
use std::sync::Arc;
use tracing::{debug, info};

/// Collection state of a sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Active,
}

/// Device counter sampler for one agent
pub struct DeviceSampler {
    agent: Agent,
    provider: Arc<dyn CounterProvider>,
    state: SamplerState,
    cache: ProfileCache,
    profile: Option<Arc<Profile>>,
    /// Raw records from the last sample; resized whenever the bound profile changes
    records: Vec<RawRecord>,
    aggregator: CounterAggregator,
}

impl DeviceSampler {
    pub fn new(agent: Agent, provider: Arc<dyn CounterProvider>) -> Self {
        Self {
            cache: ProfileCache::new(agent.id),
            agent,
            provider,
            state: SamplerState::Idle,
            profile: None,
            records: Vec::new(),
            aggregator: CounterAggregator::new(),
        }
    }

    /// Bind the profile for `counters` and start collection.
    ///
    /// May be called while already active to switch counter sets. If the
    /// counters are unsupported or the provider refuses to start, the
    /// previously bound profile, record buffer and state stay untouched.
    pub fn start<S: AsRef<str>>(&mut self, counters: &[S]) -> Result<(), SamplerError> {
        let profile = self.cache.resolve(self.provider.as_ref(), counters)?;

        self.provider
            .start_collection(self.agent.id, profile.handle)?;

        let changed = self
            .profile
            .as_ref()
            .map_or(true, |current| current.handle != profile.handle);
        if changed {
            self.records
                .resize(profile.record_capacity, RawRecord::default());
            debug!(
                agent = %self.agent.id,
                record_capacity = profile.record_capacity,
                "bound new counter profile"
            );
        }
        self.profile = Some(profile.clone());
        self.state = SamplerState::Active;

        info!(
            node = self.agent.node_id,
            counters = ?profile.names,
            "counter collection started"
        );
        Ok(())
    }

    /// Pull and aggregate one sample.
    ///
    /// While idle this does not touch the provider and returns zeros for the
    /// last bound profile (empty if no profile was ever bound).
    pub fn sample(&mut self) -> Result<Vec<f64>, SamplerError> {
        let Some(profile) = self.profile.as_ref() else {
            return Ok(Vec::new());
        };
        if self.state == SamplerState::Idle {
            return Ok(vec![0.0; profile.len()]);
        }

        let written = self
            .provider
            .pull_samples(self.agent.id, &mut self.records)?;
        let valid = written.min(self.records.len());

        Ok(self.aggregator.aggregate(&self.records[..valid], profile))
    }

    /// Halt collection. The bound profile and cache survive for the next `start`.
    pub fn stop(&mut self) -> Result<(), SamplerError> {
        self.provider.stop_collection(self.agent.id)?;
        self.state = SamplerState::Idle;
        debug!(node = self.agent.node_id, "counter collection stopped");
        Ok(())
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    /// Currently bound profile, if any
    pub fn profile(&self) -> Option<&Arc<Profile>> {
        self.profile.as_ref()
    }

    /// Size of the raw record buffer
    pub fn record_capacity(&self) -> usize {
        self.records.len()
    }

    /// Number of distinct cached profiles
    pub fn cached_profiles(&self) -> usize {
        self.cache.len()
    }
}

impl std::fmt::Debug for DeviceSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSampler")
            .field("agent", &self.agent)
            .field("state", &self.state)
            .field("profile", &self.profile)
            .field("record_capacity", &self.records.len())
            .finish()
    }
}
