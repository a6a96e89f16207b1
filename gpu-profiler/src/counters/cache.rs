//! Counter profile resolution and caching
//!
//! Profiles are cached by the exact ordered list of requested names. Requesting
//! the same counters in a different order creates a separate entry: callers
//! match returned values to names positionally, so the order is part of the
//! profile's identity.

use crate::error::SamplerError;
use crate::provider::CounterProvider;
use lumen_shared::{AgentId, CounterDescriptor, CounterId, ProfileHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// An agent-bound, ordered resolution of counter names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub agent: AgentId,
    pub handle: ProfileHandle,
    /// Requested names, in request order
    pub names: Vec<String>,
    /// Resolved ids, parallel to `names`
    pub counter_ids: Vec<CounterId>,
    /// Total raw records one sample of this profile produces
    pub record_capacity: usize,
}

impl Profile {
    pub fn len(&self) -> usize {
        self.counter_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counter_ids.is_empty()
    }
}

/// Per-agent cache of resolved profiles. Unbounded; counter sets are few and stable.
#[derive(Debug)]
pub struct ProfileCache {
    agent: AgentId,
    profiles: HashMap<Vec<String>, Arc<Profile>>,
}

impl ProfileCache {
    pub fn new(agent: AgentId) -> Self {
        Self {
            agent,
            profiles: HashMap::new(),
        }
    }

    /// Return the profile for `names`, building and caching it on first use.
    ///
    /// Either every name resolves and the profile is cached, or nothing is
    /// mutated and `UnsupportedCounter` names the first unknown counter.
    pub fn resolve<S: AsRef<str>>(
        &mut self,
        provider: &dyn CounterProvider,
        names: &[S],
    ) -> Result<Arc<Profile>, SamplerError> {
        let key: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        if let Some(profile) = self.profiles.get(&key) {
            return Ok(profile.clone());
        }

        let supported: HashMap<String, CounterDescriptor> = provider
            .list_counters(self.agent)?
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();

        let mut counter_ids = Vec::with_capacity(key.len());
        let mut record_capacity = 0;
        for name in &key {
            let counter = supported
                .get(name)
                .ok_or_else(|| SamplerError::UnsupportedCounter(name.clone()))?;
            record_capacity += counter.instance_count();
            counter_ids.push(counter.id);
        }

        let handle = provider.create_profile(self.agent, &counter_ids)?;
        debug!(
            agent = %self.agent,
            counters = ?key,
            record_capacity,
            "created counter profile"
        );

        let profile = Arc::new(Profile {
            agent: self.agent,
            handle,
            names: key.clone(),
            counter_ids,
            record_capacity,
        });
        self.profiles.insert(key, profile.clone());
        Ok(profile)
    }

    /// Whether a profile for exactly this ordered list is cached
    pub fn contains<S: AsRef<str>>(&self, names: &[S]) -> bool {
        let key: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        self.profiles.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use lumen_shared::{Agent, RawRecord};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Provider exposing A (1 instance) and B (4 instances)
    struct FakeProvider {
        created: AtomicU64,
    }

    impl CounterProvider for FakeProvider {
        fn list_agents(&self) -> Result<Vec<Agent>, ProviderError> {
            Ok(vec![Agent::gpu(1, 0)])
        }

        fn list_counters(&self, _agent: AgentId) -> Result<Vec<CounterDescriptor>, ProviderError> {
            Ok(vec![
                CounterDescriptor::new("A", 10, vec![]),
                CounterDescriptor::new("B", 20, vec![2, 2]),
            ])
        }

        fn create_profile(
            &self,
            _agent: AgentId,
            _counters: &[CounterId],
        ) -> Result<ProfileHandle, ProviderError> {
            Ok(ProfileHandle(self.created.fetch_add(1, Ordering::Relaxed) + 1))
        }

        fn start_collection(&self, _: AgentId, _: ProfileHandle) -> Result<(), ProviderError> {
            Ok(())
        }

        fn stop_collection(&self, _: AgentId) -> Result<(), ProviderError> {
            Ok(())
        }

        fn pull_samples(&self, _: AgentId, _: &mut [RawRecord]) -> Result<usize, ProviderError> {
            Ok(0)
        }
    }

    fn fake() -> FakeProvider {
        FakeProvider {
            created: AtomicU64::new(0),
        }
    }

    #[test]
    fn test_capacity_sums_instances() {
        let provider = fake();
        let mut cache = ProfileCache::new(AgentId(1));

        let profile = cache.resolve(&provider, &["A", "B"]).unwrap();
        assert_eq!(profile.record_capacity, 5);
        assert_eq!(profile.counter_ids, vec![CounterId(10), CounterId(20)]);
        assert_eq!(profile.names, vec!["A", "B"]);
    }

    #[test]
    fn test_same_order_is_reused() {
        let provider = fake();
        let mut cache = ProfileCache::new(AgentId(1));

        let first = cache.resolve(&provider, &["A", "B"]).unwrap();
        let second = cache.resolve(&provider, &["A".to_string(), "B".to_string()]).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.created.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_different_order_is_distinct_entry() {
        let provider = fake();
        let mut cache = ProfileCache::new(AgentId(1));

        let ab = cache.resolve(&provider, &["A", "B"]).unwrap();
        let ba = cache.resolve(&provider, &["B", "A"]).unwrap();
        assert_ne!(ab.handle, ba.handle);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&["B", "A"]));
    }

    #[test]
    fn test_unknown_counter_mutates_nothing() {
        let provider = fake();
        let mut cache = ProfileCache::new(AgentId(1));

        let err = cache.resolve(&provider, &["A", "NOPE", "B"]).unwrap_err();
        assert!(matches!(err, SamplerError::UnsupportedCounter(ref n) if n == "NOPE"));
        assert!(cache.is_empty());
        assert_eq!(provider.created.load(Ordering::Relaxed), 0);
    }
}
