//! Periodic counter collection across all GPUs
//!
//! Assigns requested counter sets to samplers and publishes each sample to the
//! `lumen_gpu_performance_counter{card,name}` gauge.

use super::registry::SamplerRegistry;
use crate::error::{ConfigError, SamplerError};
use crate::metrics::GPU_PERFORMANCE_COUNTER;
use serde::Deserialize;
use tracing::info;

/// Ordered counter sets requested by the user.
///
/// Parsed from JSON: either a flat list of names (`["SQ_WAVES", "GRBM_COUNT"]`)
/// used for every GPU, or a list of lists assigned to GPUs round-robin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSets(Vec<Vec<String>>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCounterSets {
    Nested(Vec<Vec<String>>),
    Flat(Vec<String>),
}

impl CounterSets {
    pub fn new(sets: Vec<Vec<String>>) -> Result<Self, ConfigError> {
        if sets.is_empty() {
            return Err(ConfigError::CounterSets("no counter sets given".into()));
        }
        if let Some(idx) = sets.iter().position(|set| set.is_empty()) {
            return Err(ConfigError::CounterSets(format!("counter set {} is empty", idx)));
        }
        Ok(Self(sets))
    }

    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        let raw: RawCounterSets = serde_json::from_str(json)
            .map_err(|e| ConfigError::CounterSets(format!("decoding {:?}: {}", json, e)))?;
        match raw {
            RawCounterSets::Nested(sets) => Self::new(sets),
            RawCounterSets::Flat(set) if set.is_empty() => Self::new(Vec::new()),
            RawCounterSets::Flat(set) => Self::new(vec![set]),
        }
    }

    /// Counter set for the `index`-th GPU, cycling when GPUs outnumber sets
    pub fn for_gpu(&self, index: usize) -> &[String] {
        &self.0[index % self.0.len()]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CounterSets {
    fn default() -> Self {
        Self(vec![vec!["GRBM_COUNT".to_string()]])
    }
}

/// Drives every sampler in a registry with its assigned counter set
#[derive(Debug)]
pub struct CounterCollector {
    registry: SamplerRegistry,
    assignments: Vec<Vec<String>>,
}

impl CounterCollector {
    /// Assign counter sets and start every sampler
    pub fn start(mut registry: SamplerRegistry, sets: &CounterSets) -> Result<Self, SamplerError> {
        let assignments: Vec<Vec<String>> = (0..registry.len())
            .map(|i| sets.for_gpu(i).to_vec())
            .collect();

        let started = registry
            .iter_mut()
            .zip(&assignments)
            .try_for_each(|(sampler, names)| sampler.start(names.as_slice()));
        if let Err(e) = started {
            registry.teardown();
            return Err(e);
        }

        info!("counter collector: number of GPUs = {}", registry.len());
        for (card, names) in assignments.iter().enumerate() {
            info!("counter collector: GPU {} counter names = {:?}", card, names);
        }

        Ok(Self {
            registry,
            assignments,
        })
    }

    /// Sample every GPU, publish the values, and return them per GPU
    pub fn update(&mut self) -> Result<Vec<Vec<f64>>, SamplerError> {
        let mut all = Vec::with_capacity(self.assignments.len());
        for (card, (sampler, names)) in self
            .registry
            .iter_mut()
            .zip(&self.assignments)
            .enumerate()
        {
            let values = sampler.sample()?;
            let card = card.to_string();
            for (name, value) in names.iter().zip(&values) {
                GPU_PERFORMANCE_COUNTER
                    .with_label_values(&[card.as_str(), name.as_str()])
                    .set(*value);
            }
            all.push(values);
        }
        Ok(all)
    }

    /// Counter names assigned to each GPU, in card order
    pub fn assignments(&self) -> &[Vec<String>] {
        &self.assignments
    }

    /// Stop collection and release the registry
    pub fn shutdown(self) {
        self.registry.teardown();
    }
}
