//! Aggregation of raw per-instance counter records
//!
//! A logical counter produces one raw record per dimension instance. The
//! aggregator sums those records so that each requested counter yields a
//! single value representing total activity. No rate conversion or deltas.

use super::cache::Profile;
use lumen_shared::{CounterId, RawRecord};
use std::collections::HashMap;

/// Sums raw records per counter, reusing its scratch map across samples
#[derive(Debug, Default)]
pub struct CounterAggregator {
    sums: HashMap<CounterId, f64>,
}

impl CounterAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// One value per profile counter, in request order. Counters with no
    /// records this cycle report 0.
    pub fn aggregate(&mut self, records: &[RawRecord], profile: &Profile) -> Vec<f64> {
        self.sums.clear();
        for record in records {
            *self.sums.entry(record.counter_id).or_insert(0.0) += record.value;
        }

        profile
            .counter_ids
            .iter()
            .map(|id| self.sums.get(id).copied().unwrap_or(0.0))
            .collect()
    }
}

/// Stateless convenience wrapper around [`CounterAggregator::aggregate`]
pub fn aggregate(records: &[RawRecord], profile: &Profile) -> Vec<f64> {
    CounterAggregator::new().aggregate(records, profile)
}
