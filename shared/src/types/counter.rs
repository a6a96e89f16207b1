//! Hardware counter descriptors and raw sample records
//!
//! GPU counters are not simple scalars: a counter may exist per shader engine,
//! per compute unit, and so on. The provider reports one raw record for each
//! dimension instance, so the number of records a logical counter produces per
//! sample is the product of its dimension sizes.

use serde::{Deserialize, Serialize};

/// Opaque provider id of a counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterId(pub u64);

/// Opaque provider handle of a materialized counter profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileHandle(pub u64);

/// A counter exposed by one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDescriptor {
    /// Counter name, unique per agent (e.g. "SQ_WAVES")
    pub name: String,

    /// Provider id
    pub id: CounterId,

    /// Size of each dimension (e.g. number of SEs, CUs)
    pub dimensions: Vec<u64>,
}

impl CounterDescriptor {
    pub fn new(name: impl Into<String>, id: u64, dimensions: Vec<u64>) -> Self {
        Self {
            name: name.into(),
            id: CounterId(id),
            dimensions,
        }
    }

    /// Number of raw records this counter produces per sample
    pub fn instance_count(&self) -> usize {
        self.dimensions.iter().product::<u64>() as usize
    }
}

/// One provider-delivered value for one counter-dimension instance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub counter_id: CounterId,
    pub value: f64,
}

impl RawRecord {
    pub fn new(counter_id: u64, value: f64) -> Self {
        Self {
            counter_id: CounterId(counter_id),
            value,
        }
    }
}

impl Default for RawRecord {
    fn default() -> Self {
        Self {
            counter_id: CounterId(0),
            value: 0.0,
        }
    }
}
