//! Job and result wire messages.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::QueueResult;
use crate::graph::{InLink, VertexId};

/// Content type tag attached to every broker message.
pub const CONTENT_TYPE: &str = "application/x-bincode";

/// Wire discriminator for Map jobs.
pub const JOB_TYPE_MAP: u8 = 0;
/// Wire discriminator for Reduce jobs.
pub const JOB_TYPE_REDUCE: u8 = 1;

/// Per-vertex payload of a Map job: the in-link replicas the worker
/// needs to form the contribution sum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub in_links: HashMap<VertexId, InLink>,
}

/// Per-vertex payload of a Reduce job: the accumulated contribution
/// sum and the teleport weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReduceEntry {
    pub sum: f64,
    pub e: f64,
}

/// A unit of work published to the work queue. `job_type` is the
/// wire discriminator (0 = Map, 1 = Reduce); the mapping the variant
/// does not use is present but empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_type: u8,
    pub map_data: HashMap<VertexId, MapEntry>,
    pub reduce_data: HashMap<VertexId, ReduceEntry>,
}

impl Job {
    pub fn map(map_data: HashMap<VertexId, MapEntry>) -> Self {
        Self {
            job_type: JOB_TYPE_MAP,
            map_data,
            reduce_data: HashMap::new(),
        }
    }

    pub fn reduce(reduce_data: HashMap<VertexId, ReduceEntry>) -> Self {
        Self {
            job_type: JOB_TYPE_REDUCE,
            map_data: HashMap::new(),
            reduce_data,
        }
    }

    pub fn encode(&self) -> QueueResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> QueueResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Partial sums computed by a worker, keyed by vertex id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub values: HashMap<VertexId, f64>,
}

impl JobResult {
    pub fn encode(&self) -> QueueResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> QueueResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InLink;

    #[test]
    fn test_map_job_wire_shape() {
        let mut in_links = HashMap::new();
        in_links.insert(2, InLink { rank: 0.5, out_degree: 1 });
        let job = Job::map([(1, MapEntry { in_links })].into_iter().collect());

        assert_eq!(job.job_type, JOB_TYPE_MAP);
        assert!(job.reduce_data.is_empty());

        let decoded = Job::decode(&job.encode().unwrap()).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_reduce_job_wire_shape() {
        let job = Job::reduce([(1, ReduceEntry { sum: 0.25, e: 0.5 })].into_iter().collect());

        assert_eq!(job.job_type, JOB_TYPE_REDUCE);
        assert!(job.map_data.is_empty());

        let decoded = Job::decode(&job.encode().unwrap()).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_result_decode_rejects_garbage() {
        assert!(JobResult::decode(&[0xff, 0x01]).is_err());
    }
}
