//! Edges between tasks (spec §3.1's DAG, §4.2's "send each output stripe
//! downstream via the corresponding edge descriptor's destination pool").
//!
//! `controller-model::ids` only mints the bare `EdgeId` handle; the
//! descriptor itself lives here since it names a `PoolId`, which is a
//! task-graph concept rather than a passive data-model type.

use controller_model::{EdgeId, OutputTableId, PoolId};
use serde::{Deserialize, Serialize};

/// One outgoing edge from a task. `output_stream` keys into a completed
/// job's `JobSummary::output_chunk_specs`, which is numbered by output
/// stream regardless of whether the stream ultimately lands in another
/// pool or a final output table — the same numbering a MapReduce DAG
/// already uses for its output partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDescriptor {
    pub id: EdgeId,
    pub output_stream: OutputTableId,
    pub destination: EdgeDestination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeDestination {
    /// Feeds a downstream task's pool.
    Pool(PoolId),
    /// Terminal: feeds an output table directly.
    Sink(OutputTableId),
}

impl EdgeDescriptor {
    pub fn to_pool(id: EdgeId, output_stream: OutputTableId, pool: PoolId) -> Self {
        Self {
            id,
            output_stream,
            destination: EdgeDestination::Pool(pool),
        }
    }

    pub fn to_sink(id: EdgeId, output_stream: OutputTableId, table: OutputTableId) -> Self {
        Self {
            id,
            output_stream,
            destination: EdgeDestination::Sink(table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_descriptors_carry_their_destination_kind() {
        let to_pool = EdgeDescriptor::to_pool(EdgeId(1), OutputTableId(0), PoolId(2));
        assert!(matches!(to_pool.destination, EdgeDestination::Pool(PoolId(2))));

        let to_sink = EdgeDescriptor::to_sink(EdgeId(2), OutputTableId(0), OutputTableId(3));
        assert!(matches!(to_sink.destination, EdgeDestination::Sink(OutputTableId(3))));
    }
}
