//! Stable integer handles and opaque cookies.
//!
//! Tasks, pools, and edges form a cyclic reference graph (task -> pool ->
//! edge -> next pool -> ...). Per the arena-of-handles design, none of
//! these own each other directly; they are looked up by handle in a
//! per-operation arena. Handles and cookies serialize directly into
//! snapshots.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! handle_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

handle_type!(ChunkId, "Identity of one stored data chunk.");
handle_type!(TaskId, "Stable handle to a DAG node (Task).");
handle_type!(PoolId, "Stable handle to a ChunkPool instance.");
handle_type!(TaskGroupId, "Stable handle to a TaskGroup.");
handle_type!(JobletId, "Stable handle to an in-flight joblet.");
handle_type!(OutputTableId, "Stable handle to an OutputTable.");
handle_type!(
    EdgeId,
    "Stable handle to an edge descriptor between two tasks."
);

/// Opaque handle returned by a chunk pool identifying a pending stripe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputCookie(pub u64);

/// Opaque handle returned by a chunk pool identifying an extracted job's
/// stripe list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputCookie(pub u64);

impl fmt::Display for InputCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in-cookie#{}", self.0)
    }
}

impl fmt::Display for OutputCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "out-cookie#{}", self.0)
    }
}

/// Scheduler-assigned identity of a cluster node making an offer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

/// Storage-cell identity (a table or chunk list lives in exactly one cell).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellTag(pub String);

/// Master-issued identity of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

/// Scheduler-assigned job identity, unique within the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

/// Operation identity, unique cluster-wide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub String);

/// Monotonic counter for allocating handles of a given kind within an
/// operation's arena.
#[derive(Debug, Default)]
pub struct HandleAllocator {
    next: u64,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn alloc(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_allocator_is_monotonic() {
        let mut alloc = HandleAllocator::new();
        assert_eq!(alloc.alloc(), 0);
        assert_eq!(alloc.alloc(), 1);
        assert_eq!(alloc.alloc(), 2);
    }

    #[test]
    fn handles_display_distinctly() {
        assert_eq!(TaskId(3).to_string(), "TaskId#3");
        assert_eq!(InputCookie(7).to_string(), "in-cookie#7");
    }
}
