//! Task, Task Group, and Joblet Registry for the Operation Controller
//! (C3/C4/C5, spec §4.2-§4.4): the per-task state machine, the
//! priority-bucketed scheduling loop that offers jobs across many tasks,
//! and the edge/joblet bookkeeping those two lean on.

pub mod edge;
pub mod error;
pub mod joblet;
pub mod scheduling;
pub mod task;
pub mod task_group;

pub use edge::{EdgeDescriptor, EdgeDestination};
pub use error::{Result, TaskError};
pub use joblet::{CompletedJob, CompletedJobRegistry, Joblet, JobletRegistry};
pub use scheduling::{
    schedule_in_group, schedule_offer, ChunkListAvailability, ScheduleJobStatistics,
    ScheduleOutcome, TaskLookup,
};
pub use task::{
    AbortOutcome, CompletionRouting, FailOutcome, PoolLookup, SinkRoute, Task, TaskTemplate,
};
pub use task_group::TaskGroup;
