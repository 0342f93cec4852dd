//! External collaborator traits (spec §6): the cluster scheduler and the
//! Master metadata/storage service are out of scope for this workspace,
//! but the controller needs a typed boundary to call them through. These
//! are plain async traits — no wire codec is generated here, matching
//! `orbit_proto`'s service-trait shape without the `tonic`/`prost`
//! machinery, since §1 treats both collaborators as external.

pub mod error;
pub mod master;
pub mod resilient;
pub mod scheduler;
pub mod testing;

pub use error::{ProtoError, Result};
pub use master::{ChunkLocateResult, CypressNode, LockMode, Master, TableStatistics, UploadParams};
pub use resilient::ResilientMaster;
pub use scheduler::{NodeDescriptor, ScheduleContext, ScheduleOutcome, Scheduler};
