//! Application services
//!
//! Pruning, traversal, remote execution and scheduling are free functions
//! and concrete structs over the [`DocumentTree`](crate::domain::DocumentTree)
//! abstraction. [`PruneSession`] ties them together.

pub mod autorun;
pub mod pruner;
pub mod remote;
pub mod scheduler;
pub mod selectors;
pub mod session;
pub mod traversal;

pub use remote::{InProcessExecutor, Reach, RemoteExecutor, RemoteInvocation, RemoteOutcome};
pub use scheduler::{ConsistencyScheduler, HandleId, ObservationHandle, Schedule};
pub use session::{PageHost, PruneSession, SessionStats};
pub use traversal::{traverse, traverse_report, ReachedContext, TraversalReport};
