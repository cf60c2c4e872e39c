//! Application use cases / business logic

pub mod coordinator;
pub mod scheduler;

pub use coordinator::{PublicationCoordinator, RunOutcome};
pub use scheduler::{SchedulerConfig, SchedulerLoop};
