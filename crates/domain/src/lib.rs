//! postpilot domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and the post lifecycle state machine
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `usecases`: Publication coordinator and scheduler loop
//! - `policy`: Content and target constraints

pub mod model;
pub mod policy;
pub mod ports;
pub mod usecases;

pub use model::*;
pub use ports::*;
