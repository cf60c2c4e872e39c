//! CLI command implementations

pub mod config;
pub mod doctor;
pub mod post;
pub mod run;
