//! Persistence and derivation engine for demands moving through a nine-phase
//! delivery lifecycle.

pub mod adapters;
pub mod config;
pub mod domain;

pub use config::{read_config, Settings};
pub use domain::{Demand, DemandError, DemandId, Phase, Session};
