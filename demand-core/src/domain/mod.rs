pub mod assist;
mod error;
pub mod export;
pub mod models;
pub mod ports;
pub mod progress;
pub mod session;
pub mod timeline;

pub use error::*;
pub use models::{Demand, DemandId, Phase};
pub use session::*;
