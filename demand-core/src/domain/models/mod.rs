mod audit;
mod compat;
mod demand;
mod ids;
mod phase;
mod summary;
mod task;

pub use audit::*;
pub use demand::*;
pub use ids::*;
pub use phase::*;
pub use summary::*;
pub use task::*;

pub(crate) use task::iso_date;
