mod assistant;
mod attachment_store;
mod demand_repository;

pub use assistant::*;
pub use attachment_store::*;
pub use demand_repository::*;
