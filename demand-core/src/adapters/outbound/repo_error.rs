use thiserror::Error;

use crate::domain::{DemandError, DemandId};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RepositoryError {
    /// Attach the demand the failure concerns; `None` means the index.
    pub fn for_demand(self, id: Option<&DemandId>) -> DemandError {
        DemandError::storage(id, self.to_string())
    }
}
