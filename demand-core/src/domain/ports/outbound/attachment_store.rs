//! Attachment blob store port (outbound).

use crate::domain::{
    models::{DemandId, FileRef, Phase},
    DemandError,
};

/// Stores attachment bytes by key. The core only ever sees [`FileRef`]s.
pub trait AttachmentStore {
    fn put(
        &self,
        demand_id: &DemandId,
        phase: Phase,
        bytes: &[u8],
        filename: &str,
    ) -> Result<FileRef, DemandError>;

    fn get(&self, file: &FileRef) -> Result<Vec<u8>, DemandError>;

    /// Remove the blob. Missing blobs are a no-op.
    fn delete(&self, file: &FileRef) -> Result<(), DemandError>;
}
