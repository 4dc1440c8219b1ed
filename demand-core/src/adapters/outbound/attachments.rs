use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use time::OffsetDateTime;
use tracing::{debug, instrument};

use super::RepositoryError;
use crate::domain::models::{FileRef, Phase};
use crate::domain::ports::outbound::AttachmentStore;
use crate::domain::{DemandError, DemandId};

const MAX_FILENAME_LEN: usize = 255;

/// Make an uploaded file name safe to use as a single path component.
///
/// Anything outside `[A-Za-z0-9._-]` becomes `_`, a leading `.` or `-` gets
/// a `file_` prefix and long names are cut to 255 bytes keeping the
/// extension.
pub fn sanitize_filename(filename: &str) -> String {
    let mut sanitized: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.starts_with('.') || sanitized.starts_with('-') {
        sanitized.insert_str(0, "file_");
    }

    if sanitized.len() > MAX_FILENAME_LEN {
        sanitized = match sanitized.rsplit_once('.') {
            Some((stem, ext)) if !ext.is_empty() && ext.len() < 16 => {
                format!("{}.{ext}", &stem[..MAX_FILENAME_LEN - ext.len() - 1])
            }
            _ => sanitized[..MAX_FILENAME_LEN].to_string(),
        };
    }

    if sanitized.is_empty() {
        "unnamed_file".to_string()
    } else {
        sanitized
    }
}

/// Attachment bytes on disk under `<root>/<demand id>/<phase>/<file name>`.
#[derive(Debug, Clone)]
pub struct FsAttachmentStore {
    root: PathBuf,
}

impl FsAttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a stored key, refusing anything that could leave the root.
    fn resolve(&self, key: &str) -> Result<PathBuf, DemandError> {
        let relative = Path::new(key);
        if key.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(DemandError::validation(format!("invalid attachment key {key:?}")));
        }
        Ok(self.root.join(relative))
    }

    /// Remove every attachment of a demand.
    #[instrument(skip(self))]
    pub fn purge(&self, demand_id: &DemandId) -> Result<(), DemandError> {
        match fs::remove_dir_all(self.root.join(demand_id.as_str())) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RepositoryError::from(e).for_demand(Some(demand_id))),
        }
    }
}

impl AttachmentStore for FsAttachmentStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    fn put(
        &self,
        demand_id: &DemandId,
        phase: Phase,
        bytes: &[u8],
        filename: &str,
    ) -> Result<FileRef, DemandError> {
        let name = sanitize_filename(filename);
        let key = format!("{demand_id}/{phase}/{name}");
        let path = self.resolve(&key)?;
        let fail = |e: std::io::Error| RepositoryError::from(e).for_demand(Some(demand_id));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(fail)?;
        }
        fs::write(&path, bytes).map_err(fail)?;
        debug!(key = %key, "stored attachment");

        Ok(FileRef {
            name,
            path: key,
            size: bytes.len() as u64,
            uploaded_at: OffsetDateTime::now_utc(),
        })
    }

    fn get(&self, file: &FileRef) -> Result<Vec<u8>, DemandError> {
        let path = self.resolve(&file.path)?;
        fs::read(&path).map_err(|e| DemandError::storage(None, format!("{}: {e}", file.path)))
    }

    fn delete(&self, file: &FileRef) -> Result<(), DemandError> {
        let path = self.resolve(&file.path)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DemandError::storage(None, format!("{}: {e}", file.path))),
        }
    }
}
