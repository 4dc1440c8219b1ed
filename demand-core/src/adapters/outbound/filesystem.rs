//! One pretty-printed JSON document per demand plus a summary index, all in
//! a single directory.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use super::RepositoryError;
use crate::domain::models::{listing_order, DemandSummary};
use crate::domain::ports::outbound::{DemandRepository, SaveOutcome};
use crate::domain::{Demand, DemandError, DemandId};

pub const INDEX_FILE: &str = "demands_index.json";

#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    root: PathBuf,
}

impl JsonFileRepository {
    /// Use `root` as the data directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DemandError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| RepositoryError::from(e).for_demand(None))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, id: &DemandId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// A missing index is an empty one.
    fn read_index(&self) -> Result<Vec<DemandSummary>, RepositoryError> {
        match fs::read(self.index_path()) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_index(&self, mut entries: Vec<DemandSummary>) -> Result<(), RepositoryError> {
        entries.sort_by(listing_order);
        write_atomic(&self.index_path(), &serde_json::to_vec_pretty(&entries)?)
    }

    /// Summaries of every readable document in the directory.
    fn scan_documents(&self) -> Result<Vec<DemandSummary>, RepositoryError> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| DemandId::parse(s).ok())
            else {
                continue;
            };

            match fs::read(&path)
                .map_err(RepositoryError::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<Demand>(&bytes)?))
            {
                Ok(demand) if demand.id == id => entries.push(DemandSummary::from(&demand)),
                Ok(demand) => warn!(
                    file = %path.display(),
                    id = %demand.id,
                    "document id does not match file name, skipping"
                ),
                Err(e) => {
                    warn!(file = %path.display(), "unreadable demand document, skipping: {e}")
                }
            }
        }
        Ok(entries)
    }

    /// Regenerate the index from the documents on disk. Returns the number
    /// of indexed demands.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn rebuild_index(&self) -> Result<usize, DemandError> {
        let entries = self.scan_documents().map_err(|e| e.for_demand(None))?;
        let count = entries.len();
        self.write_index(entries).map_err(|e| e.for_demand(None))?;
        info!(count, "rebuilt demand index");
        Ok(count)
    }
}

/// Write to a sibling temp file, then rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RepositoryError> {
    let tmp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl DemandRepository for JsonFileRepository {
    #[instrument(skip(self, demand), fields(demand = %demand.id))]
    fn save(&self, demand: &Demand) -> Result<SaveOutcome, DemandError> {
        if !demand.has_meaningful_content() {
            debug!("refusing to store a demand without content");
            return Ok(SaveOutcome::SkippedEmpty);
        }
        let fail = |e: RepositoryError| e.for_demand(Some(&demand.id));

        let bytes = serde_json::to_vec_pretty(demand).map_err(|e| fail(e.into()))?;
        write_atomic(&self.document_path(&demand.id), &bytes).map_err(fail)?;

        let mut index = match self.read_index() {
            Ok(index) => index,
            Err(RepositoryError::Json(e)) => {
                warn!("demand index is corrupt, rebuilding from documents: {e}");
                self.scan_documents().map_err(fail)?
            }
            Err(e) => return Err(fail(e)),
        };
        index.retain(|entry| entry.id != demand.id);
        index.push(DemandSummary::from(demand));
        self.write_index(index).map_err(fail)?;

        debug!("saved demand document");
        Ok(SaveOutcome::Saved)
    }

    #[instrument(skip(self))]
    fn load(&self, id: &DemandId) -> Result<Demand, DemandError> {
        let bytes = match fs::read(self.document_path(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(DemandError::NotFound(id.clone()))
            }
            Err(e) => return Err(RepositoryError::from(e).for_demand(Some(id))),
        };
        serde_json::from_slice(&bytes).map_err(|e| RepositoryError::from(e).for_demand(Some(id)))
    }

    fn list_summaries(&self) -> Result<Vec<DemandSummary>, DemandError> {
        let mut entries = self.read_index().map_err(|e| e.for_demand(None))?;
        entries.sort_by(listing_order);
        Ok(entries)
    }

    #[instrument(skip(self))]
    fn delete(&self, id: &DemandId) -> Result<(), DemandError> {
        match fs::remove_file(self.document_path(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => debug!("no document to delete"),
            Err(e) => return Err(RepositoryError::from(e).for_demand(Some(id))),
        }

        let mut index = self.read_index().map_err(|e| e.for_demand(Some(id)))?;
        let before = index.len();
        index.retain(|entry| entry.id != *id);
        if index.len() != before {
            self.write_index(index).map_err(|e| e.for_demand(Some(id)))?;
        }
        Ok(())
    }
}
