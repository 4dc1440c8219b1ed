//! Demand repository port (outbound).
//!
//! Defines the interface for persisting demand documents and the summary
//! index used for listings.

use crate::domain::{
    models::{DemandId, DemandStatistics, DemandSummary},
    Demand, DemandError,
};

/// Result of a save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Document and index entry were written.
    Saved,
    /// The demand had no meaningful content; nothing was written.
    SkippedEmpty,
}

/// Outbound port for demand persistence.
///
/// Implementations store each demand as one document keyed by its id and
/// keep a separate summary index so listings never load full documents.
pub trait DemandRepository {
    /// Write the document and upsert its index entry.
    ///
    /// Must be idempotent and must not write demands without meaningful
    /// content (see [`Demand::has_meaningful_content`]).
    fn save(&self, demand: &Demand) -> Result<SaveOutcome, DemandError>;

    /// Load a full document. Unknown ids are `NotFound`, never a default demand.
    fn load(&self, id: &DemandId) -> Result<Demand, DemandError>;

    /// Index entries, most recently modified first, ties broken by id.
    fn list_summaries(&self) -> Result<Vec<DemandSummary>, DemandError>;

    /// Remove document and index entry. Unknown ids are a no-op.
    fn delete(&self, id: &DemandId) -> Result<(), DemandError>;

    /// Case-insensitive substring search over id, number, name and title.
    fn search(&self, query: &str) -> Result<Vec<DemandSummary>, DemandError> {
        let needle = query.trim().to_lowercase();
        let summaries = self.list_summaries()?;
        if needle.is_empty() {
            return Ok(summaries);
        }
        Ok(summaries
            .into_iter()
            .filter(|summary| summary.matches(&needle))
            .collect())
    }

    fn statistics(&self) -> Result<DemandStatistics, DemandError> {
        Ok(DemandStatistics::from_summaries(&self.list_summaries()?))
    }
}

impl<R: DemandRepository + ?Sized> DemandRepository for &R {
    fn save(&self, demand: &Demand) -> Result<SaveOutcome, DemandError> {
        (**self).save(demand)
    }

    fn load(&self, id: &DemandId) -> Result<Demand, DemandError> {
        (**self).load(id)
    }

    fn list_summaries(&self) -> Result<Vec<DemandSummary>, DemandError> {
        (**self).list_summaries()
    }

    fn delete(&self, id: &DemandId) -> Result<(), DemandError> {
        (**self).delete(id)
    }
}
