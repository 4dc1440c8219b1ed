use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use time::OffsetDateTime;

use super::compat;
use super::{Demand, DemandId, DemandStatus};

/// Compact index entry for listing demands without loading documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandSummary {
    #[serde(alias = "demand_id")]
    pub id: DemandId,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: DemandStatus,
    #[serde(default, alias = "progress_percentage", with = "compat::percent")]
    pub progress: u8,
    #[serde(with = "compat::timestamp")]
    pub last_modified: OffsetDateTime,
}

impl From<&Demand> for DemandSummary {
    fn from(demand: &Demand) -> Self {
        Self {
            id: demand.id.clone(),
            number: demand.number.clone(),
            name: demand.name.clone(),
            title: demand.title(),
            status: demand.status,
            progress: demand.progress,
            last_modified: demand.last_modified,
        }
    }
}

impl DemandSummary {
    /// Case-insensitive substring match over id, number, name and title.
    ///
    /// `needle` must already be lowercased.
    pub fn matches(&self, needle: &str) -> bool {
        std::iter::once(Some(self.id.as_str()))
            .chain([
                self.number.as_deref(),
                self.name.as_deref(),
                self.title.as_deref(),
            ])
            .flatten()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Listing order: most recently modified first, ties broken by id.
pub fn listing_order(a: &DemandSummary, b: &DemandSummary) -> Ordering {
    b.last_modified
        .cmp(&a.last_modified)
        .then_with(|| a.id.cmp(&b.id))
}

/// Portfolio-level numbers computed from the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandStatistics {
    pub total_demands: usize,
    pub by_status: BTreeMap<DemandStatus, usize>,
    pub average_progress: f64,
    pub most_recent: Option<DemandSummary>,
}

impl DemandStatistics {
    /// `summaries` must already be in [`listing_order`].
    pub fn from_summaries(summaries: &[DemandSummary]) -> Self {
        let mut by_status = BTreeMap::new();
        for summary in summaries {
            *by_status.entry(summary.status).or_insert(0) += 1;
        }
        let average_progress = if summaries.is_empty() {
            0.0
        } else {
            summaries.iter().map(|s| f64::from(s.progress)).sum::<f64>() / summaries.len() as f64
        };
        Self {
            total_demands: summaries.len(),
            by_status,
            average_progress,
            most_recent: summaries.first().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn summary(id: &str, name: Option<&str>, at: OffsetDateTime) -> DemandSummary {
        DemandSummary {
            id: DemandId::parse(id).unwrap(),
            number: Some("10001".into()),
            name: name.map(str::to_string),
            title: None,
            status: DemandStatus::Draft,
            progress: 0,
            last_modified: at,
        }
    }

    #[test]
    fn matches_any_searchable_field() {
        let s = summary(
            "LOG-2025-0000AAAA",
            Some("Invoice Automation"),
            datetime!(2025-01-01 0:00 UTC),
        );
        assert!(s.matches("invoice"));
        assert!(s.matches("log-2025"));
        assert!(s.matches("1000"));
        assert!(!s.matches("payroll"));
    }

    #[test]
    fn listing_order_is_newest_first_then_id() {
        let mut items = vec![
            summary("LOG-2025-0000000B", None, datetime!(2025-01-01 0:00 UTC)),
            summary("LOG-2025-0000000A", None, datetime!(2025-01-01 0:00 UTC)),
            summary("LOG-2025-0000000C", None, datetime!(2025-02-01 0:00 UTC)),
        ];
        items.sort_by(listing_order);
        let ids: Vec<&str> = items.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["LOG-2025-0000000C", "LOG-2025-0000000A", "LOG-2025-0000000B"]);
    }

    #[test]
    fn statistics_average_progress() {
        let mut a = summary("LOG-2025-0000000A", None, datetime!(2025-02-01 0:00 UTC));
        a.progress = 100;
        let mut b = summary("LOG-2025-0000000B", None, datetime!(2025-01-01 0:00 UTC));
        b.status = DemandStatus::Approved;
        b.progress = 50;
        let stats = DemandStatistics::from_summaries(&[a, b]);
        assert_eq!(stats.total_demands, 2);
        assert_eq!(stats.average_progress, 75.0);
        assert_eq!(stats.by_status[&DemandStatus::Approved], 1);
        assert_eq!(stats.most_recent.unwrap().id.as_str(), "LOG-2025-0000000A");
    }
}
