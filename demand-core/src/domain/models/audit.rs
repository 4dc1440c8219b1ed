use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::compat;
use super::{DemandId, Phase};

/// One recorded user action. Never edited once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(with = "compat::timestamp")]
    pub timestamp: OffsetDateTime,
    pub user: String,
    pub action: String,
    /// Id of the demand the action touched.
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
}

/// Append-only audit trail of a demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog(Vec<AuditEntry>);

impl AuditLog {
    pub fn record(
        &mut self,
        trace_id: &DemandId,
        user: &str,
        action: impl Into<String>,
        phase: Option<Phase>,
        field: Option<&str>,
        at: OffsetDateTime,
    ) -> &AuditEntry {
        self.0.push(AuditEntry {
            timestamp: at,
            user: user.to_string(),
            action: action.into(),
            trace_id: trace_id.to_string(),
            tab_name: phase.map(|p| p.to_string()),
            field_name: field.map(str::to_string),
        });
        &self.0[self.0.len() - 1]
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.0
    }

    pub fn last(&self) -> Option<&AuditEntry> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
