//! Historical revisions of audited entities.
//!
//! Auditing itself happens in the datastore; this module only defines the
//! query side so callers can read back what was recorded.

use crate::errors::AuditError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity type under which completed build results are audited.
pub const BUILD_RECORD: &str = "BuildRecord";

/// One recorded state of an audited entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    /// Monotonic revision number.
    pub id: u64,
    /// The audited entity type.
    pub entity_type: String,
    /// The entity as it was at this revision.
    pub entity_snapshot: serde_json::Value,
    /// When the revision was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Read access to the audit history.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// All revisions of an entity type, ordered by revision id ascending.
    async fn revisions(&self, entity_type: &str) -> Result<Vec<Revision>, AuditError>;
}
