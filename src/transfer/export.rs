use crate::db::{SessionDb, AUXILIARY_TABLES};
use crate::types::{SessionId, SessionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const EXPORT_FORMAT_VERSION: u32 = 1;

const fn default_format_version() -> u32 {
    EXPORT_FORMAT_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    #[serde(default)]
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    /// Absent in partial documents; the target keeps its current state then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SessionState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableExport {
    #[serde(default)]
    pub schema: Value,
    #[serde(default)]
    pub rows: Vec<Map<String, Value>>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub metadata: ExportMetadata,
    pub tables: BTreeMap<String, TableExport>,
}

impl ExportDocument {
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.tables.values().map(|table| table.rows.len()).sum()
    }
}

/// Collects the state plus every auxiliary table. A table that cannot be read
/// carries its error instead of rows; the export itself always completes.
pub async fn export_session(
    db: &SessionDb,
    state: &SessionState,
    now: DateTime<Utc>,
) -> ExportDocument {
    let mut tables = BTreeMap::new();
    for table in AUXILIARY_TABLES {
        let mut entry = TableExport {
            schema: table.schema_json(),
            rows: Vec::new(),
            description: table.description.to_string(),
            error: None,
        };
        match db.export_rows(table, &state.session_id).await {
            Ok(rows) => entry.rows = rows,
            Err(error) => {
                warn!(table = table.name, %error, "Table export failed");
                entry.error = Some(error.to_string());
            }
        }
        tables.insert(table.name.to_string(), entry);
    }

    let document = ExportDocument {
        metadata: ExportMetadata {
            exported_at: now,
            session_id: Some(state.session_id.clone()),
            format_version: EXPORT_FORMAT_VERSION,
            state: Some(state.clone()),
        },
        tables,
    };
    info!(
        tables = document.tables.len(),
        records = document.record_count(),
        "Session exported"
    );
    document
}
