use super::export::{ExportDocument, EXPORT_FORMAT_VERSION};
use crate::db::tables::{MESSAGES_TABLE, SCHEDULED_TASKS_TABLE};
use crate::db::{SessionDb, TableSpec};
use crate::error::{Result, SessionError};
use crate::orchestrator_service::StateSink;
use crate::types::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportOptions {
    /// Keep the `session_id` stored in each row instead of rewriting it.
    pub preserve_session_id: bool,
    pub include_messages: bool,
    pub include_scheduled_tasks: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            preserve_session_id: false,
            include_messages: true,
            include_scheduled_tasks: true,
        }
    }
}

impl ImportOptions {
    fn includes(&self, table: &TableSpec) -> bool {
        if table.name == MESSAGES_TABLE.name {
            self.include_messages
        } else if table.name == SCHEDULED_TASKS_TABLE.name {
            self.include_scheduled_tasks
        } else {
            true
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableImport {
    pub records: u64,
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TableImport {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            records: 0,
            skipped: true,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub success: bool,
    /// False when the document carried no state and the current one was kept.
    pub state_restored: bool,
    pub tables_imported: u64,
    pub records_imported: u64,
    pub warnings: Vec<String>,
    pub per_table: BTreeMap<String, TableImport>,
}

impl ImportReport {
    fn skip(&mut self, table: &str, reason: &str, warn_user: bool) {
        if warn_user {
            self.warnings.push(format!("Skipped table `{table}`: {reason}"));
        }
        self.per_table
            .insert(table.to_string(), TableImport::skipped(reason));
    }
}

fn parse_document(document: Value) -> Result<ExportDocument> {
    let Value::Object(map) = document else {
        return Err(SessionError::Validation(
            "import document must be a JSON object".to_string(),
        ));
    };
    for section in ["metadata", "tables"] {
        if !map.get(section).is_some_and(Value::is_object) {
            return Err(SessionError::Validation(format!(
                "import document is missing `{section}`"
            )));
        }
    }
    let document: ExportDocument = serde_json::from_value(Value::Object(map))
        .map_err(|e| SessionError::Validation(format!("malformed export document: {e}")))?;
    if document.metadata.format_version > EXPORT_FORMAT_VERSION {
        return Err(SessionError::Validation(format!(
            "export format version {} is newer than supported version {EXPORT_FORMAT_VERSION}",
            document.metadata.format_version
        )));
    }
    Ok(document)
}

/// Restores an export into `session_id`.
///
/// The document is validated before anything is written. State is only
/// committed when the document carries one. A usable `messages` table
/// replaces the session's history instead of merging with it. Row failures and
/// unusable tables become warnings; the import itself still completes.
///
/// # Errors
/// Returns a validation error for a malformed document, or the failure of
/// either state commit.
pub async fn import_session<S>(
    db: &SessionDb,
    sink: &S,
    session_id: &SessionId,
    document: Value,
    options: ImportOptions,
    now: DateTime<Utc>,
) -> Result<ImportReport>
where
    S: StateSink + Sync,
{
    let document = parse_document(document)?;
    let state = document
        .metadata
        .state
        .map(|state| state.normalize(session_id, now));
    if let Some(state) = &state {
        sink.commit_state(state).await?;
    }

    let mut report = ImportReport {
        success: true,
        state_restored: state.is_some(),
        ..ImportReport::default()
    };
    for (name, table) in document.tables {
        let Some(spec) = TableSpec::find(&name) else {
            warn!(table = %name, "Unknown table in import");
            report.skip(&name, "unknown table", true);
            continue;
        };
        if !options.includes(spec) {
            report.skip(&name, "excluded by import options", false);
            continue;
        }
        if let Some(error) = table.error {
            report.skip(&name, &format!("exported with error: {error}"), true);
            continue;
        }
        if table.rows.is_empty() {
            report.skip(&name, "no rows", true);
            continue;
        }
        if spec.name == MESSAGES_TABLE.name {
            // Imported history supersedes the existing one.
            match db.clear_messages(session_id).await {
                Ok(cleared) => info!(cleared, "Existing history replaced by import"),
                Err(error) => {
                    warn!(table = %name, %error, "Could not clear existing history");
                    report.skip(&name, &format!("existing history not cleared: {error}"), true);
                    continue;
                }
            }
        }

        let mut records = 0_u64;
        for (index, mut row) in table.rows.into_iter().enumerate() {
            if !options.preserve_session_id {
                row.insert(
                    "session_id".to_string(),
                    Value::String(session_id.value().to_string()),
                );
            }
            match db.upsert_row(spec, &row).await {
                Ok(()) => records += 1,
                Err(error) => {
                    warn!(table = %name, row = index, %error, "Row import failed");
                    report
                        .warnings
                        .push(format!("Row {index} of `{name}` was not imported: {error}"));
                }
            }
        }
        report.tables_imported += 1;
        report.records_imported += records;
        report.per_table.insert(
            name,
            TableImport {
                records,
                skipped: false,
                reason: None,
            },
        );
    }

    if let Some(state) = &state {
        sink.commit_state(state).await?;
    }
    info!(
        tables = report.tables_imported,
        records = report.records_imported,
        warnings = report.warnings.len(),
        "Session imported"
    );
    Ok(report)
}
