use super::tables::{ColumnFormat, ColumnKind, ColumnSpec, TableSpec};
use super::SessionDb;
use crate::error::{Result, SessionError};
use crate::types::{MessagePart, Role, SessionId, TaskStatus};
use chrono::DateTime;
use serde_json::{Map, Number, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn column_value(table: &TableSpec, row: &SqliteRow, column: &ColumnSpec) -> Result<Value> {
    let read_error = |e: sqlx::Error| {
        SessionError::DatabaseError(format!("Failed to read {}.{}: {e}", table.name, column.name))
    };
    let value = match column.kind {
        ColumnKind::Text => row
            .try_get::<Option<String>, _>(column.name)
            .map_err(read_error)?
            .map_or(Value::Null, Value::String),
        ColumnKind::Integer => row
            .try_get::<Option<i64>, _>(column.name)
            .map_err(read_error)?
            .map_or(Value::Null, Value::from),
        ColumnKind::Real => row
            .try_get::<Option<f64>, _>(column.name)
            .map_err(read_error)?
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number),
    };
    Ok(value)
}

/// Rejects text the typed readers could not load back.
fn check_format(table: &TableSpec, column: &ColumnSpec, text: &str) -> Result<()> {
    let qualified = format!("{}.{}", table.name, column.name);
    let outcome = match column.format {
        ColumnFormat::Plain => Ok(()),
        ColumnFormat::Timestamp => DateTime::parse_from_rfc3339(text)
            .map(|_parsed| ())
            .map_err(|e| e.to_string()),
        ColumnFormat::Json => serde_json::from_str::<Value>(text)
            .map(|_parsed| ())
            .map_err(|e| e.to_string()),
        ColumnFormat::MessageParts => serde_json::from_str::<Vec<MessagePart>>(text)
            .map(|_parsed| ())
            .map_err(|e| e.to_string()),
        ColumnFormat::Role => Role::try_from(text).map(|_parsed| ()),
        ColumnFormat::TaskStatus => TaskStatus::try_from(text).map(|_parsed| ()),
    };
    outcome.map_err(|reason| SessionError::Validation(format!("{qualified} is unreadable: {reason}")))
}

fn bind_column<'q>(
    query: SqliteQuery<'q>,
    table: &TableSpec,
    column: &ColumnSpec,
    value: Option<&Value>,
) -> Result<SqliteQuery<'q>> {
    let mismatch = || {
        SessionError::Validation(format!(
            "{}.{} expects {}",
            table.name,
            column.name,
            column.kind.as_sql()
        ))
    };

    match value {
        None | Some(Value::Null) if column.nullable => Ok(match column.kind {
            ColumnKind::Text => query.bind(None::<String>),
            ColumnKind::Integer => query.bind(None::<i64>),
            ColumnKind::Real => query.bind(None::<f64>),
        }),
        None | Some(Value::Null) => Err(SessionError::Validation(format!(
            "{}.{} is required",
            table.name, column.name
        ))),
        Some(value) => match column.kind {
            ColumnKind::Text => {
                let text = value.as_str().ok_or_else(mismatch)?;
                check_format(table, column, text)?;
                Ok(query.bind(text.to_string()))
            }
            ColumnKind::Integer => value.as_i64().map(|n| query.bind(n)).ok_or_else(mismatch),
            ColumnKind::Real => value.as_f64().map(|n| query.bind(n)).ok_or_else(mismatch),
        },
    }
}

impl SessionDb {
    /// Every row the session owns in `table`, keyed by column name.
    ///
    /// # Errors
    /// Returns an error if the query fails or a column cannot be decoded.
    pub async fn export_rows(
        &self,
        table: &TableSpec,
        session_id: &SessionId,
    ) -> Result<Vec<Map<String, Value>>> {
        let rows = sqlx::query(&table.select_sql())
            .bind(session_id.value())
            .fetch_all(self.pool())
            .await
            .map_err(|e| {
                SessionError::DatabaseError(format!("Failed to read table {}: {e}", table.name))
            })?;

        rows.iter()
            .map(|row| {
                table
                    .columns
                    .iter()
                    .map(|column| {
                        column_value(table, row, column)
                            .map(|value| (column.name.to_string(), value))
                    })
                    .collect::<Result<Map<String, Value>>>()
            })
            .collect()
    }

    /// Inserts or replaces one row through the table's column mapping. Keys the
    /// table does not declare are ignored.
    ///
    /// # Errors
    /// Returns a validation error for a missing, mistyped or undecodable
    /// column, or a database error if the statement fails.
    pub async fn upsert_row(&self, table: &TableSpec, row: &Map<String, Value>) -> Result<()> {
        let sql = table.upsert_sql();
        let query = table
            .columns
            .iter()
            .try_fold(sqlx::query(&sql), |query, column| {
                bind_column(query, table, column, row.get(column.name))
            })?;

        query.execute(self.pool()).await.map(|_result| ()).map_err(|e| {
            SessionError::DatabaseError(format!("Failed to upsert into {}: {e}", table.name))
        })
    }
}
