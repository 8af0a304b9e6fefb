//! Column layout of the auxiliary tables that travel with an export.
//!
//! The column lists are the only mapping between export rows and SQL; nothing
//! is inferred from the row payload.

use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Real,
}

impl ColumnKind {
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
        }
    }
}

/// What a text column must decode as when the typed readers load it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnFormat {
    Plain,
    Timestamp,
    Json,
    MessageParts,
    Role,
    TaskStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub format: ColumnFormat,
}

const fn column(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        nullable: false,
        format: ColumnFormat::Plain,
    }
}

const fn nullable(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec {
        name,
        kind,
        nullable: true,
        format: ColumnFormat::Plain,
    }
}

const fn formatted(name: &'static str, format: ColumnFormat) -> ColumnSpec {
    ColumnSpec {
        name,
        kind: ColumnKind::Text,
        nullable: false,
        format,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub primary_key: &'static str,
    pub order_by: &'static str,
    pub description: &'static str,
    pub columns: &'static [ColumnSpec],
}

pub const MESSAGES_TABLE: TableSpec = TableSpec {
    name: "messages",
    primary_key: "id",
    order_by: "position",
    description: "Chat history, one row per message in display order",
    columns: &[
        column("id", ColumnKind::Text),
        column("session_id", ColumnKind::Text),
        column("position", ColumnKind::Integer),
        formatted("role", ColumnFormat::Role),
        formatted("content_json", ColumnFormat::MessageParts),
        formatted("created_at", ColumnFormat::Timestamp),
    ],
};

pub const SCHEDULED_TASKS_TABLE: TableSpec = TableSpec {
    name: "scheduled_tasks",
    primary_key: "id",
    order_by: "run_at",
    description: "Follow-ups recorded by the assistant",
    columns: &[
        column("id", ColumnKind::Text),
        column("session_id", ColumnKind::Text),
        column("description", ColumnKind::Text),
        formatted("payload_json", ColumnFormat::Json),
        formatted("run_at", ColumnFormat::Timestamp),
        formatted("status", ColumnFormat::TaskStatus),
        formatted("created_at", ColumnFormat::Timestamp),
    ],
};

pub const CREDENTIAL_CACHE_TABLE: TableSpec = TableSpec {
    name: "credential_cache",
    primary_key: "session_id",
    order_by: "session_id",
    description: "Last verified identity profile; holds a token fingerprint, never the token",
    columns: &[
        column("session_id", ColumnKind::Text),
        column("user_id", ColumnKind::Text),
        column("email", ColumnKind::Text),
        column("credits", ColumnKind::Real),
        nullable("payment_method", ColumnKind::Text),
        column("token_fingerprint", ColumnKind::Text),
        formatted("verified_at", ColumnFormat::Timestamp),
    ],
};

pub const AUXILIARY_TABLES: [&TableSpec; 3] = [
    &MESSAGES_TABLE,
    &SCHEDULED_TASKS_TABLE,
    &CREDENTIAL_CACHE_TABLE,
];

impl TableSpec {
    #[must_use]
    pub fn find(name: &str) -> Option<&'static Self> {
        AUXILIARY_TABLES.into_iter().find(|table| table.name == name)
    }

    fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|column| column.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    #[must_use]
    pub fn select_sql(&self) -> String {
        format!(
            "SELECT {} FROM {} WHERE session_id = ?1 ORDER BY {} ASC",
            self.column_list(),
            self.name,
            self.order_by
        )
    }

    #[must_use]
    pub fn upsert_sql(&self) -> String {
        let placeholders = (1..=self.columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let updates = self
            .columns
            .iter()
            .filter(|column| column.name != self.primary_key)
            .map(|column| format!("{0} = excluded.{0}", column.name))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders}) ON CONFLICT({}) DO UPDATE SET {updates}",
            self.name,
            self.column_list(),
            self.primary_key
        )
    }

    /// Column description embedded in an export next to the rows.
    #[must_use]
    pub fn schema_json(&self) -> Value {
        json!({
            "primaryKey": self.primary_key,
            "columns": self
                .columns
                .iter()
                .map(|column| json!({
                    "name": column.name,
                    "type": column.kind.as_sql(),
                    "nullable": column.nullable,
                }))
                .collect::<Vec<_>>(),
        })
    }
}
