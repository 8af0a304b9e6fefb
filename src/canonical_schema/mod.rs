/// Schema applied by `SessionDb::initialize_schema`.
pub const CANONICAL_SCHEMA_SQL: &str = include_str!("schema.sql");

/// Version stamped on every persisted state row.
pub const STATE_SCHEMA_VERSION: i64 = 1;
