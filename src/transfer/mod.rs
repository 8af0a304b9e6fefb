#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Snapshot and restore of everything a session owns.

pub mod export;
pub mod import;

pub use export::{
    export_session, ExportDocument, ExportMetadata, TableExport, EXPORT_FORMAT_VERSION,
};
pub use import::{import_session, ImportOptions, ImportReport, TableImport};
