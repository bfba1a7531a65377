//! Harvest Core - IBGE harvested-area ETL and query layer
//!
//! Pipeline:
//! - Read a spreadsheet/CSV export (one row per municipality, one column per crop)
//! - Normalize municipality identifiers and sanitize area cells
//! - Reshape records into crop-indexed and municipality-indexed views
//! - Persist records (PostgreSQL and/or static JSON) with an append-only run log
//! - Answer read-only queries for the API over a swappable in-memory snapshot

pub mod error;
pub mod geo;
pub mod index;
pub mod ingest;
pub mod locality;
pub mod run;
pub mod sanitize;
pub mod service;
pub mod source;
pub mod sources;
pub mod states;
pub mod store;

pub use error::{IngestError, QueryError, StoreError};
pub use index::{build_crop_index, build_municipality_index, CropData, CropIndex, MunicipalityEntry};
pub use ingest::{ingest, IngestOutcome, IngestedRecord};
pub use service::CropService;
pub use source::{read_table, Cell, Table};

/// Dataset vintage used when the caller does not supply one.
pub const DEFAULT_YEAR: i32 = 2023;
