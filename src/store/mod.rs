//! Relational store: row models and data access.

pub mod dao;
pub mod models;

pub use dao::{DocumentDao, PgDocumentDao, StoreError};
pub use models::{RunLedgerRow, StoredRecord, UpsertAction, UpsertOutcome};
