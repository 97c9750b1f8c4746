//! Versioned local document database for ecriture.
//!
//! This crate provides:
//! - The `ecritures` document collection with async CRUD via SQLite
//! - Declarative schema generations with ordered, idempotent migration
//! - A distinguishable error taxonomy for storage failures

pub mod connection;
pub mod documents;
pub mod error;
pub mod migrations;
pub mod schema;

pub use connection::DocumentStore;
pub use documents::{Ecriture, EcritureInput, EcriturePatch};
pub use error::StoreError;
pub use schema::{SCHEMA_HISTORY, SchemaGeneration};
