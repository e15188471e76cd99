use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid IRI: {0}")]
    InvalidIri(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("OLS request failed: {0}")]
    OlsHttp(String),

    #[error("OLS returned status {status} for {url}: {message}")]
    OlsStatus {
        status: u16,
        url: String,
        message: String,
    },

    #[error("failed to decode page body from {url}: {message}")]
    PageDecode { url: String, message: String },

    #[error("term record without iri: {0}")]
    MalformedTerm(String),

    #[error("schema contract is frozen for table {table}: unknown column {column}")]
    SchemaFrozen { table: String, column: String },

    #[error("load into table {table} failed: {message}")]
    LoadFailed { table: String, message: String },

    #[error("table not found in warehouse: {0}")]
    TableNotFound(String),

    #[error("corrupt warehouse state: {0}")]
    Warehouse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
