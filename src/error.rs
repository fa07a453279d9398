use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ChartError {
    #[error("invalid source id: {0}")]
    InvalidSourceId(String),

    #[error("invalid {kind} template {template:?}: {reason}")]
    InvalidTemplate {
        kind: &'static str,
        template: String,
        reason: String,
    },

    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),

    #[error("invalid chart source {id}: {reason}")]
    InvalidSource { id: String, reason: String },

    #[error("unknown chart source: {0}")]
    #[diagnostic(help("run `wxchart list` to see the configured sources"))]
    UnknownSource(String),

    #[error("chart source {id} requires credentials for {realm}")]
    #[diagnostic(help("add a `user:password:{realm}` line to the credentials file"))]
    MissingCredentials { id: String, realm: String },

    #[error("duplicate chart source id: {0}")]
    DuplicateSource(String),

    #[error("unsupported catalog schema version {0}")]
    UnsupportedSchema(u32),

    #[error("failed to read catalog file at {0}")]
    CatalogRead(PathBuf),

    #[error("failed to parse catalog: {0}")]
    CatalogParse(String),

    #[error("failed to read credentials file at {0}")]
    CredentialsRead(PathBuf),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("server returned status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("gave up after {attempts} consecutive missing slots")]
    RetriesExhausted { attempts: u32 },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("download queue is closed")]
    QueueClosed,
}
