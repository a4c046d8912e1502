use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop an export run.
///
/// Per-message problems are logged and skipped by the exporter; only setup,
/// listing and output errors surface through this type.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Missing {0}. Please provide it in the project directory.")]
    MissingCredentials(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("{context}: {source}")]
    Api {
        context: String,
        #[source]
        source: google_gmail1::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ExportError {
    pub fn api(context: impl Into<String>, source: google_gmail1::Error) -> Self {
        Self::Api {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
