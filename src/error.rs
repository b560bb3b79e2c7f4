//! Error types for the nutrilabel library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`NutrilabelError`] is **fatal**: the extraction cannot proceed at all
//!   (payload is not JSON, file unreadable, bad configuration). Returned as
//!   `Err(NutrilabelError)` from the top-level `extract*` functions.
//!
//! * [`FileError`] is **non-fatal**: one payload in a batch failed but all
//!   other files are fine. Stored inside [`crate::output::FileResult`] so a
//!   batch run reports partial success instead of aborting.
//!
//! Nothing inside the pipeline itself returns an error. Tokens without
//! geometry are dropped, implausible values are suppressed, and an empty
//! nutrient map is a valid "nothing detected" result.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the nutrilabel library.
#[derive(Debug, Error)]
pub enum NutrilabelError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("OCR payload not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The file exists but could not be read.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The payload is not valid JSON, or matches neither supported shape.
    #[error("Malformed OCR payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// The payload parsed but violates a structural rule of its shape.
    #[error("Invalid OCR payload: {0}")]
    InvalidPayload(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single file in a batch.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// The file could not be read.
    #[error("{path}: read failed: {detail}")]
    Unreadable { path: String, detail: String },

    /// The file was read but its payload was rejected.
    #[error("{path}: payload rejected: {detail}")]
    Rejected { path: String, detail: String },
}

impl FileError {
    /// Classify a fatal single-file error into its batch counterpart.
    pub fn from_fatal(path: &str, err: &NutrilabelError) -> Self {
        match err {
            NutrilabelError::FileNotFound { .. } | NutrilabelError::ReadFailed { .. } => {
                FileError::Unreadable {
                    path: path.to_string(),
                    detail: err.to_string(),
                }
            }
            _ => FileError::Rejected {
                path: path.to_string(),
                detail: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_payload_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let e = NutrilabelError::from(json_err);
        assert!(e.to_string().starts_with("Malformed OCR payload"), "got: {e}");
    }

    #[test]
    fn file_not_found_display() {
        let e = NutrilabelError::FileNotFound {
            path: PathBuf::from("label.json"),
        };
        assert!(e.to_string().contains("label.json"));
    }

    #[test]
    fn fatal_read_errors_become_unreadable() {
        let e = NutrilabelError::FileNotFound {
            path: PathBuf::from("a.json"),
        };
        assert!(matches!(
            FileError::from_fatal("a.json", &e),
            FileError::Unreadable { .. }
        ));
    }

    #[test]
    fn fatal_payload_errors_become_rejected() {
        let e = NutrilabelError::InvalidPayload("no pages".into());
        let fe = FileError::from_fatal("b.json", &e);
        assert!(matches!(fe, FileError::Rejected { .. }));
        assert!(fe.to_string().contains("no pages"));
    }
}
