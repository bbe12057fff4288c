//! core::changed_files
//!
//! Parsing of the `--changed-files` input: either plain text, one
//! path per line, or a JSON array of strings. Format is detected by the
//! first non-whitespace character being `[`.

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChangedFilesError {
    #[error("failed to read changed-files input '{path}': {source}")]
    ReadError {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse changed-files input as a JSON array: {0}")]
    InvalidJson(String),
}

/// Parse changed-files contents already read into memory.
///
/// Blank lines are stripped in text mode; an all-blank input yields an
/// empty list without error, per the documented contract boundary behavior.
pub fn parse(contents: &str) -> Result<Vec<String>, ChangedFilesError> {
    let trimmed = contents.trim_start();
    if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).map_err(|e| ChangedFilesError::InvalidJson(e.to_string()))
    } else {
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Read and parse a changed-files input file.
pub fn read(path: &Path) -> Result<Vec<String>, ChangedFilesError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ChangedFilesError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse(&contents)
}
