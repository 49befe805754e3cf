//! Fatal input errors

use std::path::PathBuf;
use thiserror::Error;

/// Input problems that abort the whole run.
///
/// Row-level problems (an unparsable date, a garbled number) are never
/// reported through this type; they degrade the affected field instead.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("input file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("column '{column}' missing from {}", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("no rows found in {}", path.display())]
    EmptyTable { path: PathBuf },

    #[error("separator must be a single ASCII character, got '{0}'")]
    InvalidSeparator(char),
}
