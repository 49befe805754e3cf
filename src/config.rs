//! Pipeline configuration and the fixed conventions of the input files

use std::path::PathBuf;

/// Column names of the company snapshot table.
pub mod entity_columns {
    pub const ID: &str = "ID";
    pub const REFERENCE_DATE: &str = "DT_REFE";
    pub const OPENING_DATE: &str = "DT_ABRT";
    pub const REVENUE: &str = "VL_FATU";
    pub const BALANCE: &str = "VL_SLDO";
    pub const INDUSTRY_CODE: &str = "DS_CNAE";
}

/// Column names of the transaction log.
pub mod transaction_columns {
    pub const PAYER: &str = "ID_PGTO";
    pub const PAYEE: &str = "ID_RCBE";
    pub const AMOUNT: &str = "VL";
    pub const DATE: &str = "DT_REFE";
}

/// Date layouts accepted in either input table, tried in order.
pub const DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%d",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y",
];

/// K-Means settings for the lifecycle classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterParams {
    /// Seed for centroid initialisation
    pub seed: u64,
    /// Number of independent initialisations; the lowest inertia wins
    pub n_runs: usize,
    /// Iteration cap per run
    pub max_iters: u64,
    /// Convergence tolerance on centroid movement
    pub tolerance: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            seed: 42,
            n_runs: 10,
            max_iters: 300,
            tolerance: 1e-4,
        }
    }
}

/// Everything a pipeline run needs to know
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub entities_path: PathBuf,
    pub transactions_path: PathBuf,
    pub entity_output: PathBuf,
    pub transaction_output: PathBuf,
    pub input_separator: u8,
    pub output_separator: u8,
    pub clustering: ClusterParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            entities_path: PathBuf::from("entities.csv"),
            transactions_path: PathBuf::from("transactions.csv"),
            entity_output: PathBuf::from("entities_enriched.csv"),
            transaction_output: PathBuf::from("transactions_enriched.csv"),
            input_separator: b';',
            output_separator: b',',
            clustering: ClusterParams::default(),
        }
    }
}

/// Convert a user-supplied separator into the byte the CSV reader expects.
pub fn separator_byte(separator: char) -> Result<u8, crate::error::InputError> {
    if separator.is_ascii() {
        Ok(separator as u8)
    } else {
        Err(crate::error::InputError::InvalidSeparator(separator))
    }
}
