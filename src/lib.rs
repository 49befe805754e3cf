//! SegmentForge: company lifecycle segmentation from financial snapshots and transaction logs
//!
//! This library turns a company snapshot table and a pairwise transaction log
//! into one enriched table: payment/receipt aggregates, a K-Means lifecycle
//! stage labelled by revenue rank, network centrality, partner concentration
//! and a next-month receipt projection.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod insights;
pub mod merge;
pub mod model;
pub mod network;
pub mod output;
pub mod pipeline;
pub mod projection;
pub mod scaler;

// Re-export public items for easier access
pub use cli::Args;
pub use config::{ClusterParams, PipelineConfig};
pub use data::{load_entities, load_transactions, EntityRecord, Transaction};
pub use error::InputError;
pub use merge::EnrichedEntity;
pub use model::{fit_lifecycle, LifecycleModel, LifecycleStage};
pub use pipeline::{analyze, run_pipeline, Analysis};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
