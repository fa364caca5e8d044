//! # umbrella_review
//!
//! Research-data pipeline for an umbrella review: coded observations are
//! resolved against controlled vocabularies, cross-tabulated and drawn;
//! critical-appraisal scores are reshaped for a heatmap; bibliographic
//! records become co-occurrence and collaboration networks.
//!
//! ## Modules
//!
//! - [`table`] - Tables, the workbook and CSV I/O
//! - [`join`] - Lookup joiner against code vocabularies
//! - [`crosstab`] - Counts and percentages over one or two dimensions
//! - [`reference`] - Legend tables of codes, labels and descriptions
//! - [`appraisal`] - Wide-to-long reshape of appraisal scores
//! - [`bibliography`] - Bibliographic export readers
//! - [`network`] - Adjacency building and graph layout
//! - [`chart`] - SVG chart rendering
//! - [`config`] - Pipeline configuration
//! - [`pipeline`] - Per-element orchestration
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use umbrella_review::{config::PipelineConfig, pipeline, table::Workbook};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let workbook = Workbook::load_dir(Path::new("data"))?;
//!     let config = PipelineConfig::default();
//!     let out = pipeline::create_output_folder(Path::new("output"))?;
//!     let summary = pipeline::run(&workbook, None, &config, &out)?;
//!     println!("Rendered {} elements", summary.elements.len());
//!     Ok(())
//! }
//! ```

pub mod appraisal;
pub mod bibliography;
pub mod chart;
pub mod config;
pub mod crosstab;
pub mod error;
pub mod join;
pub mod network;
pub mod pipeline;
pub mod reference;
pub mod table;

pub use error::{ReviewError, Result};
