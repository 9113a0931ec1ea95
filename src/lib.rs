//! uqkit - experiment design and statistical post-processing for
//! uncertainty-quantification studies
//!
//! A parametric model is run across a designed sample of its uncertain
//! inputs. This crate chooses the sample, lays out the runs, ingests the
//! results table the execution engine writes, and reduces it to moments,
//! confidence intervals, quantiles, PDF/CDF, recurrence intervals, Sobol
//! indices and interpolated response surfaces.

pub mod design;
pub mod error;
pub mod interp;
pub mod plan;
pub mod quadrature;
pub mod sensitivity;
pub mod summary;
pub mod table;
pub mod variables;

// Re-export main types
pub use design::{generate, generate_with_seed, DesignKind, DesignMethod, ExperimentDesign, SampleMatrix};
pub use error::UqError;
pub use interp::{interpolate, interpolate_table, GridSpec, InterpolationGrid, InterpolationMethod};
pub use plan::{plan, ExecutionPlan, RunBlock, RunSpec};
pub use sensitivity::{sobol_indices, SensitivityReport, SobolIndex};
pub use summary::{summarize, summarize_weighted, ConfidenceInterval, Histogram, HistogramOptions, SummaryOptions, SummaryStatistics};
pub use table::{ingest, render, ResponseTable, TableIngestor};
pub use variables::{DistributionKind, ResponseStatistic, ResponseVariable, UncertainVariable};
