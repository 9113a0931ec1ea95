pub mod config;
pub mod executor;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod presets;

use thiserror::Error;
use uqkit::UqError;

pub use config::StudyConfig;
pub use executor::{AnalyticDriver, AnalyticModel, FnDriver, ModelExecutor, TableFile};
pub use output::create_timestamped_output_dir;
pub use pipeline::{run_study, ResponseReport, StudyReport};

#[derive(Debug, Error)]
pub enum StudyError {
    #[error(transparent)]
    Uq(#[from] UqError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("model execution failed: {0}")]
    Executor(String),
    #[error("logging setup failed: {0}")]
    Logging(String),
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
}
