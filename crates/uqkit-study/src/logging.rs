use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::StudyError;

/// Log level for a `-v` count: info, then debug, then trace.
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Installs the global subscriber: human-readable lines on stderr and,
/// when `log_file` is given, an ANSI-free copy appended to that file.
///
/// `RUST_LOG` overrides the level picked from `verbosity`.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>) -> Result<(), StudyError> {
    let level = level_for(verbosity);
    let default_filter = format!("uqkit_study={level},uqkit={level}");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|err| StudyError::Logging(err.to_string()))?;

    if let Some(path) = log_file {
        tracing::debug!(log_path = %path.display(), "file logging enabled");
    }
    Ok(())
}
