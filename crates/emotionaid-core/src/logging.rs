//! Structured logging to JSONL files.
//!
//! ```text
//! <data_dir>/logs/
//! ├── 2026-10-19_cli.jsonl
//! └── 2026-10-20_cli.jsonl
//! ```
//!
//! Each line is a [`LogRecord`]. Query with jq, e.g.
//! `jq 'select(.level == "warn")' logs/*.jsonl`.

use std::path::{Path, PathBuf};

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::error::{CompanionError, CompanionResult};

mod file;
mod layer;

pub use file::{read_records, LogFile, LogRecord};
pub use layer::JsonlLayer;

/// Name of the log directory inside the data directory
pub const LOGS_DIR: &str = "logs";

pub fn logs_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(LOGS_DIR)
}

/// Install the global subscriber: `filter` applied to a compact stderr layer
/// and, when `logs_dir` is given, to a JSONL file layer as well.
///
/// Returns the path of the log file, if any.
pub fn install(
    filter: EnvFilter,
    logs_dir: Option<&Path>,
    session: &str,
) -> CompanionResult<Option<PathBuf>> {
    let file_layer = logs_dir
        .map(|dir| LogFile::open(dir, session).map(JsonlLayer::new))
        .transpose()?;
    let path = file_layer.as_ref().map(|l| l.file().path().to_path_buf());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| CompanionError::Config(format!("logging already initialized: {}", e)))?;

    Ok(path)
}
