//! Append-only JSONL log file.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One line of a log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// RFC 3339 UTC timestamp with milliseconds
    pub ts: String,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
    /// Enclosing spans, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<String>,
}

impl LogRecord {
    pub fn new(level: &str, target: &str, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            ts: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            level: level.to_string(),
            target: target.to_string(),
            message: message.into(),
            fields: Map::new(),
            spans: Vec::new(),
        }
    }
}

/// Log file for one session: `<logs_dir>/<YYYY-MM-DD>_<session>.jsonl`.
pub struct LogFile {
    path: PathBuf,
    out: Mutex<BufWriter<File>>,
}

impl LogFile {
    pub fn open(logs_dir: &Path, session: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let name = format!("{}_{}.jsonl", Utc::now().format("%Y-%m-%d"), session);
        let path = logs_dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            out: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record` as one line and flush.
    pub fn append(&self, record: &LogRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)?;
        let mut out = self.out.lock();
        writeln!(out, "{}", line)?;
        out.flush()
    }
}

impl Drop for LogFile {
    fn drop(&mut self) {
        let _ = self.out.lock().flush();
    }
}

/// Read every record of every `.jsonl` file in `logs_dir`, oldest first.
///
/// Lines that do not parse are skipped.
pub fn read_records(logs_dir: &Path) -> std::io::Result<Vec<LogRecord>> {
    let entries = match std::fs::read_dir(logs_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut records = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        for line in BufReader::new(File::open(&path)?).lines() {
            if let Ok(record) = serde_json::from_str::<LogRecord>(&line?) {
                records.push(record);
            }
        }
    }
    records.sort_by(|a, b| a.ts.cmp(&b.ts));
    Ok(records)
}
