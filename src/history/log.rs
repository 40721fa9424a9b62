//! Append-only JSONL logs of runtime failures and full passes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::HistoryError;

/// File name of the runtime-failure log inside the log directory.
pub const FAILURE_LOG_FILE: &str = "fail_cases.jsonl";

/// File name of the success log inside the log directory.
pub const SUCCESS_LOG_FILE: &str = "success_cases.jsonl";

/// A candidate that reached the sandbox and failed there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub timestamp: DateTime<Utc>,
    /// Prompt the candidate was generated from, empty if unknown.
    #[serde(default)]
    pub prompt: String,
    pub candidate: String,
    /// Runtime diagnostic, trimmed.
    #[serde(default)]
    pub stderr: String,
    pub test_case: String,
}

/// A candidate that passed every evaluation level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub prompt: String,
    /// The code this candidate was repaired from, when known.
    pub original: Option<String>,
    pub corrected: String,
    pub test_case: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Writer for the durable case logs.
///
/// Appends are serialised so concurrent evaluations never interleave lines.
#[derive(Debug)]
pub struct CaseLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl CaseLog {
    /// Creates a case log rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn failure_path(&self) -> PathBuf {
        self.dir.join(FAILURE_LOG_FILE)
    }

    pub fn success_path(&self) -> PathBuf {
        self.dir.join(SUCCESS_LOG_FILE)
    }

    /// Appends a runtime-failure record.
    pub async fn log_failure(
        &self,
        prompt: &str,
        candidate: &str,
        stderr: &str,
        test_case: &str,
    ) -> Result<(), HistoryError> {
        let record = FailureRecord {
            timestamp: Utc::now(),
            prompt: prompt.to_string(),
            candidate: candidate.to_string(),
            stderr: stderr.trim().to_string(),
            test_case: test_case.to_string(),
        };
        self.append(&self.failure_path(), &record).await
    }

    /// Appends a full-pass record.
    pub async fn log_success(
        &self,
        prompt: &str,
        original: Option<&str>,
        corrected: &str,
        test_case: &str,
    ) -> Result<(), HistoryError> {
        let record = SuccessRecord {
            timestamp: Utc::now(),
            prompt: prompt.to_string(),
            original: original.map(str::to_string),
            corrected: corrected.to_string(),
            test_case: test_case.to_string(),
            kind: "success".to_string(),
        };
        self.append(&self.success_path(), &record).await
    }

    async fn append<T: Serialize>(&self, path: &Path, record: &T) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Reads every parseable failure record from a JSONL file.
///
/// A missing file yields no records; malformed lines are skipped.
pub async fn load_failures(path: &Path) -> Result<Vec<FailureRecord>, HistoryError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FailureRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::debug!(line = index + 1, error = %e, "Skipping malformed failure record");
            }
        }
    }
    Ok(records)
}
