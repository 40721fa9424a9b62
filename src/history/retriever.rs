//! Retrieval of similar past failures for prompt augmentation.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::HistoryError;
use crate::history::log::{load_failures, FailureRecord};

/// Looks up prior failure records relevant to a query.
#[async_trait]
pub trait FailureRetriever: Send + Sync {
    /// Returns at most `k` records, best match first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<FailureRecord>, HistoryError>;
}

/// Scores a record by case-insensitive containment of the query:
/// 3 for the prompt, 2 for the candidate, 1 for the error text.
pub fn overlap_score(query_lower: &str, record: &FailureRecord) -> u32 {
    let mut score = 0;
    if record.prompt.to_lowercase().contains(query_lower) {
        score += 3;
    }
    if record.candidate.to_lowercase().contains(query_lower) {
        score += 2;
    }
    if record.stderr.to_lowercase().contains(query_lower) {
        score += 1;
    }
    score
}

/// Ranks records by [`overlap_score`], dropping non-matches.
///
/// The sort is stable, so equal scores keep log order.
pub fn rank_failures(query: &str, records: Vec<FailureRecord>, k: usize) -> Vec<FailureRecord> {
    let query = query.to_lowercase();
    let mut scored: Vec<(u32, FailureRecord)> = records
        .into_iter()
        .map(|record| (overlap_score(&query, &record), record))
        .filter(|(score, _)| *score > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(k).map(|(_, record)| record).collect()
}

/// Retriever over the JSONL failure log written by [`crate::history::CaseLog`].
#[derive(Debug, Clone)]
pub struct JsonlRetriever {
    path: PathBuf,
}

impl JsonlRetriever {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FailureRetriever for JsonlRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<FailureRecord>, HistoryError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let records = load_failures(&self.path).await?;
        Ok(rank_failures(query, records, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::CaseLog;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(prompt: &str, candidate: &str, stderr: &str) -> FailureRecord {
        FailureRecord {
            timestamp: Utc::now(),
            prompt: prompt.to_string(),
            candidate: candidate.to_string(),
            stderr: stderr.to_string(),
            test_case: String::new(),
        }
    }

    #[test]
    fn test_overlap_score_weights() {
        let r = record("fix add", "def ADD(a, b)", "add failed");
        assert_eq!(overlap_score("add", &r), 6);
        assert_eq!(overlap_score("def", &r), 2);
        assert_eq!(overlap_score("failed", &r), 1);
        assert_eq!(overlap_score("zzz", &r), 0);
    }

    #[test]
    fn test_rank_drops_zero_and_keeps_log_order_on_ties() {
        let records = vec![
            record("", "first match", ""),
            record("", "", "nothing"),
            record("match in prompt", "", ""),
            record("", "second match", ""),
        ];

        let ranked = rank_failures("match", records, 5);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].prompt, "match in prompt");
        assert_eq!(ranked[1].candidate, "first match");
        assert_eq!(ranked[2].candidate, "second match");
    }

    #[test]
    fn test_rank_truncates_to_k() {
        let records = (0..10).map(|i| record("", &format!("x{i}"), "")).collect();
        assert_eq!(rank_failures("x", records, 3).len(), 3);
    }

    #[tokio::test]
    async fn test_jsonl_retriever_reads_case_log() {
        let dir = TempDir::new().unwrap();
        let log = CaseLog::new(dir.path());
        log.log_failure("", "def add(a, b): return a - b", "AssertionError", "")
            .await
            .unwrap();
        log.log_failure("", "def mul(a, b): return a", "AssertionError", "")
            .await
            .unwrap();

        let retriever = JsonlRetriever::new(log.failure_path());
        let hits = retriever.retrieve("def add", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].candidate.contains("a - b"));

        let missing = JsonlRetriever::new(dir.path().join("absent.jsonl"));
        assert!(missing.retrieve("def", 3).await.unwrap().is_empty());
    }
}
