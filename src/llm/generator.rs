//! Candidate generation capability.
//!
//! The search engine depends only on [`CandidateGenerator`]: a prompt in,
//! a bounded list of code strings out. Concrete variants:
//!
//! - [`LlmGenerator`]: any [`LlmProvider`] (remote API or local server)
//! - [`MockGenerator`]: scripted, deterministic candidates
//! - [`CachedGenerator`]: wraps another generator with a [`CandidateCache`]
//! - [`crate::llm::ModelRouter`]: picks local or remote by prompt difficulty

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::evaluator::is_valid_python;
use crate::llm::cache::CandidateCache;
use crate::llm::litellm::{GenerationRequest, LlmProvider, Message};
use crate::utils::{dedup_preserving_order, extract_code};

/// Something that turns a prompt into candidate programs.
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    /// Generates up to `n` candidates for `prompt`.
    ///
    /// An `Ok` result may hold fewer than `n` candidates, or none.
    async fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, LlmError>;

    /// Human-readable generator name for logs.
    fn name(&self) -> &str;
}

/// System prompt for candidate generation.
pub const CODE_SYSTEM_PROMPT: &str = "You are an expert Python programmer who repairs \
buggy code. Reply with the complete corrected code in a single ```python block and no \
explanation.";

/// Generator backed by a chat-completion provider.
///
/// Each of the `n` candidates is a separate request so sampling produces
/// diverse answers; requests run concurrently up to the semaphore limit.
pub struct LlmGenerator {
    name: String,
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    semaphore: Arc<Semaphore>,
}

impl LlmGenerator {
    /// Default cap on in-flight requests.
    pub const DEFAULT_MAX_CONCURRENT: usize = 5;

    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: 1024,
            semaphore: Arc::new(Semaphore::new(Self::DEFAULT_MAX_CONCURRENT)),
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the cap on concurrent in-flight requests.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        self
    }

    async fn sample_once(&self, prompt: &str) -> Result<Option<String>, LlmError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| LlmError::RequestFailed(format!("Semaphore closed: {e}")))?;

        let request = GenerationRequest::new(
            self.model.clone(),
            vec![Message::system(CODE_SYSTEM_PROMPT), Message::user(prompt)],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let response = self.provider.generate(request).await?;
        Ok(response.first_content().map(extract_code))
    }
}

#[async_trait]
impl CandidateGenerator for LlmGenerator {
    async fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, LlmError> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let results = join_all((0..n).map(|_| self.sample_once(prompt))).await;

        let mut raw = Vec::with_capacity(n);
        let mut last_error = None;
        for result in results {
            match result {
                Ok(Some(code)) => raw.push(code),
                Ok(None) => {}
                Err(e) => {
                    warn!(generator = %self.name, error = %e, "Generation attempt failed");
                    last_error = Some(e);
                }
            }
        }

        if raw.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let returned = raw.len();
        let candidates: Vec<String> = dedup_preserving_order(raw)
            .into_iter()
            .filter(|code| !code.is_empty() && is_valid_python(code))
            .collect();

        info!(
            generator = %self.name,
            requested = n,
            returned,
            valid = candidates.len(),
            "Generation complete"
        );
        Ok(candidates)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Deterministic generator for tests and offline runs.
///
/// Rules are checked in insertion order; the first rule whose trigger is a
/// substring of the prompt supplies the candidates. Otherwise the default
/// candidates are cycled to fill `n`.
#[derive(Debug, Default)]
pub struct MockGenerator {
    rules: Vec<(String, Vec<String>)>,
    defaults: Vec<String>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `candidates` whenever the prompt contains `trigger`.
    pub fn with_rule(mut self, trigger: impl Into<String>, candidates: Vec<String>) -> Self {
        self.rules.push((trigger.into(), candidates));
        self
    }

    /// Candidates used when no rule matches.
    pub fn with_defaults(mut self, candidates: Vec<String>) -> Self {
        self.defaults = candidates;
        self
    }

    /// Makes every call fail as if the oracle were unreachable.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateGenerator for MockGenerator {
    async fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            return Err(LlmError::RequestFailed("mock generator unavailable".to_string()));
        }

        let matched = self
            .rules
            .iter()
            .find(|(trigger, _)| prompt.contains(trigger.as_str()));

        let candidates = match matched {
            Some((_, candidates)) => candidates.iter().take(n).cloned().collect(),
            None => self.defaults.iter().cycle().take(n).cloned().collect(),
        };
        Ok(candidates)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Memoizes another generator's output by prompt.
///
/// Hits bypass the inner generator. Only non-empty results are stored so a
/// transient failure is retried on the next call.
pub struct CachedGenerator {
    inner: Arc<dyn CandidateGenerator>,
    cache: Arc<CandidateCache>,
}

impl CachedGenerator {
    pub fn new(inner: Arc<dyn CandidateGenerator>, cache: Arc<CandidateCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<CandidateCache> {
        &self.cache
    }
}

#[async_trait]
impl CandidateGenerator for CachedGenerator {
    async fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, LlmError> {
        if let Some(cached) = self.cache.get(prompt) {
            debug!(count = cached.len(), "Candidate cache hit");
            return Ok(cached);
        }

        let candidates = self.inner.generate(prompt, n).await?;
        if !candidates.is_empty() {
            self.cache.set(prompt, candidates.clone());
        }
        Ok(candidates)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::litellm::{Choice, GenerationResponse, Usage};
    use std::sync::Mutex;

    /// Provider that replays scripted replies in order.
    struct ScriptedProvider {
        replies: Mutex<Vec<Result<String, u16>>>,
        requests: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<&str, u16>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .rev()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                requests: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let next = self.replies.lock().unwrap().pop();
            match next {
                Some(Ok(content)) => Ok(GenerationResponse {
                    id: "id".to_string(),
                    model: "test".to_string(),
                    choices: vec![Choice {
                        index: 0,
                        message: Message::assistant(content),
                        finish_reason: "stop".to_string(),
                    }],
                    usage: Usage::default(),
                }),
                Some(Err(code)) => Err(LlmError::ApiError {
                    code,
                    message: "scripted failure".to_string(),
                }),
                None => Err(LlmError::RequestFailed("no more replies".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_llm_generator_extracts_dedups_and_filters() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("```python\ndef add(a, b):\n    return a + b\n```"),
            Ok("Fixed:\n```python\ndef add(a, b):\n    return a + b\n```"),
            Ok("```python\ndef add(a, b)\n    return a + b\n```"),
            Ok("def add(a, b):\n    return b + a"),
        ]));
        let generator = LlmGenerator::new("remote", provider.clone(), "deepseek-coder")
            .with_max_concurrent(1);

        let candidates = generator.generate("fix add", 4).await.unwrap();
        assert_eq!(provider.requests.load(Ordering::SeqCst), 4);
        assert_eq!(
            candidates,
            vec![
                "def add(a, b):\n    return a + b".to_string(),
                "def add(a, b):\n    return b + a".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_llm_generator_partial_failure_keeps_successes() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(500),
            Ok("def f():\n    return 1"),
        ]));
        let generator =
            LlmGenerator::new("remote", provider, "deepseek-coder").with_max_concurrent(1);

        let candidates = generator.generate("p", 2).await.unwrap();
        assert_eq!(candidates, vec!["def f():\n    return 1".to_string()]);
    }

    #[tokio::test]
    async fn test_llm_generator_all_failed_is_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(429), Err(503)]));
        let generator = LlmGenerator::new("remote", provider, "deepseek-coder");

        let err = generator.generate("p", 2).await.unwrap_err();
        assert!(matches!(err, LlmError::ApiError { .. }));
    }

    #[tokio::test]
    async fn test_mock_generator_rules_and_defaults() {
        let generator = MockGenerator::new()
            .with_rule("a - b", vec!["def add(a, b):\n    return a + b".to_string()])
            .with_defaults(vec!["def f():\n    return 0".to_string()]);

        let ruled = generator.generate("return a - b", 3).await.unwrap();
        assert_eq!(ruled.len(), 1);
        assert!(ruled[0].contains("a + b"));

        let defaults = generator.generate("other", 3).await.unwrap();
        assert_eq!(defaults.len(), 3);
        assert_eq!(generator.calls(), 2);

        let failing = MockGenerator::failing();
        assert!(failing.generate("p", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_cached_generator_bypasses_inner_on_hit() {
        let inner = Arc::new(
            MockGenerator::new().with_defaults(vec!["def f():\n    return 1".to_string()]),
        );
        let cache = Arc::new(CandidateCache::new(8));
        let generator = CachedGenerator::new(inner.clone(), cache.clone());

        let first = generator.generate("prompt", 2).await.unwrap();
        let second = generator.generate("prompt", 2).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls(), 1);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(generator.name(), "mock");
    }

    #[tokio::test]
    async fn test_cached_generator_does_not_store_empty() {
        let inner = Arc::new(MockGenerator::new());
        let generator = CachedGenerator::new(inner.clone(), Arc::new(CandidateCache::new(8)));

        assert!(generator.generate("prompt", 2).await.unwrap().is_empty());
        assert!(generator.generate("prompt", 2).await.unwrap().is_empty());
        assert_eq!(inner.calls(), 2);
    }
}
