//! Integration tests for the LLM client and generators.
//!
//! These tests make real API calls to an OpenAI-compatible endpoint.
//! Run with: LLM_API_BASE=http://localhost:4000/v1 cargo test --test llm_integration -- --ignored

use std::sync::Arc;
use std::time::Duration;

use reason_forge::evaluator::is_valid_python;
use reason_forge::llm::{
    CachedGenerator, CandidateCache, CandidateGenerator, GenerationRequest, LiteLlmClient,
    LlmGenerator, LlmProvider, Message,
};

fn test_model() -> String {
    std::env::var("LLM_MODEL").unwrap_or_else(|_| "deepseek-coder".to_string())
}

fn create_test_client() -> LiteLlmClient {
    let api_base = std::env::var("LLM_API_BASE")
        .expect("LLM_API_BASE environment variable must be set for integration tests");
    let api_key = std::env::var("LLM_API_KEY").ok();
    LiteLlmClient::new(api_base, api_key, test_model(), Duration::from_secs(60))
        .expect("client should build")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_simple_generation() {
    let client = create_test_client();

    let request = GenerationRequest::new(
        test_model(),
        vec![
            Message::system("You are a helpful assistant. Reply concisely."),
            Message::user("What is 2 + 2? Reply with just the number."),
        ],
    )
    .with_max_tokens(10)
    .with_temperature(0.0);

    let response = client.generate(request).await;
    assert!(response.is_ok(), "Generation failed: {:?}", response.err());

    let response = response.expect("Should have response");
    assert!(
        !response.choices.is_empty(),
        "Should have at least one choice"
    );

    let content = response.first_content().expect("Should have content");
    assert!(
        content.contains('4'),
        "Response should contain '4', got: {}",
        content
    );
}

#[tokio::test]
#[ignore]
async fn test_generator_returns_valid_python() {
    let generator = LlmGenerator::new("remote", Arc::new(create_test_client()), test_model())
        .with_temperature(0.2);

    let candidates = generator
        .generate(
            "Current code:\n```python\ndef add(a, b):\n    return a - b\n```\n\nFix the code so that add(1, 2) == 3. Return only the corrected Python code.",
            2,
        )
        .await
        .expect("Generation should succeed");

    assert!(!candidates.is_empty(), "Should produce at least one candidate");
    for candidate in &candidates {
        assert!(is_valid_python(candidate), "Invalid candidate: {candidate}");
        assert!(candidate.contains("def add"), "Unexpected candidate: {candidate}");
    }
}

#[tokio::test]
#[ignore]
async fn test_cached_generator_reuses_response() {
    let inner = LlmGenerator::new("remote", Arc::new(create_test_client()), test_model());
    let cache = Arc::new(CandidateCache::new(8));
    let generator = CachedGenerator::new(Arc::new(inner), cache.clone());

    let prompt = "Write a Python function square(x) that returns x * x.";
    let first = generator.generate(prompt, 1).await.expect("first call");
    let second = generator.generate(prompt, 1).await.expect("second call");

    assert_eq!(first, second);
    assert_eq!(cache.stats().hits, 1);
}
