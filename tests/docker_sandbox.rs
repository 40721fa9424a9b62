//! Integration tests for the Docker sandbox.
//!
//! These tests need a running Docker daemon and pull `python:3.10-slim`.
//! Run with: cargo test --test docker_sandbox -- --ignored

use std::sync::Arc;

use reason_forge::evaluator::{Level, TieredEvaluator};
use reason_forge::execution::{
    connect_sandbox, ExecResult, ExecutionLimits, SandboxConfig, SandboxStrategy,
};
use reason_forge::history::{load_failures, CaseLog};

const FIXED: &str = "def add(a, b):\n    return a + b";
const BUGGY: &str = "def add(a, b):\n    return a - b";
const HARNESS: &str = "    assert add(1, 2) == 3";

fn config(strategy: SandboxStrategy) -> SandboxConfig {
    SandboxConfig::default()
        .with_strategy(strategy)
        .with_limits(ExecutionLimits::new(128, 0.5, 32, 3))
}

#[tokio::test]
#[ignore] // Run with: cargo test --test docker_sandbox -- --ignored
async fn test_persistent_sandbox_runs_programs() {
    let sandbox = connect_sandbox(config(SandboxStrategy::Persistent)).expect("docker available");

    let passed = sandbox.execute(FIXED, HARNESS).await;
    assert!(passed.success(), "unexpected failure: {:?}", passed);

    let failed = sandbox.execute(BUGGY, HARNESS).await;
    assert!(!failed.success());
    assert!(failed.stderr.contains("AssertionError"), "stderr: {}", failed.stderr);

    sandbox.shutdown().await;
    let closed = sandbox.execute(FIXED, HARNESS).await;
    assert!(closed.is_infra_failure());
}

#[tokio::test]
#[ignore]
async fn test_timeout_is_distinct_and_session_recovers() {
    let sandbox = connect_sandbox(config(SandboxStrategy::Persistent)).expect("docker available");

    let looping = "def spin():\n    while True:\n        pass";
    let timed_out = sandbox.execute(looping, "    spin()").await;
    assert!(timed_out.timed_out);
    assert_eq!(timed_out.exit_code, ExecResult::TIMEOUT_EXIT_CODE);
    assert!(!timed_out.success());

    let after = sandbox.execute(FIXED, HARNESS).await;
    assert!(after.success(), "session should be recreated: {:?}", after);

    sandbox.shutdown().await;
}

#[tokio::test]
#[ignore]
async fn test_network_is_disabled() {
    let sandbox = connect_sandbox(config(SandboxStrategy::Ephemeral)).expect("docker available");

    let code = "import socket\n\ndef probe():\n    socket.create_connection(('1.1.1.1', 53), timeout=1)";
    let result = sandbox.execute(code, "    probe()").await;
    assert!(!result.success());
}

#[tokio::test]
#[ignore]
async fn test_concurrent_evaluations_on_persistent_session() {
    let sandbox = connect_sandbox(config(SandboxStrategy::Persistent)).expect("docker available");
    let evaluator = TieredEvaluator::new(sandbox.clone());

    let (a, b, c) = tokio::join!(
        evaluator.evaluate(FIXED, HARNESS),
        evaluator.evaluate(BUGGY, HARNESS),
        evaluator.evaluate(FIXED, HARNESS),
    );
    assert!(a.passed);
    assert_eq!(b.failed_at, Some(Level::Runtime));
    assert!(c.passed);

    sandbox.shutdown().await;
}

#[tokio::test]
#[ignore]
async fn test_ephemeral_evaluation_writes_case_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let case_log = Arc::new(CaseLog::new(dir.path()));
    let sandbox = connect_sandbox(config(SandboxStrategy::Ephemeral)).expect("docker available");
    let evaluator = TieredEvaluator::new(sandbox.clone()).with_case_log(case_log.clone());

    let evaluation = evaluator.evaluate(BUGGY, HARNESS).await;
    assert_eq!(evaluation.reward, 0.7);

    let failures = load_failures(&case_log.failure_path()).await.expect("log readable");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].candidate, BUGGY);
}
