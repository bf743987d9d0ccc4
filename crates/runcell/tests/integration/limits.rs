use std::time::Instant;

use runcell::{ExecRequest, Outcome, SubmittedFile};

use super::{PYTHON_VERSION, executor, test_env};

fn request(script: &str) -> ExecRequest {
    ExecRequest::new(
        "python",
        PYTHON_VERSION,
        vec![SubmittedFile::new("main.py", script)],
    )
}

#[tokio::test]
async fn wall_timeout_kills_a_sleeper() {
    let env = test_env();
    let executor = executor(&env).await;

    let start = Instant::now();
    let result = executor
        .execute(request("/bin/sleep 30").with_time_limit(0.5))
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::TimedOut);
    assert_eq!(result.stdout, b"");
    assert!(
        start.elapsed().as_secs() < 10,
        "sleeper must die at the deadline, not after 30s"
    );
}

#[tokio::test]
async fn program_finishing_under_the_limit_completes() {
    let env = test_env();
    let executor = executor(&env).await;

    let result = executor
        .execute(request("echo done").with_time_limit(2.0))
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Completed);
}

#[tokio::test]
async fn stdout_exactly_at_cap_is_not_truncated() {
    let mut env = test_env();
    env.config.limits.max_stdout_bytes = 512;
    let executor = executor(&env).await;

    // printf is a shell builtin; 8 * 64 = 512 bytes, no newline
    let script = "i=0; while [ $i -lt 8 ]; do printf '%064d' 0; i=$((i+1)); done";
    let result = executor.execute(request(script)).await.unwrap();

    assert_eq!(result.outcome, Outcome::Completed);
    assert!(!result.stdout_truncated);
    assert_eq!(result.stdout.len(), 512);
}

#[tokio::test]
async fn stdout_past_cap_is_truncated_with_marker() {
    let mut env = test_env();
    env.config.limits.max_stdout_bytes = 512;
    let executor = executor(&env).await;

    // 513 bytes
    let script = "printf '%0512d' 0; printf x";
    let result = executor.execute(request(script)).await.unwrap();

    assert!(result.stdout_truncated);
    let text = String::from_utf8(result.stdout.clone()).unwrap();
    assert!(text.contains("stdout truncated at 512 bytes"));
    // Content before the marker fits in the cap
    let content_len = text.find("\n[stdout truncated").unwrap();
    assert!(content_len <= 512);
}

#[tokio::test]
async fn stderr_has_its_own_cap() {
    let mut env = test_env();
    env.config.limits.max_stderr_bytes = 256;
    let executor = executor(&env).await;

    let script = "printf '%0400d' 0 >&2";
    let result = executor.execute(request(script)).await.unwrap();

    assert!(result.stderr_truncated);
    assert!(!result.stdout_truncated);
    let text = String::from_utf8(result.stderr.clone()).unwrap();
    assert!(text.contains("stderr truncated at 256 bytes"));
}

#[tokio::test]
async fn unbounded_output_is_classified_as_output_exceeded() {
    let mut env = test_env();
    env.config.limits.max_stdout_bytes = 1024;
    env.config.limits.max_stderr_bytes = 1024;
    let executor = executor(&env).await;

    let start = Instant::now();
    let script = "while true; do echo aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa; done";
    let result = executor
        .execute(request(script).with_time_limit(30.0))
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::OutputExceeded);
    assert!(result.stdout_truncated);
    assert!(
        start.elapsed().as_secs() < 15,
        "the flood trigger must beat the 30s deadline"
    );
}

#[tokio::test]
async fn file_size_limit_stops_large_writes() {
    let mut env = test_env();
    env.config.limits.max_output_file_bytes = 4096;
    let executor = executor(&env).await;

    // Try to write 1 MiB to a workspace file; the child gets SIGXFSZ or a
    // short write, either way it cannot succeed with a zero exit.
    let script = "i=0; while [ $i -lt 16384 ]; do printf '%064d' 0 >> big.dat; i=$((i+1)); done";
    let result = executor.execute(request(script)).await.unwrap();

    assert_ne!(result.outcome, Outcome::Completed);
}

#[tokio::test]
async fn defaults_apply_when_request_leaves_limits_unset() {
    let env = test_env();
    let executor = executor(&env).await;

    let result = executor.execute(request("echo defaulted")).await.unwrap();
    assert_eq!(result.outcome, Outcome::Completed);
    assert_eq!(result.stdout, b"defaulted\n");
}
