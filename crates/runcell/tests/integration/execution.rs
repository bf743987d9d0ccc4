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
async fn happy_path_captures_stdout() {
    let env = test_env();
    let executor = executor(&env).await;

    let result = executor
        .execute(request("echo hi").with_time_limit(2.0).with_memory_limit(256))
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Completed);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout, b"hi\n");
    assert_eq!(result.stderr, b"");
    assert!(!result.stdout_truncated);
    assert!(result.is_success());
}

#[tokio::test]
async fn stdin_is_fed_once_up_front() {
    let env = test_env();
    let executor = executor(&env).await;

    // The child PATH is just the runtime's bin directory, so external
    // commands need explicit paths.
    let result = executor
        .execute(request("/bin/cat").with_stdin(&b"line one\nline two\n"[..]))
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Completed);
    assert_eq!(result.stdout, b"line one\nline two\n");
}

#[tokio::test]
async fn args_are_passed_after_the_entry_file() {
    let env = test_env();
    let executor = executor(&env).await;

    let result = executor
        .execute(request("echo \"$1-$2\"").with_args(["alpha", "beta"]))
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Completed);
    assert_eq!(result.stdout, b"alpha-beta\n");
}

#[tokio::test]
async fn nonzero_exit_is_a_runtime_error_outcome() {
    let env = test_env();
    let executor = executor(&env).await;

    let result = executor.execute(request("exit 7")).await.unwrap();

    assert_eq!(result.outcome, Outcome::RuntimeError);
    assert_eq!(result.exit_code, Some(7));
    assert!(!result.is_success());
}

#[tokio::test]
async fn stderr_is_captured_separately() {
    let env = test_env();
    let executor = executor(&env).await;

    let result = executor
        .execute(request("echo out; echo err >&2; exit 3"))
        .await
        .unwrap();

    assert_eq!(result.stdout, b"out\n");
    assert_eq!(result.stderr, b"err\n");
    assert_eq!(result.exit_code, Some(3));
}

#[tokio::test]
async fn death_by_signal_is_a_runtime_error() {
    let env = test_env();
    let executor = executor(&env).await;

    let result = executor.execute(request("kill -11 $$")).await.unwrap();

    assert_eq!(result.outcome, Outcome::RuntimeError);
    assert_eq!(result.exit_code, None);
    assert_eq!(result.termination_signal, Some(11));
}

#[tokio::test]
async fn secondary_files_are_reachable_from_the_entry() {
    let env = test_env();
    let executor = executor(&env).await;

    let request = ExecRequest::new(
        "python",
        PYTHON_VERSION,
        vec![
            SubmittedFile::new("main.py", ". ./lib/greeting.sh; echo \"$GREETING\""),
            SubmittedFile::new("lib/greeting.sh", "GREETING=hello-from-lib"),
        ],
    );
    let result = executor.execute(request).await.unwrap();

    assert_eq!(result.outcome, Outcome::Completed);
    assert_eq!(result.stdout, b"hello-from-lib\n");
}

#[tokio::test]
async fn identical_runs_are_deterministic() {
    let env = test_env();
    let executor = executor(&env).await;

    let first = executor
        .execute(request("echo deterministic; exit 4"))
        .await
        .unwrap();
    let second = executor
        .execute(request("echo deterministic; exit 4"))
        .await
        .unwrap();

    assert_eq!(first.stdout, second.stdout);
    assert_eq!(first.exit_code, second.exit_code);
    assert_eq!(first.outcome, second.outcome);
    assert_ne!(first.job_id, second.job_id);
}

#[tokio::test]
async fn wall_time_is_reported() {
    let env = test_env();
    let executor = executor(&env).await;

    let result = executor.execute(request("/bin/sleep 1")).await.unwrap();

    assert_eq!(result.outcome, Outcome::Completed);
    assert!(result.wall_time_ms >= 900, "was {}", result.wall_time_ms);
}
