use std::sync::Arc;
use std::time::Instant;

use runcell::{ExecRequest, Outcome, SubmittedFile};
use tokio::sync::Notify;

use super::{PYTHON_VERSION, executor, test_env};

fn request(script: &str) -> ExecRequest {
    ExecRequest::new(
        "python",
        PYTHON_VERSION,
        vec![SubmittedFile::new("main.py", script)],
    )
}

fn workspace_entries(env: &super::TestEnv) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(env.workspace_root()) {
        Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn workspace_is_deleted_after_success() {
    let env = test_env();
    let executor = executor(&env).await;

    let result = executor.execute(request("echo done")).await.unwrap();
    assert_eq!(result.outcome, Outcome::Completed);
    assert!(workspace_entries(&env).is_empty());
}

#[tokio::test]
async fn workspace_is_deleted_after_timeout() {
    let env = test_env();
    let executor = executor(&env).await;

    let result = executor
        .execute(request("/bin/sleep 30").with_time_limit(0.5))
        .await
        .unwrap();
    assert_eq!(result.outcome, Outcome::TimedOut);
    assert!(workspace_entries(&env).is_empty());
}

#[tokio::test]
async fn workspace_is_deleted_after_runtime_error() {
    let env = test_env();
    let executor = executor(&env).await;

    let result = executor.execute(request("exit 9")).await.unwrap();
    assert_eq!(result.outcome, Outcome::RuntimeError);
    assert!(workspace_entries(&env).is_empty());
}

#[tokio::test]
async fn cancellation_produces_a_cancelled_result() {
    let env = test_env();
    let executor = executor(&env).await;

    let cancel = Arc::new(Notify::new());
    let trigger = Arc::clone(&cancel);
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        trigger.notify_one();
    });

    let start = Instant::now();
    let result = executor
        .execute_cancellable(
            request("/bin/sleep 30").with_time_limit(30.0),
            cancel,
        )
        .await
        .unwrap();

    assert_eq!(result.outcome, Outcome::Cancelled);
    assert!(
        start.elapsed().as_secs() < 10,
        "cancellation must not wait for the deadline"
    );
    assert!(workspace_entries(&env).is_empty());
}

#[tokio::test]
async fn concurrent_executions_do_not_interleave() {
    let env = test_env();
    let executor = Arc::new(executor(&env).await);

    let mut handles = Vec::new();
    for i in 0..4 {
        let executor = Arc::clone(&executor);
        handles.push(tokio::spawn(async move {
            let marker = format!("job-{i}");
            let script = format!(
                "n=0; while [ $n -lt 50 ]; do echo {marker}; n=$((n+1)); done"
            );
            let result = executor.execute(request(&script)).await.unwrap();
            (marker, result)
        }));
    }

    for handle in handles {
        let (marker, result) = handle.await.unwrap();
        assert_eq!(result.outcome, Outcome::Completed);
        let text = String::from_utf8(result.stdout).unwrap();
        let expected = format!("{marker}\n").repeat(50);
        assert_eq!(text, expected, "streams of one job must stay its own");
    }

    assert!(workspace_entries(&env).is_empty());
}

#[tokio::test]
async fn process_group_has_no_survivors_after_timeout() {
    let env = test_env();
    let executor = executor(&env).await;

    // The child forks a grandchild that writes a heartbeat file forever.
    // After the timeout teardown, the heartbeat must stop.
    let heartbeat = env.root.path().join("heartbeat");
    let script = format!(
        "(while true; do echo beat >> {}; /bin/sleep 0.1; done) & /bin/sleep 30",
        heartbeat.display()
    );
    let result = executor
        .execute(request(&script).with_time_limit(0.5))
        .await
        .unwrap();
    assert_eq!(result.outcome, Outcome::TimedOut);

    let size_then = std::fs::metadata(&heartbeat).map(|m| m.len()).unwrap_or(0);
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    let size_now = std::fs::metadata(&heartbeat).map(|m| m.len()).unwrap_or(0);
    assert_eq!(
        size_then, size_now,
        "a surviving grandchild is still writing"
    );
}
