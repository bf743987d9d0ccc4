use runcell::{ExecRequest, ExecuteError, SubmittedFile};

use super::{PYTHON_VERSION, executor, test_env};

#[tokio::test]
async fn traversal_name_is_rejected_before_any_workspace_exists() {
    let env = test_env();
    let executor = executor(&env).await;

    let request = ExecRequest::new(
        "python",
        PYTHON_VERSION,
        vec![SubmittedFile::new("../evil", "x")],
    );
    let result = executor.execute(request).await;

    assert!(matches!(result, Err(ExecuteError::InvalidRequest(_))));
    assert!(
        !env.workspace_root().exists(),
        "no workspace may be created for a rejected request"
    );
}

#[tokio::test]
async fn absolute_name_is_rejected() {
    let env = test_env();
    let executor = executor(&env).await;

    let request = ExecRequest::new(
        "python",
        PYTHON_VERSION,
        vec![SubmittedFile::new("/etc/cron.d/job", "x")],
    );
    assert!(matches!(
        executor.execute(request).await,
        Err(ExecuteError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn oversized_stdin_is_rejected() {
    let mut env = test_env();
    env.config.limits.max_stdin_bytes = 16;
    let executor = executor(&env).await;

    let request = ExecRequest::new(
        "python",
        PYTHON_VERSION,
        vec![SubmittedFile::new("main.py", "echo hi")],
    )
    .with_stdin(vec![b'x'; 17]);
    assert!(matches!(
        executor.execute(request).await,
        Err(ExecuteError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn unknown_language_is_surfaced() {
    let env = test_env();
    let executor = executor(&env).await;

    let request = ExecRequest::new("fortran", "95", vec![SubmittedFile::new("m.f", "x")]);
    assert!(matches!(
        executor.execute(request).await,
        Err(ExecuteError::Runtime(_))
    ));
}

#[tokio::test]
async fn unknown_version_is_surfaced() {
    let env = test_env();
    let executor = executor(&env).await;

    let request = ExecRequest::new("python", "2.7", vec![SubmittedFile::new("m.py", "x")]);
    let result = executor.execute(request).await;
    assert!(matches!(result, Err(ExecuteError::Runtime(_))));
    assert!(!env.workspace_root().exists());
}

#[tokio::test]
async fn time_limit_above_ceiling_is_rejected() {
    let env = test_env();
    let executor = executor(&env).await;

    let request = ExecRequest::new(
        "python",
        PYTHON_VERSION,
        vec![SubmittedFile::new("main.py", "echo hi")],
    )
    .with_time_limit(env.config.limits.max_time_limit + 1.0);
    assert!(matches!(
        executor.execute(request).await,
        Err(ExecuteError::InvalidRequest(_))
    ));
}
