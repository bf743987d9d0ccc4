use runcell::{ExecRequest, Outcome, SandboxMode, SubmittedFile};

use super::{PYTHON_VERSION, executor, install_shim_runtime, test_env};

#[tokio::test]
async fn runtimes_lists_the_installed_matrix() {
    let env = test_env();
    let executor = executor(&env).await;

    let runtimes: std::collections::BTreeMap<_, _> =
        executor.runtimes().into_iter().collect();
    assert_eq!(runtimes["python"], vec![PYTHON_VERSION.to_string()]);
    assert!(runtimes["node"].is_empty());
}

#[tokio::test]
async fn refresh_discovers_runtimes_installed_after_startup() {
    let env = test_env();
    let executor = executor(&env).await;

    install_shim_runtime(env.root.path(), "node", "20.11.1", "node");
    executor.refresh_runtimes();

    let runtimes: std::collections::BTreeMap<_, _> =
        executor.runtimes().into_iter().collect();
    assert_eq!(runtimes["node"], vec!["20.11.1".to_string()]);
}

#[tokio::test]
async fn prefix_version_request_resolves_to_greatest_install() {
    let env = test_env();
    install_shim_runtime(env.root.path(), "python", "3.11.2", "python3");
    install_shim_runtime(env.root.path(), "python", "3.9.18", "python3");
    let executor = executor(&env).await;

    // Both prefixes match at least one installed version
    for version in ["3.11", "3"] {
        let request = ExecRequest::new(
            "python",
            version,
            vec![SubmittedFile::new("main.py", "echo resolved")],
        );
        let result = executor.execute(request).await.unwrap();
        assert_eq!(result.outcome, Outcome::Completed, "version {version}");
        assert_eq!(result.stdout, b"resolved\n");
    }
}

#[tokio::test]
async fn capabilities_report_forced_direct_mode() {
    let env = test_env();
    let executor = executor(&env).await;

    let caps = executor.capabilities();
    assert_eq!(caps.sandbox_mode, SandboxMode::Direct);
    assert!(caps.probe_error.is_none());
}
