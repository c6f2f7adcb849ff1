//! Adapters pointed at binaries that do not exist report `NotInstalled`,
//! which the pipeline turns into an environment error.

use std::path::Path;

use dockpipe_engine::{
    BuildEngine, ComposeEngine, DockerCli, DockerCompose, EngineError, PythonInterpreter,
    SyntaxChecker,
};

const NO_SUCH_BINARY: &str = "dockpipe-no-such-binary-7f3a";

#[tokio::test]
async fn docker_client_not_installed() {
    let docker = DockerCli::new().with_binary(NO_SUCH_BINARY);
    let err = docker.client_version().await.unwrap_err();
    assert!(matches!(err, EngineError::NotInstalled { ref program } if program == NO_SUCH_BINARY));
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn buildx_probe_is_false_without_client() {
    let docker = DockerCli::new().with_binary(NO_SUCH_BINARY);
    assert!(!docker.has_buildx().await);
}

#[tokio::test]
async fn interpreter_not_installed() {
    let python = PythonInterpreter::new().with_binary(NO_SUCH_BINARY);
    let err = python.version().await.unwrap_err();
    assert!(matches!(err, EngineError::NotInstalled { .. }));

    let err = python
        .check_file(Path::new("main.py"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotInstalled { .. }));
}

#[tokio::test]
async fn compose_ps_not_installed() {
    let dir = tempfile::tempdir().unwrap();
    let compose =
        DockerCompose::new(dir.path(), "docker-compose.test.yml").with_binary(NO_SUCH_BINARY);
    let err = compose.ps("app").await.unwrap_err();
    assert!(err.is_unavailable());
}
