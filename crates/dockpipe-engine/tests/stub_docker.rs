//! Real adapters driven through a shell script standing in for `docker`.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dockpipe_engine::{BuildEngine, ComposeEngine, DockerCli, DockerCompose, EngineError};
use tempfile::TempDir;

/// Write an executable `docker` stub that appends its argv to `calls.log`
/// and then runs `body`.
fn stub(body: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let bin = dir.path().join("docker");
    let script = format!(
        "#!/bin/sh\necho \"$@\" >> \"{}\"\n{}\n",
        dir.path().join("calls.log").display(),
        body
    );
    std::fs::write(&bin, script).unwrap();
    std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
    (dir, bin)
}

fn calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(String::from)
        .collect()
}

#[tokio::test]
async fn smoke_timeout_removes_container() {
    let (dir, bin) = stub("case \"$1\" in run) exec sleep 30 ;; esac");
    let docker = DockerCli::new().with_binary(bin.to_string_lossy());

    let err = docker
        .run_smoke(
            "demo",
            &["python".to_string(), "--version".to_string()],
            Duration::from_millis(300),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }));

    let log = calls(dir.path());
    assert_eq!(log.len(), 2, "{log:?}");
    let run: Vec<&str> = log[0].split_whitespace().collect();
    let name_pos = run.iter().position(|a| *a == "--name").unwrap();
    let name = run[name_pos + 1];
    assert!(name.starts_with("dockpipe-smoke-"));
    assert_eq!(log[1], format!("rm --force {}", name));
}

#[tokio::test]
async fn smoke_success_leaves_no_removal() {
    let (dir, bin) = stub("echo 'Python 3.11.9'");
    let docker = DockerCli::new().with_binary(bin.to_string_lossy());

    let out = docker
        .run_smoke("demo", &["python".to_string()], Duration::from_secs(10))
        .await
        .unwrap();
    assert!(out.success());
    assert!(out.output.contains("Python 3.11.9"));
    assert_eq!(calls(dir.path()).len(), 1);
}

#[tokio::test]
async fn failed_image_removal_is_an_error() {
    let (dir, bin) = stub("case \"$1\" in images) printf 'aaa\\nbbb\\n' ;; rmi) exit 1 ;; esac");
    let compose =
        DockerCompose::new(dir.path(), "docker-compose.test.yml").with_binary(bin.to_string_lossy());

    let err = compose.remove_images("chatbot*").await.unwrap_err();
    assert!(matches!(err, EngineError::CommandFailed { exit_code: 1, .. }));
    assert_eq!(calls(dir.path()).last().unwrap(), "rmi --force aaa bbb");
}

#[tokio::test]
async fn image_removal_counts_removed_ids() {
    let (dir, bin) = stub("case \"$1\" in images) printf 'aaa\\nbbb\\naaa\\n' ;; esac");
    let compose =
        DockerCompose::new(dir.path(), "docker-compose.test.yml").with_binary(bin.to_string_lossy());

    assert_eq!(compose.remove_images("chatbot*").await.unwrap(), 2);
}
