mod support;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dockpipe_core::config::PipelineConfig;
use dockpipe_core::{ErrorClass, Outcome, PipelineError, ValidationReport, Validator};
use dockpipe_engine::fakes::{FakeBuildEngine, FakeInterpreter};
use dockpipe_engine::{EngineError, EngineResult, SyntaxChecker};

fn validator(
    root: &std::path::Path,
    engine: FakeBuildEngine,
    interpreter: Arc<FakeInterpreter>,
) -> Validator {
    Validator::new(root, PipelineConfig::default(), Arc::new(engine), interpreter)
}

fn outcome_of(report: &ValidationReport, name: &str) -> Outcome {
    report
        .results()
        .iter()
        .find(|r| r.name() == name)
        .unwrap_or_else(|| panic!("no check named {name}"))
        .outcome()
}

// ---- Complete project ----

#[tokio::test]
async fn complete_project_passes() {
    let dir = support::project();
    let py = Arc::new(FakeInterpreter::new());
    let report = validator(dir.path(), FakeBuildEngine::new(), py.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.total(), 48);
    assert_eq!(report.failures(), 0);
    assert!(report.passed() <= report.total());
    assert!(report.verdict().is_passing(), "{:?}", report.results());
    assert_eq!(report.results()[0].name(), "engine installed");
    // main.py, gunicorn.conf.py and one file per source directory
    assert_eq!(py.checked_files().len(), 6);
}

// ---- Fatal checks ----

#[tokio::test]
async fn engine_missing_is_fatal_before_any_file_check() {
    let dir = support::project();
    let py = Arc::new(FakeInterpreter::new());
    let err = validator(dir.path(), FakeBuildEngine::new().not_installed(), py.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::FatalEnvironment);
    assert!(py.checked_files().is_empty());
}

#[tokio::test]
async fn daemon_down_is_fatal() {
    let dir = support::project();
    let err = validator(
        dir.path(),
        FakeBuildEngine::new().daemon_down(),
        Arc::new(FakeInterpreter::new()),
    )
    .run()
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::FatalEnvironment { ref check, .. } if check == "daemon reachable"));
    assert!(err.hint().contains("systemctl start docker"));
}

#[tokio::test]
async fn missing_required_file_stops_later_groups() {
    let dir = support::project();
    support::remove(dir.path(), "gunicorn.conf.py");
    let py = Arc::new(FakeInterpreter::new());

    let err = validator(dir.path(), FakeBuildEngine::new(), py.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.class(), ErrorClass::FatalConfig);
    assert!(err.to_string().contains("gunicorn.conf.py"));
    assert!(py.checked_files().is_empty(), "syntax group must not run");
}

#[tokio::test]
async fn syntax_error_names_directory() {
    let dir = support::project();
    let py = Arc::new(FakeInterpreter::new().with_syntax_error("health.py"));

    let err = validator(dir.path(), FakeBuildEngine::new(), py)
        .run()
        .await
        .unwrap_err();

    match err {
        PipelineError::FatalConfig { check, message, .. } => {
            assert_eq!(check, "syntax routes/");
            assert!(message.contains("routes/health.py"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_critical_dependency_is_fatal() {
    let dir = support::project();
    let without_twilio: String = support::REQUIREMENTS
        .lines()
        .filter(|l| !l.starts_with("twilio"))
        .map(|l| format!("{l}\n"))
        .collect();
    support::replace(dir.path(), "requirements.txt", &without_twilio);

    let err = validator(dir.path(), FakeBuildEngine::new(), Arc::new(FakeInterpreter::new()))
        .run()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("twilio"));
}

#[tokio::test]
async fn psycopg2_alternative_is_accepted() {
    let dir = support::project();
    let swapped = support::REQUIREMENTS.replace("psycopg2-binary==2.9.9", "psycopg2==2.9.9");
    support::replace(dir.path(), "requirements.txt", &swapped);

    let report = validator(dir.path(), FakeBuildEngine::new(), Arc::new(FakeInterpreter::new()))
        .run()
        .await
        .unwrap();
    assert_eq!(
        outcome_of(&report, "dependency psycopg2|psycopg2-binary"),
        Outcome::Pass
    );
}

#[tokio::test]
async fn recipe_without_workdir_is_fatal() {
    let dir = support::project();
    support::replace(
        dir.path(),
        "Dockerfile",
        &support::DOCKERFILE.replace("WORKDIR /app\n", ""),
    );

    let err = validator(dir.path(), FakeBuildEngine::new(), Arc::new(FakeInterpreter::new()))
        .run()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("WORKDIR"));
}

// ---- Advisory checks ----

#[tokio::test]
async fn advisory_findings_only_warn() {
    let dir = support::project();
    let recipe = support::DOCKERFILE
        .replace("USER appuser\n", "")
        .replace(
            "HEALTHCHECK CMD curl -f http://localhost:8080/health || exit 1\n",
            "",
        );
    support::replace(dir.path(), "Dockerfile", &recipe);
    support::replace(dir.path(), ".dockerignore", ".git\n");
    support::replace(dir.path(), "certs/server.pem", "-----BEGIN-----\n");
    support::replace(
        dir.path(),
        "services/chat.py",
        "API_KEY = \"abcdef123456\"\n",
    );

    let report = validator(
        dir.path(),
        FakeBuildEngine::new().without_buildx().with_server_version("19.03.8"),
        Arc::new(FakeInterpreter::new().with_version("3.9.18")),
    )
    .run()
    .await
    .unwrap();

    for name in [
        "engine version",
        "buildx",
        "recipe user",
        "recipe healthcheck",
        "context ignore patterns",
        "secret files",
        "hard-coded credentials",
        "interpreter version",
    ] {
        assert_eq!(outcome_of(&report, name), Outcome::Warn, "{name}");
    }
    assert_eq!(report.failures(), 0);
    assert!(report.warnings() >= 8);
}

#[cfg(unix)]
#[tokio::test]
async fn world_writable_entrypoint_warns() {
    let dir = support::project();
    support::set_mode(dir.path(), "main.py", 0o666);

    let report = validator(dir.path(), FakeBuildEngine::new(), Arc::new(FakeInterpreter::new()))
        .run()
        .await
        .unwrap();
    assert_eq!(outcome_of(&report, "entrypoint permissions"), Outcome::Warn);
}

#[tokio::test]
async fn emulated_platform_warns() {
    let dir = support::project();
    let report = validator(dir.path(), FakeBuildEngine::new(), Arc::new(FakeInterpreter::new()))
        .with_platform(Some("linux/arm64".to_string()))
        .run()
        .await
        .unwrap();
    assert_eq!(outcome_of(&report, "platform"), Outcome::Warn);
}

#[tokio::test]
async fn missing_interpreter_degrades_to_warnings() {
    let dir = support::project();
    let report = validator(
        dir.path(),
        FakeBuildEngine::new(),
        Arc::new(FakeInterpreter::new().missing()),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(outcome_of(&report, "syntax"), Outcome::Warn);
    assert_eq!(outcome_of(&report, "interpreter version"), Outcome::Warn);
}

/// Interpreter that stalls past its deadline on one file name.
struct StallingInterpreter {
    inner: FakeInterpreter,
    stalls_on: &'static str,
}

#[async_trait]
impl SyntaxChecker for StallingInterpreter {
    async fn version(&self) -> EngineResult<String> {
        self.inner.version().await
    }

    async fn check_file(&self, path: &Path) -> EngineResult<Option<String>> {
        if path.file_name().is_some_and(|n| n == self.stalls_on) {
            return Err(EngineError::Timeout {
                command: format!("python3 -c <parse> {}", path.display()),
                seconds: 30,
            });
        }
        self.inner.check_file(path).await
    }
}

#[tokio::test]
async fn interpreter_timeout_is_not_a_syntax_error() {
    let dir = support::project();
    let py = Arc::new(StallingInterpreter {
        inner: FakeInterpreter::new(),
        stalls_on: "gunicorn.conf.py",
    });

    let report = Validator::new(
        dir.path(),
        PipelineConfig::default(),
        Arc::new(FakeBuildEngine::new()),
        py,
    )
    .run()
    .await
    .unwrap();

    let top = report
        .results()
        .iter()
        .find(|r| r.name() == "syntax (top level)")
        .unwrap();
    assert_eq!(top.outcome(), Outcome::Warn);
    assert!(top.message().contains("gunicorn.conf.py"));
    assert_eq!(outcome_of(&report, "syntax routes/"), Outcome::Pass);
    assert_eq!(report.failures(), 0);
}

#[tokio::test]
async fn real_diagnostic_still_fails_beside_a_timeout() {
    let dir = support::project();
    let py = Arc::new(StallingInterpreter {
        inner: FakeInterpreter::new().with_syntax_error("main.py"),
        stalls_on: "gunicorn.conf.py",
    });

    let err = Validator::new(
        dir.path(),
        PipelineConfig::default(),
        Arc::new(FakeBuildEngine::new()),
        py,
    )
    .run()
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::FatalConfig { ref check, .. } if check == "syntax (top level)"));
}

// ---- Scoring ----

#[tokio::test]
async fn skipped_groups_do_not_count() {
    let dir = support::project();
    support::remove(dir.path(), "requirements.txt");
    let mut config = PipelineConfig::default();
    config
        .project
        .required_files
        .retain(|f| f != "requirements.txt");

    let report = Validator::new(
        dir.path(),
        config,
        Arc::new(FakeBuildEngine::new()),
        Arc::new(FakeInterpreter::new()),
    )
    .run()
    .await
    .unwrap();

    // 48 minus one required file and the ten manifest checks
    assert_eq!(report.total(), 37);
    assert!(!report
        .results()
        .iter()
        .any(|r| r.name().starts_with("dependency")));
}
