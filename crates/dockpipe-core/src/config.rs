//! Project configuration (`dockpipe.toml`).
//!
//! Every field has a default matching the conventions of the served
//! application (Flask under gunicorn on 8080, PostgreSQL on 5432), so a
//! project without a config file still validates, builds and runs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::orchestrator::ServiceSpec;

/// Default config file name, looked up in the project directory.
pub const CONFIG_FILE: &str = "dockpipe.toml";

const GIB: u64 = 1024 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Layout of the project tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    pub required_files: Vec<String>,
    pub required_dirs: Vec<String>,
    pub optional_files: Vec<String>,
    /// Extension of source files checked for syntax, without the dot.
    pub source_extension: String,
    pub dependency_manifest: String,
    pub recipe_file: String,
    pub ignore_file: String,
    /// File the image runs; checked for unsafe permissions.
    pub entrypoint_file: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            required_files: strings(&[
                "Dockerfile",
                "requirements.txt",
                "main.py",
                "gunicorn.conf.py",
            ]),
            required_dirs: strings(&["config", "services", "routes", "utils"]),
            optional_files: strings(&[
                ".dockerignore",
                ".env.example",
                "docker-compose.yml",
                "README.md",
            ]),
            source_extension: "py".to_string(),
            dependency_manifest: "requirements.txt".to_string(),
            recipe_file: "Dockerfile".to_string(),
            ignore_file: ".dockerignore".to_string(),
            entrypoint_file: "main.py".to_string(),
        }
    }
}

/// Thresholds and manifests used by the validator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Required dependencies. `a|b` accepts either name.
    pub critical_dependencies: Vec<String>,
    pub min_dependency_count: usize,
    /// Required recipe instructions. `CMD|ENTRYPOINT` accepts either.
    pub required_instructions: Vec<String>,
    pub recommended_ignore_patterns: Vec<String>,
    pub min_engine_version: String,
    pub min_free_disk_bytes: u64,
    pub max_context_bytes: u64,
    pub large_file_bytes: u64,
    /// Gitignore-style patterns for files that look like secrets.
    pub secret_file_patterns: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            critical_dependencies: strings(&[
                "flask",
                "openai",
                "langchain",
                "psycopg2|psycopg2-binary",
                "twilio",
                "gunicorn",
                "python-dotenv",
            ]),
            min_dependency_count: 10,
            required_instructions: strings(&["WORKDIR", "COPY", "EXPOSE", "CMD|ENTRYPOINT"]),
            recommended_ignore_patterns: strings(&[".git", "__pycache__", "*.pyc", ".env", "venv"]),
            min_engine_version: "20.10".to_string(),
            min_free_disk_bytes: 2 * GIB,
            max_context_bytes: 512 * MIB,
            large_file_bytes: 10 * MIB,
            secret_file_patterns: strings(&[
                ".env",
                ".env.*",
                "!.env.example",
                "!.env.template",
                "*.pem",
                "*.key",
                "*.p12",
                "*.pfx",
                "id_rsa",
                "id_ed25519",
                "credentials.json",
                "service-account*.json",
            ]),
        }
    }
}

/// Image build settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildSettings {
    pub default_tag: String,
    pub smoke_command: Vec<String>,
    /// Capped at 30 seconds regardless of the configured value.
    pub smoke_timeout_secs: u64,
    pub min_free_memory_bytes: u64,
    pub cache_warn_bytes: u64,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            default_tag: "chatbot:latest".to_string(),
            smoke_command: strings(&["python", "--version"]),
            smoke_timeout_secs: 30,
            min_free_memory_bytes: 2 * GIB,
            cache_warn_bytes: GIB,
        }
    }
}

/// Compose stack settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StackConfig {
    pub compose_file: String,
    pub env_file: String,
    /// Copied to `env_file` by `setup` when the latter is missing.
    pub env_template: String,
    pub services: Vec<ServiceSpec>,
    /// Service that must be running before tests execute.
    pub primary_service: String,
    pub test_runner_service: String,
    /// Reference filter for `cleanup` image removal.
    pub image_filter: String,
    pub ports: Vec<u16>,
    pub settle_secs: u64,
    pub health_url: Option<String>,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            compose_file: "docker-compose.test.yml".to_string(),
            env_file: ".env.test".to_string(),
            env_template: ".env.example".to_string(),
            services: vec![ServiceSpec::critical("app"), ServiceSpec::critical("postgres")],
            primary_service: "app".to_string(),
            test_runner_service: "test-runner".to_string(),
            image_filter: "chatbot*".to_string(),
            ports: vec![8080, 5432],
            settle_secs: 5,
            health_url: Some("http://localhost:8080/health".to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

/// Root of `dockpipe.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub project: ProjectConfig,
    pub validation: ValidationConfig,
    pub build: BuildSettings,
    pub stack: StackConfig,
}

impl PipelineConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load configuration for `project_dir`.
    ///
    /// An explicit path must exist. Without one, `dockpipe.toml` in the
    /// project directory is used when present, else the defaults.
    pub fn load(project_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => {
                if !p.is_file() {
                    return Err(PipelineError::config(
                        "config file",
                        format!("{} does not exist", p.display()),
                        "pass an existing file to --config or unset DOCKPIPE_CONFIG",
                    ));
                }
                p.to_path_buf()
            }
            None => {
                let candidate = project_dir.join(CONFIG_FILE);
                if !candidate.is_file() {
                    tracing::debug!(dir = %project_dir.display(), "No config file, using defaults");
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let text = std::fs::read_to_string(&path).map_err(|e| {
            PipelineError::config(
                "config file",
                format!("cannot read {}: {}", path.display(), e),
                "check the file permissions",
            )
        })?;
        let config = Self::from_toml(&text).map_err(|e| {
            PipelineError::config(
                "config file",
                format!("{} is not valid: {}", path.display(), e.message()),
                format!("fix {} or remove it to use the defaults", path.display()),
            )
        })?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Smoke timeout, capped at 30 seconds.
    pub fn smoke_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.build.smoke_timeout_secs.clamp(1, 30))
    }

    pub fn compose_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.stack.compose_file)
    }

    pub fn env_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.stack.env_file)
    }
}
