//! Build configuration and engine argument assembly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Build mode, usually taken from `BUILD_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Development,
    Production,
    Test,
}

impl BuildMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Development => "development",
            BuildMode::Production => "production",
            BuildMode::Test => "test",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(BuildMode::Development),
            "production" | "prod" => Ok(BuildMode::Production),
            "test" => Ok(BuildMode::Test),
            other => Err(format!(
                "unknown build mode '{}' (expected development, production or test)",
                other
            )),
        }
    }
}

/// Immutable build request.
///
/// Production always builds without the layer cache. Test mode targets the
/// `test` stage unless a target is given explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    tag: String,
    context: PathBuf,
    mode: BuildMode,
    target: Option<String>,
    platform: Option<String>,
    cache_enabled: bool,
}

impl BuildConfig {
    pub fn builder(tag: impl Into<String>, context: impl Into<PathBuf>) -> BuildConfigBuilder {
        BuildConfigBuilder {
            tag: tag.into(),
            context: context.into(),
            mode: BuildMode::default(),
            target: None,
            platform: None,
            no_cache: false,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn context(&self) -> &Path {
        &self.context
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }
}

/// Collects CLI and environment inputs for a [`BuildConfig`].
#[derive(Debug, Clone)]
pub struct BuildConfigBuilder {
    tag: String,
    context: PathBuf,
    mode: BuildMode,
    target: Option<String>,
    platform: Option<String>,
    no_cache: bool,
}

impl BuildConfigBuilder {
    pub fn mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn target(mut self, target: Option<String>) -> Self {
        self.target = target.filter(|t| !t.is_empty());
        self
    }

    pub fn platform(mut self, platform: Option<String>) -> Self {
        self.platform = platform.filter(|p| !p.is_empty());
        self
    }

    pub fn no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    pub fn build(self) -> BuildConfig {
        let target = match (self.target, self.mode) {
            (Some(t), _) => Some(t),
            (None, BuildMode::Test) => Some("test".to_string()),
            (None, _) => None,
        };
        BuildConfig {
            cache_enabled: !self.no_cache && self.mode != BuildMode::Production,
            tag: self.tag.trim().to_string(),
            context: self.context,
            mode: self.mode,
            target,
            platform: self.platform,
        }
    }
}

/// Facts discovered at run time that shape the engine arguments.
#[derive(Debug, Clone)]
pub struct ArgsContext<'a> {
    pub buildx: bool,
    pub iidfile: &'a Path,
    /// Set when the recipe is not the engine's default file name.
    pub recipe: Option<&'a Path>,
}

/// Engine arguments for `config`. The context path is always last.
pub fn assemble_args(config: &BuildConfig, ctx: &ArgsContext<'_>) -> Vec<String> {
    let mut args = vec![
        "-t".to_string(),
        config.tag.clone(),
        "--progress=plain".to_string(),
        "--iidfile".to_string(),
        ctx.iidfile.to_string_lossy().to_string(),
    ];
    if let Some(recipe) = ctx.recipe {
        args.push("--file".to_string());
        args.push(recipe.to_string_lossy().to_string());
    }
    if ctx.buildx {
        args.push("--build-arg".to_string());
        args.push("BUILDKIT_INLINE_CACHE=1".to_string());
    }
    if !config.cache_enabled {
        args.push("--no-cache".to_string());
    }
    if let Some(target) = &config.target {
        args.push("--target".to_string());
        args.push(target.clone());
    }
    if let Some(platform) = &config.platform {
        args.push("--platform".to_string());
        args.push(platform.clone());
    }
    args.push(config.context.to_string_lossy().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(iid: &Path) -> ArgsContext<'_> {
        ArgsContext {
            buildx: true,
            iidfile: iid,
            recipe: None,
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("production".parse::<BuildMode>().unwrap(), BuildMode::Production);
        assert_eq!("DEV".parse::<BuildMode>().unwrap(), BuildMode::Development);
        assert!("staging".parse::<BuildMode>().is_err());
    }

    #[test]
    fn test_production_forces_no_cache() {
        let config = BuildConfig::builder("demo", ".")
            .mode(BuildMode::Production)
            .no_cache(false)
            .build();
        assert!(!config.cache_enabled());
        let args = assemble_args(&config, &ctx(Path::new("/tmp/iid")));
        assert!(args.contains(&"--no-cache".to_string()));
    }

    #[test]
    fn test_development_keeps_cache() {
        let config = BuildConfig::builder("demo", ".").build();
        assert!(config.cache_enabled());
        let args = assemble_args(&config, &ctx(Path::new("/tmp/iid")));
        assert!(!args.contains(&"--no-cache".to_string()));
    }

    #[test]
    fn test_test_mode_defaults_target() {
        let config = BuildConfig::builder("demo", ".").mode(BuildMode::Test).build();
        assert_eq!(config.target(), Some("test"));

        let config = BuildConfig::builder("demo", ".")
            .mode(BuildMode::Test)
            .target(Some("integration".to_string()))
            .build();
        assert_eq!(config.target(), Some("integration"));
    }

    #[test]
    fn test_args_order() {
        let config = BuildConfig::builder("chatbot:latest", "/src/app")
            .target(Some("production".to_string()))
            .platform(Some("linux/arm64".to_string()))
            .build();
        let args = assemble_args(&config, &ctx(Path::new("/tmp/iid")));
        assert_eq!(
            args,
            vec![
                "-t",
                "chatbot:latest",
                "--progress=plain",
                "--iidfile",
                "/tmp/iid",
                "--build-arg",
                "BUILDKIT_INLINE_CACHE=1",
                "--target",
                "production",
                "--platform",
                "linux/arm64",
                "/src/app",
            ]
        );
    }

    #[test]
    fn test_no_inline_cache_without_buildx() {
        let config = BuildConfig::builder("demo", ".").build();
        let args = assemble_args(
            &config,
            &ArgsContext {
                buildx: false,
                iidfile: Path::new("/tmp/iid"),
                recipe: None,
            },
        );
        assert!(!args.iter().any(|a| a.contains("BUILDKIT_INLINE_CACHE")));
    }
}
