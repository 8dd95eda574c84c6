//! Grader configuration and executor factory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::registry::ExecutorRegistry;
use crate::{javascript, php};

/// Location of one execution service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
}

/// Execution services by language. Absent languages cannot be graded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorsConfig {
    #[serde(default)]
    pub javascript: Option<ServiceConfig>,
    #[serde(default)]
    pub php: Option<ServiceConfig>,
}

/// Top-level coursegrade configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderConfig {
    #[serde(default)]
    pub executors: ExecutorsConfig,
    /// Wait bound for each remote execution call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// JSON file holding learner progress for the CLI.
    #[serde(default = "default_progress_file")]
    pub progress_file: PathBuf,
}

fn default_timeout_ms() -> u64 {
    7000
}
fn default_progress_file() -> PathBuf {
    PathBuf::from("./coursegrade-progress.json")
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            executors: ExecutorsConfig::default(),
            timeout_ms: default_timeout_ms(),
            progress_file: default_progress_file(),
        }
    }
}

impl GraderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Substituted values are not scanned again.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        result.push_str(&std::env::var(&rest[start + 2..start + end]).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

fn resolve_service(service: &mut Option<ServiceConfig>) {
    if let Some(s) = service {
        s.base_url = resolve_env_vars(&s.base_url);
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `coursegrade.toml` in the current directory
/// 2. `~/.config/coursegrade/config.toml`
///
/// Environment variable overrides: `COURSEGRADE_JS_EXECUTOR_URL`,
/// `COURSEGRADE_PHP_EXECUTOR_URL`, `COURSEGRADE_TIMEOUT_MS`.
pub fn load_config() -> Result<GraderConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<GraderConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("coursegrade.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            config
        }
        None => GraderConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<GraderConfig> {
    let mut config: GraderConfig = toml::from_str(content)?;
    resolve_service(&mut config.executors.javascript);
    resolve_service(&mut config.executors.php);
    Ok(config)
}

fn apply_env_overrides(config: &mut GraderConfig) -> Result<()> {
    if let Ok(url) = std::env::var("COURSEGRADE_JS_EXECUTOR_URL") {
        config.executors.javascript = Some(ServiceConfig { base_url: url });
    }
    if let Ok(url) = std::env::var("COURSEGRADE_PHP_EXECUTOR_URL") {
        config.executors.php = Some(ServiceConfig { base_url: url });
    }
    if let Ok(ms) = std::env::var("COURSEGRADE_TIMEOUT_MS") {
        config.timeout_ms = ms
            .trim()
            .parse()
            .with_context(|| format!("COURSEGRADE_TIMEOUT_MS is not a number: {ms}"))?;
    }
    Ok(())
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("coursegrade"))
}

/// Build the executor registry for every configured service.
pub fn build_registry(config: &GraderConfig) -> ExecutorRegistry {
    let mut registry = ExecutorRegistry::new();
    if let Some(service) = &config.executors.javascript {
        registry = registry.with(javascript::interpreter(&service.base_url));
    }
    if let Some(service) = &config.executors.php {
        registry = registry.with(php::interpreter(&service.base_url));
    }
    registry.with_timeout(config.timeout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursegrade_core::model::Language;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_COURSEGRADE_TEST_HOST", "runner.local");
        assert_eq!(resolve_env_vars("${_COURSEGRADE_TEST_HOST}"), "runner.local");
        assert_eq!(
            resolve_env_vars("https://${_COURSEGRADE_TEST_HOST}:8080"),
            "https://runner.local:8080"
        );
        assert_eq!(resolve_env_vars("${_COURSEGRADE_UNSET_VAR}x"), "x");
        assert_eq!(resolve_env_vars("${unterminated"), "${unterminated");
        std::env::remove_var("_COURSEGRADE_TEST_HOST");
    }

    #[test]
    fn substituted_values_are_kept_verbatim() {
        std::env::set_var("_COURSEGRADE_TEST_SELF", "${_COURSEGRADE_TEST_SELF}");
        assert_eq!(
            resolve_env_vars("${_COURSEGRADE_TEST_SELF}/run"),
            "${_COURSEGRADE_TEST_SELF}/run"
        );
        std::env::remove_var("_COURSEGRADE_TEST_SELF");
    }

    #[test]
    fn default_config() {
        let config = GraderConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(7));
        assert_eq!(config.progress_file, PathBuf::from("./coursegrade-progress.json"));
        assert!(config.executors.javascript.is_none());
        assert_eq!(build_registry(&config).languages().count(), 0);
    }

    #[test]
    fn parse_service_config() {
        let toml_str = r#"
timeout_ms = 2000

[executors.javascript]
base_url = "https://js.example.com"

[executors.php]
base_url = "https://php.example.com/"
"#;
        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.timeout_ms, 2000);

        let registry = build_registry(&config);
        let php = registry.get(Language::Php).unwrap();
        assert_eq!(php.endpoint(), "https://php.example.com/server.php");
        assert_eq!(php.timeout(), Duration::from_millis(2000));
        assert_eq!(
            registry.get(Language::JavaScript).unwrap().endpoint(),
            "https://js.example.com/execute"
        );
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = load_config_from(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coursegrade.toml");
        std::fs::write(
            &path,
            "progress_file = \"progress.json\"\n[executors.javascript]\nbase_url = \"http://localhost:3000\"\n",
        )
        .unwrap();

        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.progress_file, PathBuf::from("progress.json"));
        assert!(config.executors.javascript.is_some());
    }
}
