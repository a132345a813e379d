//! Command-line flags, config file (`openapi-assist.toml`) and their
//! resolution into one [`Config`].
//!
//! Precedence, lowest first: built-in defaults, config file, environment
//! variables, command-line flags.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::audit::DetailMarker;
use crate::error::{AssistError, Result};
use crate::llm::{DEFAULT_LLM_URL, DEFAULT_MODEL};
use crate::session::DEFAULT_LOGIN_HINTS;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_SPEC_PATH: &str = "/openapi.json";
pub const DEFAULT_METHOD: &str = "POST";
/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "openapi-assist.toml";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;

const METHODS: [&str; 8] = [
    "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "TRACE",
];

/// Call an OpenAPI endpoint interactively and have a language model explain
/// the response.
#[derive(Debug, Parser)]
#[command(name = "openapi-assist", version, about, long_about = None)]
pub struct Cli {
    /// Endpoint path as written in the OpenAPI document (e.g. /api/login)
    pub path: Option<String>,

    /// HTTP method of the endpoint
    #[arg(short = 'X', long)]
    pub method: Option<String>,

    /// Base URL of the target API
    #[arg(long, env = "OPENAPI_ASSIST_BASE_URL")]
    pub base_url: Option<String>,

    /// Path of the OpenAPI JSON document under the base URL
    #[arg(long)]
    pub spec_path: Option<String>,

    /// Follow-up endpoint to call afterwards, e.g. "GET /jobs" (repeatable)
    #[arg(long = "then", value_name = "METHOD /PATH")]
    pub then: Vec<Target>,

    /// Ask the language model to introduce the inputs before prompting
    #[arg(long)]
    pub guided: bool,

    /// Skip the language model explanation of responses
    #[arg(long)]
    pub no_explain: bool,

    /// How missing-field indications are extracted from responses
    #[arg(long, value_enum)]
    pub missing_fields: Option<MissingFieldStrategy>,

    /// HTTP timeout in seconds for the target API
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Base URL of the Ollama-compatible language model backend
    #[arg(long, env = "OPENAPI_ASSIST_LLM_URL")]
    pub llm_url: Option<String>,

    /// Language model name
    #[arg(long, env = "OPENAPI_ASSIST_MODEL")]
    pub model: Option<String>,

    /// Config file (defaults to ./openapi-assist.toml when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

/// How the response auditor names missing fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MissingFieldStrategy {
    /// Read names from the configured error-list marker
    #[default]
    Marker,
    /// Ask the language model, falling back to the marker
    Llm,
}

/// One endpoint to call: `METHOD /path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub method: String,
    pub path: String,
}

impl Target {
    pub fn new(method: &str, path: impl Into<String>) -> Result<Self> {
        let method = method.to_uppercase();
        if !METHODS.contains(&method.as_str()) {
            return Err(AssistError::Config(format!("unknown HTTP method: {method}")));
        }
        let path = path.into();
        if !path.starts_with('/') {
            return Err(AssistError::Config(format!(
                "endpoint path must start with '/': {path}"
            )));
        }
        Ok(Self { method, path })
    }
}

impl FromStr for Target {
    type Err = AssistError;

    /// `"GET /jobs"`, or a bare `"/jobs"` meaning GET.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(path), None, None) => Target::new("GET", path),
            (Some(method), Some(path), None) => Target::new(method, path),
            _ => Err(AssistError::Config(format!(
                "expected \"METHOD /path\", got: {s:?}"
            ))),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// `[llm]` table of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmFileConfig {
    pub url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// `[missing_fields]` table: strategy plus the marker keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "MissingFieldsFile")]
pub struct MissingFieldsConfig {
    pub strategy: MissingFieldStrategy,
    pub marker: DetailMarker,
}

/// `[missing_fields]` as written. Marker keys sit next to `strategy`, and
/// misspelled keys are rejected like everywhere else in the file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MissingFieldsFile {
    strategy: MissingFieldStrategy,
    list_key: Option<String>,
    kind_key: Option<String>,
    kind_marker: Option<String>,
    location_key: Option<String>,
}

impl From<MissingFieldsFile> for MissingFieldsConfig {
    fn from(file: MissingFieldsFile) -> Self {
        let defaults = DetailMarker::default();
        Self {
            strategy: file.strategy,
            marker: DetailMarker {
                list_key: file.list_key.unwrap_or(defaults.list_key),
                kind_key: file.kind_key.unwrap_or(defaults.kind_key),
                kind_marker: file.kind_marker.unwrap_or(defaults.kind_marker),
                location_key: file.location_key.unwrap_or(defaults.location_key),
            },
        }
    }
}

/// Contents of `openapi-assist.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub spec_path: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    /// Follow-up endpoints, `"METHOD /path"` each
    pub then: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub guided: Option<bool>,
    pub explain: Option<bool>,
    pub login_hints: Option<Vec<String>>,
    pub llm: LlmFileConfig,
    pub missing_fields: MissingFieldsConfig,
}

/// Language model backend settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub url: String,
    pub model: String,
    pub timeout: Duration,
}

/// Fully resolved run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub spec_path: String,
    pub target: Target,
    pub follow_ups: Vec<Target>,
    /// `None` keeps the HTTP client default
    pub timeout: Option<Duration>,
    pub guided: bool,
    pub explain: bool,
    pub login_hints: Vec<String>,
    pub llm: LlmConfig,
    pub missing_fields: MissingFieldsConfig,
}

impl Config {
    /// Read the config file (explicit or discovered) and merge it with `cli`.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => load_file_config(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    load_file_config(default)?
                } else {
                    FileConfig::default()
                }
            }
        };
        Self::resolve(cli, file)
    }

    /// Merge `cli` over `file` over built-in defaults.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self> {
        let base_url = cli
            .base_url
            .clone()
            .or(file.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        check_url("base URL", &base_url)?;

        let path = cli
            .path
            .clone()
            .or(file.path)
            .ok_or_else(|| AssistError::Config("no endpoint path given".to_string()))?;
        let method = cli
            .method
            .clone()
            .or(file.method)
            .unwrap_or_else(|| DEFAULT_METHOD.to_string());
        let target = Target::new(&method, path)?;

        let follow_ups = if cli.then.is_empty() {
            file.then
                .iter()
                .map(|t| t.parse())
                .collect::<Result<Vec<Target>>>()?
        } else {
            cli.then.clone()
        };

        let llm_url = cli
            .llm_url
            .clone()
            .or(file.llm.url)
            .unwrap_or_else(|| DEFAULT_LLM_URL.to_string());
        check_url("LLM URL", &llm_url)?;

        let mut missing_fields = file.missing_fields;
        if let Some(strategy) = cli.missing_fields {
            missing_fields.strategy = strategy;
        }

        Ok(Self {
            base_url,
            spec_path: cli
                .spec_path
                .clone()
                .or(file.spec_path)
                .unwrap_or_else(|| DEFAULT_SPEC_PATH.to_string()),
            target,
            follow_ups,
            timeout: cli.timeout.or(file.timeout_secs).map(Duration::from_secs),
            guided: cli.guided || file.guided.unwrap_or(false),
            explain: !cli.no_explain && file.explain.unwrap_or(true),
            login_hints: file
                .login_hints
                .unwrap_or_else(|| DEFAULT_LOGIN_HINTS.iter().map(|h| h.to_string()).collect()),
            llm: LlmConfig {
                url: llm_url,
                model: cli
                    .model
                    .clone()
                    .or(file.llm.model)
                    .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                timeout: Duration::from_secs(
                    file.llm.timeout_secs.unwrap_or(DEFAULT_LLM_TIMEOUT_SECS),
                ),
            },
            missing_fields,
        })
    }

    /// HTTP client for the target API.
    pub fn http_client(&self) -> Result<Client> {
        let mut builder = Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| AssistError::Config(format!("cannot build HTTP client: {e}")))
    }

    /// HTTP client for the language model backend, which answers slowly.
    pub fn llm_http_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.llm.timeout)
            .build()
            .map_err(|e| AssistError::Config(format!("cannot build LLM HTTP client: {e}")))
    }
}

fn check_url(what: &str, url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(AssistError::Config(format!(
            "{what} must start with http:// or https://: {url}"
        )))
    }
}

/// Load and parse a TOML config file.
pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let contents = std::fs::read_to_string(path).map_err(|source| AssistError::ConfigRead {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| AssistError::ConfigParse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["openapi-assist"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn resolve_uses_defaults() {
        let config = Config::resolve(&cli(&["/api/login"]), FileConfig::default()).unwrap();
        assert_eq!(config.target, Target::new("POST", "/api/login").unwrap());
        assert_eq!(config.spec_path, DEFAULT_SPEC_PATH);
        assert!(config.follow_ups.is_empty());
        assert!(config.timeout.is_none());
        assert!(config.explain);
        assert!(!config.guided);
        assert_eq!(config.login_hints, DEFAULT_LOGIN_HINTS.to_vec());
        assert_eq!(config.llm.timeout, Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS));
        assert_eq!(config.missing_fields, MissingFieldsConfig::default());
    }

    #[test]
    fn resolve_requires_a_path() {
        let err = Config::resolve(&cli(&[]), FileConfig::default()).unwrap_err();
        assert!(matches!(err, AssistError::Config(_)), "got: {err:?}");
    }

    #[test]
    fn resolve_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openapi-assist.toml");
        std::fs::write(
            &path,
            r#"
base_url = "http://file:9000"
path = "/from-file"
method = "get"
then = ["GET /jobs", "/me"]
timeout_secs = 5
guided = true
login_hints = ["connect"]

[llm]
model = "mistral"
timeout_secs = 30

[missing_fields]
strategy = "llm"
list_key = "errors"
"#,
        )
        .unwrap();
        let file = load_file_config(&path).unwrap();

        let config = Config::resolve(
            &cli(&[
                "/orders",
                "--base-url",
                "http://flag:1",
                "--no-explain",
                "--missing-fields",
                "marker",
            ]),
            file,
        )
        .unwrap();

        assert_eq!(config.base_url, "http://flag:1");
        // path from flag, method from file
        assert_eq!(config.target, Target::new("GET", "/orders").unwrap());
        assert_eq!(
            config.follow_ups,
            vec![
                Target::new("GET", "/jobs").unwrap(),
                Target::new("GET", "/me").unwrap()
            ]
        );
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert!(config.guided);
        assert!(!config.explain);
        assert_eq!(config.login_hints, vec!["connect".to_string()]);
        assert_eq!(config.llm.model, "mistral");
        assert_eq!(config.llm.timeout, Duration::from_secs(30));
        assert_eq!(config.missing_fields.strategy, MissingFieldStrategy::Marker);
        assert_eq!(config.missing_fields.marker.list_key, "errors");
        assert_eq!(config.missing_fields.marker.kind_key, "type");
    }

    #[test]
    fn resolve_rejects_bad_urls_and_methods() {
        let err = Config::resolve(&cli(&["/x", "--base-url", "localhost:8000"]), FileConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("base URL"), "got: {err}");

        let err = Config::resolve(&cli(&["/x", "-X", "FETCH"]), FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("unknown HTTP method"), "got: {err}");

        let err = Config::resolve(&cli(&["x"]), FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("must start with '/'"), "got: {err}");
    }

    #[test]
    fn cli_parses_follow_up_targets() {
        let parsed = cli(&["/login", "--then", "get /jobs", "--then", "DELETE /session"]);
        assert_eq!(
            parsed.then,
            vec![
                Target::new("GET", "/jobs").unwrap(),
                Target::new("DELETE", "/session").unwrap()
            ]
        );
        assert!(Cli::try_parse_from(["openapi-assist", "/login", "--then", "GET /a /b"]).is_err());
    }

    #[test]
    fn target_display_round_trips_label() {
        let target: Target = "patch /items/{id}".parse().unwrap();
        assert_eq!(target.to_string(), "PATCH /items/{id}");
    }

    #[test]
    fn load_file_config_reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();

        let err = load_file_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, AssistError::ConfigRead { .. }), "got: {err:?}");

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "base_url = [").unwrap();
        let err = load_file_config(&bad).unwrap_err();
        assert!(matches!(err, AssistError::ConfigParse { .. }), "got: {err:?}");

        let unknown = dir.path().join("unknown.toml");
        std::fs::write(&unknown, "colour = \"blue\"").unwrap();
        assert!(load_file_config(&unknown).is_err());
        let misspelled = dir.path().join("misspelled.toml");
        std::fs::write(&misspelled, "[missing_fields]\nkind_mark = \"required\"\n").unwrap();
        let err = load_file_config(&misspelled).unwrap_err();
        assert!(matches!(err, AssistError::ConfigParse { .. }), "got: {err:?}");
        assert!(err.to_string().contains("misspelled.toml"), "got: {err}");
    }

    #[test]
    fn http_clients_build() {
        let mut config = Config::resolve(&cli(&["/x"]), FileConfig::default()).unwrap();
        config.timeout = Some(Duration::from_secs(1));
        assert!(config.http_client().is_ok());
        assert!(config.llm_http_client().is_ok());
    }
}
