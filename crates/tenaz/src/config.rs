//! Run configuration.
//!
//! A YAML file is flattened into dotted keys and read through typed
//! accessors:
//!
//! ```yaml
//! url: https://demo.opencart.com/
//! wait:
//!   timeout_ms: 10000
//!   poll_interval_ms: 250
//! browser:
//!   headless: true
//! report:
//!   path: reports/TestReport.html
//!   system_info:
//!     Browser: chrome
//! ```
//!
//! Everything is validated in [`HarnessConfig::from_source`]. A malformed
//! value is an error at load time, never a silent default.

use crate::artifact::{ArtifactCapture, DEFAULT_ARTIFACT_DIR};
use crate::logging::LogFormat;
use crate::reporter::{ReportSettings, DEFAULT_REPORT_PATH, DEFAULT_REPORT_TITLE};
use crate::result::{TenazError, TenazResult};
use crate::wait::{WaitPolicy, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS};
use serde_yaml_ng::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const SYSTEM_INFO_PREFIX: &str = "report.system_info.";

// ============================================================================
// ConfigSource
// ============================================================================

/// Flat key → scalar lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSource {
    values: BTreeMap<String, String>,
}

impl ConfigSource {
    /// Empty source; every accessor falls back to its default
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse YAML; nested mappings become dotted keys
    pub fn from_yaml_str(yaml: &str) -> TenazResult<Self> {
        let root: Value = serde_yaml_ng::from_str(yaml)?;
        let mut values = BTreeMap::new();
        match root {
            Value::Null => {}
            Value::Mapping(_) => flatten("", &root, &mut values)?,
            _ => {
                return Err(TenazError::config(
                    "<root>",
                    "configuration must be a mapping",
                ))
            }
        }
        Ok(Self { values })
    }

    /// Read and parse a YAML file
    pub fn load(path: impl AsRef<Path>) -> TenazResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading configuration");
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Set or override a key
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Raw value
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Raw value, or an error naming the missing key
    pub fn require_str(&self, key: &str) -> TenazResult<&str> {
        self.get_str(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| TenazError::config(key, "required key is missing"))
    }

    /// `true`/`false` (any case), `default` when absent
    pub fn get_bool(&self, key: &str, default: bool) -> TenazResult<bool> {
        match self.get_str(key) {
            None => Ok(default),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(TenazError::config(key, format!("expected true or false, got '{raw}'"))),
            },
        }
    }

    /// Unsigned integer, `default` when absent
    pub fn get_u64(&self, key: &str, default: u64) -> TenazResult<u64> {
        match self.get_str(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| {
                TenazError::config(key, format!("expected a non-negative integer, got '{raw}'"))
            }),
        }
    }

    /// Keys under `prefix`, with the prefix stripped
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.values
            .iter()
            .filter_map(move |(k, v)| k.strip_prefix(prefix).map(|rest| (rest, v.as_str())))
    }

    /// Number of keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no keys are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) -> TenazResult<()> {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                let key = scalar_text(key).ok_or_else(|| {
                    TenazError::config(prefix, "mapping keys must be scalars")
                })?;
                let full = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&full, child, out)?;
            }
        }
        Value::Null => {}
        Value::Sequence(_) => {
            return Err(TenazError::config(prefix, "lists are not supported"));
        }
        Value::Tagged(tagged) => flatten(prefix, &tagged.value, out)?,
        scalar => {
            if let Some(text) = scalar_text(scalar) {
                out.insert(prefix.to_string(), text);
            }
        }
    }
    Ok(())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ============================================================================
// HarnessConfig
// ============================================================================

/// Validated settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Run browsers without a window
    pub headless: bool,
    /// Screenshot and attachment directory
    pub artifact_dir: PathBuf,
    /// Combined report path
    pub report_path: PathBuf,
    /// Report heading
    pub report_title: String,
    /// Optional JUnit XML path
    pub junit_path: Option<PathBuf>,
    /// Environment rows for the report header
    pub system_info: BTreeMap<String, String>,
    /// Diagnostic output format
    pub log_format: LogFormat,
    wait_policy: WaitPolicy,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            headless: false,
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_DIR),
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            report_title: DEFAULT_REPORT_TITLE.to_string(),
            junit_path: None,
            system_info: BTreeMap::new(),
            log_format: LogFormat::default(),
            wait_policy: WaitPolicy::default(),
        }
    }
}

impl HarnessConfig {
    /// Build and validate from a source
    pub fn from_source(source: &ConfigSource) -> TenazResult<Self> {
        let timeout_ms = source.get_u64("wait.timeout_ms", DEFAULT_WAIT_TIMEOUT_MS)?;
        let poll_ms = source.get_u64("wait.poll_interval_ms", DEFAULT_POLL_INTERVAL_MS)?;
        let wait_policy = WaitPolicy::from_millis(timeout_ms, poll_ms)?;

        let log_format = source
            .get_str("logging.format")
            .map_or(Ok(LogFormat::default()), str::parse)?;

        let system_info = source
            .with_prefix(SYSTEM_INFO_PREFIX)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Ok(Self {
            headless: source.get_bool("browser.headless", false)?,
            artifact_dir: path_or(source, "artifacts.dir", DEFAULT_ARTIFACT_DIR)?,
            report_path: path_or(source, "report.path", DEFAULT_REPORT_PATH)?,
            report_title: source
                .get_str("report.title")
                .unwrap_or(DEFAULT_REPORT_TITLE)
                .to_string(),
            junit_path: source.get_str("report.junit_path").map(PathBuf::from),
            system_info,
            log_format,
            wait_policy,
        })
    }

    /// Load and validate a YAML file
    pub fn load(path: impl AsRef<Path>) -> TenazResult<Self> {
        Self::from_source(&ConfigSource::load(path)?)
    }

    /// Default wait policy for the run
    #[must_use]
    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait_policy.clone()
    }

    /// Default wait timeout
    #[must_use]
    pub const fn wait_timeout(&self) -> Duration {
        self.wait_policy.timeout()
    }

    /// Default poll interval
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.wait_policy.poll_interval()
    }

    /// Report settings; the host OS is added unless configured
    #[must_use]
    pub fn report_settings(&self) -> ReportSettings {
        let mut settings = ReportSettings::new(&self.report_path).with_title(&self.report_title);
        settings.system_info.clone_from(&self.system_info);
        settings
            .system_info
            .entry("OS".to_string())
            .or_insert_with(|| std::env::consts::OS.to_string());
        if let Some(junit) = &self.junit_path {
            settings = settings.with_junit(junit);
        }
        settings
    }

    /// Artifact writer for the configured directory
    #[must_use]
    pub fn artifact_capture(&self) -> ArtifactCapture {
        ArtifactCapture::new(&self.artifact_dir)
    }
}

fn path_or(source: &ConfigSource, key: &str, default: &str) -> TenazResult<PathBuf> {
    match source.get_str(key) {
        None => Ok(PathBuf::from(default)),
        Some(raw) if raw.trim().is_empty() => Err(TenazError::config(key, "path is empty")),
        Some(raw) => Ok(PathBuf::from(raw)),
    }
}
