//! Runner configuration
//!
//! Defaults cover the two hosted services. A TOML file may override any
//! subset of fields; CLI flags are applied on top by the harness.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ProbeError, ProbeResult};
use crate::playwright::PlaywrightConfig;

pub const THE_INTERNET_URL: &str = "https://the-internet.herokuapp.com";
pub const TOOL_RENTAL_URL: &str = "https://simple-tool-rental-api.glitch.me";

/// Configuration for the test runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Target name -> base URL
    pub targets: BTreeMap<String, String>,

    /// Directory holding the YAML suites
    pub specs_dir: PathBuf,

    /// Output directory for results
    pub output_dir: PathBuf,

    /// Cases in flight at once
    pub workers: usize,

    /// Per-request timeout for API cases
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Whole-case timeout for browser cases
    #[serde(with = "duration_secs")]
    pub case_timeout: Duration,

    /// Report UI cases as skipped when Playwright is missing
    pub skip_ui_without_playwright: bool,

    pub playwright: PlaywrightConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let mut targets = BTreeMap::new();
        targets.insert("the-internet".to_string(), THE_INTERNET_URL.to_string());
        targets.insert("tool-rental".to_string(), TOOL_RENTAL_URL.to_string());

        Self {
            targets,
            specs_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/specs")),
            output_dir: PathBuf::from("test-results"),
            workers: 1,
            request_timeout: Duration::from_secs(30),
            case_timeout: Duration::from_secs(30),
            skip_ui_without_playwright: false,
            playwright: PlaywrightConfig::default(),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from a TOML file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> ProbeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply a `NAME=URL` override
    pub fn set_target(&mut self, assignment: &str) -> ProbeResult<()> {
        let (name, url) = assignment.split_once('=').ok_or_else(|| {
            ProbeError::SpecParse(format!("expected NAME=URL, got '{}'", assignment))
        })?;
        Url::parse(url)?;
        self.targets.insert(name.trim().to_string(), url.trim().to_string());
        Ok(())
    }

    /// Base URL for a named target
    pub fn target_url(&self, name: &str) -> ProbeResult<&str> {
        self.targets
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ProbeError::UnknownTarget(name.to_string()))
    }
}

/// Resolve a path against a base URL. Absolute URLs pass through.
///
/// The base URL's own path is kept as a prefix.
pub fn join_url(base: &str, path: &str) -> ProbeResult<Url> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Ok(Url::parse(path)?);
    }

    let base = base.trim_end_matches('/');
    let url = if path.is_empty() {
        Url::parse(base)?
    } else if path.starts_with('/') {
        Url::parse(&format!("{}{}", base, path))?
    } else {
        Url::parse(&format!("{}/{}", base, path))?
    };
    Ok(url)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
