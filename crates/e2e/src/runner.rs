//! Main test runner that loads suites, runs cases and reports results

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::config::RunnerConfig;
use crate::error::{ProbeError, ProbeResult};
use crate::playwright::PlaywrightHandle;
use crate::spec::{CaseSpec, SuiteKind, SuiteSpec};

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

impl StepResult {
    pub fn failed(step_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            step_name: step_name.into(),
            duration_ms: 0,
            error: Some(error.into()),
            screenshot_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Passed,
    Failed,
    Skipped,
}

/// Result of running a single case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub suite: String,
    pub name: String,
    pub kind: SuiteKind,
    pub status: CaseStatus,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
}

impl CaseResult {
    pub fn success(&self) -> bool {
        self.status == CaseStatus::Passed
    }
}

/// Result of running all selected cases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<CaseResult>,
}

/// Which cases to run
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    /// Suite or case tag
    pub tag: Option<String>,
    /// Substring of the case name
    pub name: Option<String>,
    pub kind: Option<SuiteKind>,
}

impl CaseFilter {
    pub fn matches(&self, suite: &SuiteSpec, case: &CaseSpec) -> bool {
        if let Some(kind) = self.kind {
            if suite.kind != kind {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !suite.case_tags(case).any(|t| t == tag) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !case.name.contains(name.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Main E2E test runner
pub struct TestRunner {
    config: RunnerConfig,

    /// Cached result of the Playwright install check
    playwright_available: Option<bool>,
}

impl TestRunner {
    /// Create a new test runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a test runner with custom configuration
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config,
            playwright_available: None,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run all suites in the specs directory
    pub async fn run_all(&mut self) -> ProbeResult<TestSuiteResult> {
        self.run_filtered(&CaseFilter::default()).await
    }

    /// Run cases carrying a tag
    pub async fn run_tagged(&mut self, tag: &str) -> ProbeResult<TestSuiteResult> {
        let filter = CaseFilter {
            tag: Some(tag.to_string()),
            ..Default::default()
        };
        self.run_filtered(&filter).await
    }

    /// Run a specific case by its exact name
    pub async fn run_case(&mut self, name: &str) -> ProbeResult<CaseResult> {
        let suites = SuiteSpec::load_all(&self.config.specs_dir)?;
        let (suite, case) = suites
            .iter()
            .find_map(|s| s.cases.iter().find(|c| c.name == name).map(|c| (s, c)))
            .ok_or_else(|| ProbeError::CaseNotFound(name.to_string()))?;

        let ui_ready = self.ui_ready(suite.kind == SuiteKind::Ui);
        Ok(execute_case(&self.config, suite, case, ui_ready).await)
    }

    /// Load suites from disk and run the cases matching a filter
    pub async fn run_filtered(&mut self, filter: &CaseFilter) -> ProbeResult<TestSuiteResult> {
        let suites = SuiteSpec::load_all(&self.config.specs_dir)?;
        self.run_suites(&suites, filter).await
    }

    /// Run the matching cases of already-loaded suites
    pub async fn run_suites(
        &mut self,
        suites: &[SuiteSpec],
        filter: &CaseFilter,
    ) -> ProbeResult<TestSuiteResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        let selected: Vec<(&SuiteSpec, &CaseSpec)> = suites
            .iter()
            .flat_map(|s| s.cases.iter().map(move |c| (s, c)))
            .filter(|(s, c)| filter.matches(s, c))
            .collect();

        for (suite, _) in &selected {
            self.config.target_url(&suite.target)?;
        }

        let needs_ui = selected.iter().any(|(s, _)| s.kind == SuiteKind::Ui);
        let ui_ready = self.ui_ready(needs_ui);

        info!("Running {} case(s)...", selected.len());

        let config = &self.config;
        let workers = config.workers.max(1);
        let results: Vec<CaseResult> = stream::iter(selected)
            .map(|(suite, case)| execute_case(config, suite, case, ui_ready))
            .buffered(workers)
            .collect()
            .await;

        let passed = results.iter().filter(|r| r.status == CaseStatus::Passed).count();
        let failed = results.iter().filter(|r| r.status == CaseStatus::Failed).count();
        let skipped = results.iter().filter(|r| r.status == CaseStatus::Skipped).count();
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        Ok(TestSuiteResult {
            started_at,
            total: results.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        })
    }

    /// Whether UI cases can run. Only probes for Playwright when needed.
    fn ui_ready(&mut self, needed: bool) -> bool {
        if !needed {
            return false;
        }
        let project_dir = &self.config.playwright.project_dir;
        *self.playwright_available.get_or_insert_with(|| {
            let found = PlaywrightHandle::is_installed(project_dir);
            if !found {
                warn!("Playwright is not installed; UI cases cannot run");
            }
            found
        })
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> ProbeResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one case in isolation. Never fails; errors land in the result.
async fn execute_case(
    config: &RunnerConfig,
    suite: &SuiteSpec,
    case: &CaseSpec,
    ui_ready: bool,
) -> CaseResult {
    let start = Instant::now();
    debug!("Running case: {} / {}", suite.suite, case.name);

    let mut result = CaseResult {
        suite: suite.suite.clone(),
        name: case.name.clone(),
        kind: suite.kind,
        status: CaseStatus::Failed,
        duration_ms: 0,
        steps: Vec::new(),
        error: None,
    };

    if suite.kind == SuiteKind::Ui && !ui_ready && config.skip_ui_without_playwright {
        info!("- {} (skipped: Playwright not installed)", case.name);
        result.status = CaseStatus::Skipped;
        return result;
    }

    match run_steps(config, suite, case, ui_ready).await {
        Ok(steps) => {
            result.error = steps.iter().find(|s| !s.success).map(|s| {
                format!("{}: {}", s.step_name, s.error.as_deref().unwrap_or("failed"))
            });
            if result.error.is_none() {
                result.status = CaseStatus::Passed;
            }
            result.steps = steps;
        }
        Err(e) => result.error = Some(e.to_string()),
    }

    result.duration_ms = start.elapsed().as_millis() as u64;

    if result.success() {
        info!("✓ {} ({} ms)", result.name, result.duration_ms);
    } else {
        error!(
            "✗ {} - {}",
            result.name,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }

    result
}

async fn run_steps(
    config: &RunnerConfig,
    suite: &SuiteSpec,
    case: &CaseSpec,
    ui_ready: bool,
) -> ProbeResult<Vec<StepResult>> {
    let base_url = config.target_url(&suite.target)?;

    match suite.kind {
        SuiteKind::Api => {
            let client = ApiClient::new(base_url, config.request_timeout)?;
            Ok(client.run_case(case).await)
        }
        SuiteKind::Ui => {
            if !ui_ready {
                return Err(ProbeError::PlaywrightNotFound);
            }
            let mut pw_config = config.playwright.clone();
            pw_config.base_url = base_url.to_string();
            pw_config.viewport = suite.viewport;
            pw_config.timeout = config.case_timeout;

            let playwright = PlaywrightHandle::new(pw_config)?;
            playwright.run_case(case).await
        }
    }
}
