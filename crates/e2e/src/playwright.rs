//! Playwright browser automation
//!
//! A UI case is rendered into one Node.js script so the page keeps its state
//! from step to step. The script reports progress as JSON lines on stdout.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};

use crate::config::join_url;
use crate::error::{ProbeError, ProbeResult};
use crate::runner::StepResult;
use crate::spec::{CaseSpec, Locator, TestStep, TextMatcher, Viewport};

/// Playwright browser handle
pub struct PlaywrightHandle {
    config: PlaywrightConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// One JSON line printed by the generated script
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptEvent {
    Step {
        step: usize,
        ms: u64,
    },
    Log {
        log: String,
    },
    Done {
        success: bool,
        #[serde(default)]
        step: Option<usize>,
        #[serde(default)]
        error: Option<String>,
    },
}

impl PlaywrightHandle {
    /// Create a new Playwright handle.
    ///
    /// Callers check [`PlaywrightHandle::is_installed`] once up front.
    pub fn new(config: PlaywrightConfig) -> ProbeResult<Self> {
        std::fs::create_dir_all(&config.screenshot_dir)?;

        Ok(Self { config })
    }

    /// Check if Playwright is installed for the given node project
    pub fn is_installed(project_dir: &Path) -> bool {
        let status = Command::new("npx")
            .args(["--no-install", "playwright", "--version"])
            .current_dir(project_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        matches!(status, Ok(s) if s.success())
    }

    /// Build the Playwright script for a case
    pub fn build_script(&self, case: &CaseSpec) -> ProbeResult<String> {
        let cfg = &self.config;
        let mut script = String::new();

        script.push_str(&format!(
            r#"const pw = require(require.resolve('@playwright/test', {{ paths: [process.cwd()] }}));
const {{ expect }} = pw;
const report = (event) => console.log(JSON.stringify(event));

(async () => {{
  const browser = await pw.{browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{
    viewport: {{ width: {width}, height: {height} }}
  }});
  const page = await context.newPage();
  let step = 0;
  let started = Date.now();

  try {{
"#,
            browser = cfg.browser.as_str(),
            headless = cfg.headless,
            width = cfg.viewport.width,
            height = cfg.viewport.height,
        ));

        for (i, step) in case.steps.iter().enumerate() {
            script.push_str(&format!(
                "\n    // Step {}: {}\n    step = {}; started = Date.now();\n",
                i + 1,
                step.label().replace('\n', " "),
                i
            ));
            script.push_str(&self.step_to_js(step)?);
            script.push_str(&format!(
                "\n    report({{ step: {}, ms: Date.now() - started }});\n",
                i
            ));
        }

        script.push_str(
            r#"
    report({ success: true });
  } catch (error) {
    report({ success: false, step, error: String((error && error.message) || error) });
    process.exitCode = 1;
  } finally {
    await browser.close();
  }
})();
"#,
        );

        Ok(script)
    }

    /// Convert a step to JavaScript code
    fn step_to_js(&self, step: &TestStep) -> ProbeResult<String> {
        let js = match step {
            TestStep::Navigate { url } => {
                format!("    await page.goto({});", js_str(self.absolute(url)?.as_str()))
            }
            TestStep::Fill { locator, value } => {
                format!("    await {}.fill({});", locator_js(locator), js_str(value))
            }
            TestStep::Click { locator } => format!("    await {}.click();", locator_js(locator)),
            TestStep::Press { locator: Some(locator), key } => {
                format!("    await {}.press({});", locator_js(locator), js_str(key))
            }
            TestStep::Press { locator: None, key } => {
                format!("    await page.keyboard.press({});", js_str(key))
            }
            TestStep::ExpectVisible { locator } => {
                format!("    await expect({}).toBeVisible();", locator_js(locator))
            }
            TestStep::ExpectHidden { locator } => {
                format!("    await expect({}).toBeHidden();", locator_js(locator))
            }
            TestStep::ExpectUrl { url } => {
                format!("    await expect(page).toHaveURL({});", js_str(self.absolute(url)?.as_str()))
            }
            TestStep::Screenshot { name, full_page } => {
                let path = self.screenshot_path(name);
                format!(
                    "    await page.screenshot({{ path: {}, fullPage: {} }});",
                    js_str(&path.to_string_lossy()),
                    full_page
                )
            }
            TestStep::Log { message } => format!("    report({{ log: {} }});", js_str(message)),
            TestStep::Get { .. } => {
                return Err(ProbeError::StepFailed {
                    step: step.label(),
                    reason: "not a browser step".to_string(),
                })
            }
        };
        Ok(js)
    }

    fn absolute(&self, url: &str) -> ProbeResult<url::Url> {
        join_url(&self.config.base_url, url)
    }

    fn screenshot_path(&self, name: &str) -> PathBuf {
        self.config.screenshot_dir.join(format!("{}.png", name))
    }

    /// Run a case in a fresh browser context
    pub async fn run_case(&self, case: &CaseSpec) -> ProbeResult<Vec<StepResult>> {
        let script = self.build_script(case)?;

        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("case.js");
        std::fs::write(&script_path, script)?;

        debug!("Running Playwright script: {}", script_path.display());

        let mut cmd = TokioCommand::new("node");
        cmd.arg(&script_path)
            .current_dir(&self.config.project_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.timeout, cmd.output())
            .await
            .map_err(|_| ProbeError::Timeout(format!("case '{}' after {:?}", case.name, self.config.timeout)))?
            .map_err(|e| ProbeError::Playwright(format!("failed to run node: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(self.collect_results(case, &stdout, &stderr))
    }

    /// Turn the script's JSON lines into per-step results
    fn collect_results(&self, case: &CaseSpec, stdout: &str, stderr: &str) -> Vec<StepResult> {
        let mut results = Vec::new();
        let mut finished = false;

        for line in stdout.lines() {
            let Ok(event) = serde_json::from_str::<ScriptEvent>(line.trim()) else {
                continue;
            };

            match event {
                ScriptEvent::Step { step, ms } => {
                    let Some(spec_step) = case.steps.get(step) else {
                        warn!("Script reported unknown step {}", step);
                        continue;
                    };
                    results.push(StepResult {
                        success: true,
                        step_name: spec_step.label(),
                        duration_ms: ms,
                        error: None,
                        screenshot_path: match spec_step {
                            TestStep::Screenshot { name, .. } => Some(self.screenshot_path(name)),
                            _ => None,
                        },
                    });
                }
                ScriptEvent::Log { log } => info!("[TEST LOG] {}", log),
                ScriptEvent::Done { success: true, .. } => finished = true,
                ScriptEvent::Done { success: false, step, error } => {
                    let step_name = step
                        .and_then(|i| case.steps.get(i))
                        .map(TestStep::label)
                        .unwrap_or_else(|| "setup".to_string());
                    results.push(StepResult::failed(
                        step_name,
                        error.unwrap_or_else(|| "unknown error".to_string()),
                    ));
                    finished = true;
                }
            }
        }

        if !finished {
            // The script died before reporting, e.g. playwright failed to load
            let step_name = case
                .steps
                .get(results.len())
                .map(TestStep::label)
                .unwrap_or_else(|| "teardown".to_string());
            results.push(StepResult::failed(
                step_name,
                format!("Playwright script exited early: {}", stderr.trim()),
            ));
        }

        results
    }
}

/// Emit a string as a JavaScript literal
fn js_str(s: &str) -> String {
    json!(s).to_string()
}

fn matcher_js(matcher: &TextMatcher) -> String {
    match matcher {
        TextMatcher::Text(t) => js_str(t),
        TextMatcher::Pattern { pattern, ignore_case } => format!(
            "new RegExp({}, {})",
            js_str(pattern),
            js_str(if *ignore_case { "i" } else { "" })
        ),
    }
}

fn locator_js(locator: &Locator) -> String {
    match locator {
        Locator::Role { role, name, exact } => {
            let exact = match name {
                TextMatcher::Text(_) if *exact => ", exact: true",
                _ => "",
            };
            format!("page.getByRole({}, {{ name: {}{} }})", js_str(role), matcher_js(name), exact)
        }
        Locator::Css { css, has_text: Some(text) } => {
            format!("page.locator({}, {{ hasText: {} }})", js_str(css), js_str(text))
        }
        Locator::Css { css, has_text: None } => format!("page.locator({})", js_str(css)),
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,

    /// Directory for screenshots
    pub screenshot_dir: PathBuf,

    /// Directory whose node_modules provides @playwright/test
    pub project_dir: PathBuf,

    /// Target base URL, set per suite
    #[serde(skip)]
    pub base_url: String,

    /// Set per suite
    #[serde(skip)]
    pub viewport: Viewport,

    /// Set from the runner's case timeout
    #[serde(skip)]
    pub timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            screenshot_dir: PathBuf::from("test-results/screenshots"),
            project_dir: PathBuf::from("."),
            base_url: String::new(),
            viewport: Viewport::default(),
            timeout: Duration::from_secs(30),
        }
    }
}
