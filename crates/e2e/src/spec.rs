//! Declarative YAML suite files
//!
//! A suite file groups independent cases by the page or endpoint under test.
//! UI suites drive a browser; API suites issue HTTP GETs.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProbeError, ProbeResult};

/// Which driver a suite runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteKind {
    Ui,
    Api,
}

impl fmt::Display for SuiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuiteKind::Ui => f.write_str("ui"),
            SuiteKind::Api => f.write_str("api"),
        }
    }
}

/// A group of cases against one target, parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSpec {
    /// Display name of the group
    pub suite: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    pub kind: SuiteKind,

    /// Key into the configured base URLs
    pub target: String,

    /// Tags applied to every case in the suite
    #[serde(default)]
    pub tags: Vec<String>,

    /// Viewport size for the browser (UI suites only)
    #[serde(default = "default_viewport")]
    pub viewport: Viewport,

    pub cases: Vec<CaseSpec>,
}

fn default_viewport() -> Viewport {
    Viewport::default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport { width: 1280, height: 720 }
    }
}

/// One independent test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSpec {
    pub name: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

/// A single step in a case
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL (relative to the target)
    Navigate { url: String },

    /// Fill an input field
    Fill { locator: Locator, value: String },

    /// Click an element
    Click { locator: Locator },

    /// Press a key, on an element or the page
    Press {
        #[serde(default)]
        locator: Option<Locator>,
        key: String,
    },

    /// Assert an element is visible
    ExpectVisible { locator: Locator },

    /// Assert an element is hidden or absent
    ExpectHidden { locator: Locator },

    /// Assert the page URL (relative to the target)
    ExpectUrl { url: String },

    /// Take a screenshot
    Screenshot {
        name: String,
        #[serde(default)]
        full_page: bool,
    },

    /// Issue a GET and check the response
    Get {
        path: String,
        #[serde(default)]
        query: BTreeMap<String, String>,
        #[serde(default)]
        expect: ResponseExpectation,
        /// Variable name -> JSON pointer into the response body
        #[serde(default)]
        capture: BTreeMap<String, String>,
    },

    /// Log a message (for debugging)
    Log { message: String },
}

impl TestStep {
    /// The suite kind this step belongs to. `None` fits either kind.
    pub fn kind(&self) -> Option<SuiteKind> {
        match self {
            TestStep::Get { .. } => Some(SuiteKind::Api),
            TestStep::Log { .. } => None,
            _ => Some(SuiteKind::Ui),
        }
    }

    /// Short label used in logs and results
    pub fn label(&self) -> String {
        match self {
            TestStep::Navigate { url } => format!("navigate:{}", url),
            TestStep::Fill { locator, .. } => format!("fill:{}", locator),
            TestStep::Click { locator } => format!("click:{}", locator),
            TestStep::Press { key, .. } => format!("press:{}", key),
            TestStep::ExpectVisible { locator } => format!("expect_visible:{}", locator),
            TestStep::ExpectHidden { locator } => format!("expect_hidden:{}", locator),
            TestStep::ExpectUrl { url } => format!("expect_url:{}", url),
            TestStep::Screenshot { name, .. } => format!("screenshot:{}", name),
            TestStep::Get { path, query, .. } => {
                if query.is_empty() {
                    format!("get:{}", path)
                } else {
                    let qs: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                    format!("get:{}?{}", path, qs.join("&"))
                }
            }
            TestStep::Log { message } => {
                let end = message.char_indices().nth(30).map(|(i, _)| i).unwrap_or(message.len());
                format!("log:{}", &message[..end])
            }
        }
    }
}

/// How to find an element on the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    /// Accessible role and name, as `page.getByRole`
    Role {
        role: String,
        name: TextMatcher,
        #[serde(default)]
        exact: bool,
    },
    /// CSS selector, optionally narrowed by contained text
    Css {
        css: String,
        #[serde(default)]
        has_text: Option<String>,
    },
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Role { role, name, .. } => write!(f, "{}[{}]", role, name),
            Locator::Css { css, has_text: Some(t) } => write!(f, "{}:has-text({})", css, t),
            Locator::Css { css, has_text: None } => f.write_str(css),
        }
    }
}

/// Literal text or a regular expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextMatcher {
    Text(String),
    Pattern {
        pattern: String,
        #[serde(default)]
        ignore_case: bool,
    },
}

impl fmt::Display for TextMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMatcher::Text(t) => f.write_str(t),
            TextMatcher::Pattern { pattern, ignore_case } => {
                write!(f, "/{}/{}", pattern, if *ignore_case { "i" } else { "" })
            }
        }
    }
}

/// What a response must look like. Every set field is checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseExpectation {
    /// Status must be one of these
    #[serde(default)]
    pub status: Option<Vec<u16>>,

    /// Status must (or must not) be 2xx
    #[serde(default)]
    pub ok: Option<bool>,

    /// Body must be an array with at least one element
    #[serde(default)]
    pub non_empty_array: bool,

    /// Body must deserialize into this shape
    #[serde(default)]
    pub shape: Option<Shape>,

    /// Fields present on the body object, or on every element of an array body
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// Field values on the body object
    #[serde(default)]
    pub field_equals: BTreeMap<String, Value>,

    /// Field values on every element of an array body
    #[serde(default)]
    pub each_equals: BTreeMap<String, Value>,

    /// `content-type` must contain at least one of these
    #[serde(default)]
    pub content_type_any: Vec<String>,
}

impl ResponseExpectation {
    /// Whether any check needs the body parsed as JSON
    pub fn needs_json(&self) -> bool {
        self.non_empty_array
            || self.shape.is_some()
            || !self.required_fields.is_empty()
            || !self.field_equals.is_empty()
            || !self.each_equals.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Tool,
    ToolList,
}

impl SuiteSpec {
    /// Parse a suite from YAML string
    pub fn from_yaml(yaml: &str) -> ProbeResult<Self> {
        let suite: Self = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> ProbeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| ProbeError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all suites from a directory, sorted by file path
    pub fn load_all(dir: &Path) -> ProbeResult<Vec<Self>> {
        if !dir.is_dir() {
            return Err(ProbeError::SpecParse(format!(
                "suite directory not found: {}",
                dir.display()
            )));
        }

        let mut suites = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            suites.push(Self::from_file(entry.path())?);
        }

        Ok(suites)
    }

    /// Reject suites whose steps don't fit their kind
    pub fn validate(&self) -> ProbeResult<()> {
        if self.cases.is_empty() {
            return Err(ProbeError::SpecParse(format!("suite '{}' has no cases", self.suite)));
        }

        for case in &self.cases {
            if case.steps.is_empty() {
                return Err(ProbeError::SpecParse(format!(
                    "case '{}' in suite '{}' has no steps",
                    case.name, self.suite
                )));
            }
            if let Some(step) = case.steps.iter().find(|s| s.kind().is_some_and(|k| k != self.kind)) {
                return Err(ProbeError::SpecParse(format!(
                    "case '{}' uses step '{}' in a {} suite",
                    case.name,
                    step.label(),
                    self.kind
                )));
            }
        }

        Ok(())
    }

    /// Tags of a case, including the suite's own
    pub fn case_tags<'a>(&'a self, case: &'a CaseSpec) -> impl Iterator<Item = &'a String> {
        self.tags.iter().chain(case.tags.iter())
    }
}
