//! HTTP driver for API suites
//!
//! A case is a chain of GETs. Earlier responses can feed later ones through
//! captured variables, e.g. discover a tool id, then fetch that tool.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::join_url;
use crate::error::{ProbeError, ProbeResult};
use crate::runner::StepResult;
use crate::spec::{CaseSpec, ResponseExpectation, Shape, TestStep};
use crate::tool::{self, json_kind};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex is valid")
});

/// Variables captured during one case
#[derive(Debug, Default, Clone)]
pub struct CaseContext {
    vars: BTreeMap<String, Value>,
}

impl CaseContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Substitute `{{name}}` placeholders in a string
    pub fn render(&self, template: &str) -> ProbeResult<String> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = self.get(name.as_str()).ok_or_else(|| {
                ProbeError::Template(format!("variable '{}' is not captured", name.as_str()))
            })?;
            out.push_str(&template[last..whole.start()]);
            out.push_str(&value_to_text(value));
            last = whole.end();
        }

        out.push_str(&template[last..]);
        Ok(out)
    }

    /// Resolve placeholders inside an expected JSON value.
    ///
    /// A string that is exactly one placeholder becomes the captured value
    /// with its original type, so `"{{tool_id}}"` matches a numeric id.
    pub fn resolve_value(&self, value: &Value) -> ProbeResult<Value> {
        match value {
            Value::String(s) => {
                if let Some(caps) = PLACEHOLDER.captures(s) {
                    if caps.get(0).map(|m| m.as_str().len()) == Some(s.len()) {
                        let name = &caps[1];
                        return self.get(name).cloned().ok_or_else(|| {
                            ProbeError::Template(format!("variable '{}' is not captured", name))
                        });
                    }
                }
                Ok(Value::String(self.render(s)?))
            }
            Value::Array(items) => items
                .iter()
                .map(|v| self.resolve_value(v))
                .collect::<ProbeResult<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve_value(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_expectation(&self, expect: &ResponseExpectation) -> ProbeResult<ResponseExpectation> {
        let resolve_map = |map: &BTreeMap<String, Value>| -> ProbeResult<BTreeMap<String, Value>> {
            map.iter()
                .map(|(k, v)| -> ProbeResult<(String, Value)> {
                    Ok((k.clone(), self.resolve_value(v)?))
                })
                .collect()
        };

        Ok(ResponseExpectation {
            field_equals: resolve_map(&expect.field_equals)?,
            each_equals: resolve_map(&expect.each_equals)?,
            ..expect.clone()
        })
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The parts of a response the checks look at
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub content_type: Option<String>,
    /// Parsed body, or the parse error. `None` when the body wasn't needed.
    pub body: Option<Result<Value, String>>,
}

impl ResponseSnapshot {
    fn json(&self) -> Result<&Value, String> {
        match &self.body {
            Some(Ok(v)) => Ok(v),
            Some(Err(e)) => Err(format!("body is not JSON: {}", e)),
            None => Err("body was not read".to_string()),
        }
    }
}

/// A single failed check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionFailure {
    pub check: &'static str,
    pub message: String,
}

impl AssertionFailure {
    fn new(check: &'static str, message: impl Into<String>) -> Self {
        Self { check, message: message.into() }
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.check, self.message)
    }
}

/// Check a response against an expectation. Returns every failed check.
pub fn evaluate(expect: &ResponseExpectation, resp: &ResponseSnapshot) -> Vec<AssertionFailure> {
    let mut failures = Vec::new();

    if let Some(allowed) = &expect.status {
        if !allowed.contains(&resp.status) {
            failures.push(AssertionFailure::new(
                "status",
                format!("expected one of {:?}, got {}", allowed, resp.status),
            ));
        }
    }

    if let Some(ok) = expect.ok {
        let is_ok = (200..300).contains(&resp.status);
        if is_ok != ok {
            failures.push(AssertionFailure::new(
                "ok",
                format!("expected ok={}, got status {}", ok, resp.status),
            ));
        }
    }

    if !expect.content_type_any.is_empty() {
        let actual = resp.content_type.as_deref().unwrap_or("");
        if !expect.content_type_any.iter().any(|t| actual.contains(t.as_str())) {
            failures.push(AssertionFailure::new(
                "content_type",
                format!("'{}' matches none of {:?}", actual, expect.content_type_any),
            ));
        }
    }

    if !expect.needs_json() {
        return failures;
    }

    let body = match resp.json() {
        Ok(body) => body,
        Err(e) => {
            failures.push(AssertionFailure::new("body", e));
            return failures;
        }
    };

    if expect.non_empty_array {
        match body.as_array() {
            Some(items) if !items.is_empty() => {}
            Some(_) => failures.push(AssertionFailure::new("non_empty_array", "array is empty")),
            None => failures.push(AssertionFailure::new(
                "non_empty_array",
                format!("expected an array, got {}", json_kind(body)),
            )),
        }
    }

    match expect.shape {
        Some(Shape::Tool) => {
            if let Err(e) = tool::check_tool(body) {
                failures.push(AssertionFailure::new("shape", e));
            }
        }
        Some(Shape::ToolList) => {
            if let Err(e) = tool::check_tool_list(body) {
                failures.push(AssertionFailure::new("shape", e));
            }
        }
        None => {}
    }

    if !expect.required_fields.is_empty() {
        let fields: Vec<&str> = expect.required_fields.iter().map(String::as_str).collect();
        match body {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let missing = tool::missing_fields(item, &fields);
                    if !missing.is_empty() {
                        failures.push(AssertionFailure::new(
                            "required_fields",
                            format!("element {} is missing {}", i, missing.join(", ")),
                        ));
                    }
                }
            }
            other => {
                let missing = tool::missing_fields(other, &fields);
                if !missing.is_empty() {
                    failures.push(AssertionFailure::new(
                        "required_fields",
                        format!("missing {}", missing.join(", ")),
                    ));
                }
            }
        }
    }

    for (field, expected) in &expect.field_equals {
        match body.get(field) {
            Some(actual) if actual == expected => {}
            Some(actual) => failures.push(AssertionFailure::new(
                "field_equals",
                format!("{}: expected {}, got {}", field, expected, actual),
            )),
            None => failures.push(AssertionFailure::new(
                "field_equals",
                format!("{}: field is missing", field),
            )),
        }
    }

    if !expect.each_equals.is_empty() {
        match body.as_array() {
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    for (field, expected) in &expect.each_equals {
                        if item.get(field) != Some(expected) {
                            let actual = item.get(field).map(Value::to_string);
                            failures.push(AssertionFailure::new(
                                "each_equals",
                                format!(
                                    "element {} {}: expected {}, got {}",
                                    i,
                                    field,
                                    expected,
                                    actual.as_deref().unwrap_or("nothing")
                                ),
                            ));
                        }
                    }
                }
            }
            None => failures.push(AssertionFailure::new(
                "each_equals",
                format!("expected an array, got {}", json_kind(body)),
            )),
        }
    }

    failures
}

/// HTTP client bound to one target, used for a single case
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> ProbeResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    /// Run every step of a case, stopping at the first failure
    pub async fn run_case(&self, case: &CaseSpec) -> Vec<StepResult> {
        let mut ctx = CaseContext::new();
        let mut results = Vec::with_capacity(case.steps.len());

        for step in &case.steps {
            let start = Instant::now();
            let outcome = self.execute_step(step, &mut ctx).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let failed = outcome.is_err();
            results.push(StepResult {
                success: !failed,
                step_name: step.label(),
                duration_ms,
                error: outcome.err().map(|e| e.to_string()),
                screenshot_path: None,
            });

            if failed {
                break;
            }
        }

        results
    }

    /// Execute a single step, updating captured variables
    pub async fn execute_step(&self, step: &TestStep, ctx: &mut CaseContext) -> ProbeResult<()> {
        match step {
            TestStep::Get { path, query, expect, capture } => {
                self.execute_get(path, query, expect, capture, ctx).await
            }
            TestStep::Log { message } => {
                info!("[TEST LOG] {}", message);
                Ok(())
            }
            other => Err(ProbeError::StepFailed {
                step: other.label(),
                reason: "not an API step".to_string(),
            }),
        }
    }

    async fn execute_get(
        &self,
        path: &str,
        query: &BTreeMap<String, String>,
        expect: &ResponseExpectation,
        capture: &BTreeMap<String, String>,
        ctx: &mut CaseContext,
    ) -> ProbeResult<()> {
        let mut url = join_url(&self.base_url, &ctx.render(path)?)?;
        if !query.is_empty() {
            let pairs = query
                .iter()
                .map(|(k, v)| -> ProbeResult<(&str, String)> { Ok((k.as_str(), ctx.render(v)?)) })
                .collect::<ProbeResult<Vec<_>>>()?;
            url.query_pairs_mut().extend_pairs(pairs);
        }

        debug!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response.bytes().await?;

        let expect = ctx.resolve_expectation(expect)?;
        let body = (expect.needs_json() || !capture.is_empty())
            .then(|| serde_json::from_slice::<Value>(&bytes).map_err(|e| e.to_string()));

        let snapshot = ResponseSnapshot { status, content_type, body };
        let failures = evaluate(&expect, &snapshot);
        if !failures.is_empty() {
            let reasons: Vec<String> = failures.iter().map(ToString::to_string).collect();
            return Err(ProbeError::AssertionFailed(format!(
                "GET {} -> {}: {}",
                url,
                status,
                reasons.join("; ")
            )));
        }

        for (name, pointer) in capture {
            let body = snapshot.json().map_err(|e| ProbeError::StepFailed {
                step: format!("capture:{}", name),
                reason: e,
            })?;
            let value = body.pointer(pointer).ok_or_else(|| ProbeError::StepFailed {
                step: format!("capture:{}", name),
                reason: format!("nothing at {} in response from {}", pointer, url),
            })?;
            debug!("captured {} = {}", name, value);
            ctx.set(name.clone(), value.clone());
        }

        Ok(())
    }
}
