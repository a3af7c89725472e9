//! API suite against an in-process stand-in for the tool rental API
//!
//! The stand-in follows the hosted API's observable behavior closely enough
//! for the shipped `tools_api.yaml` to pass, and can be told to misbehave.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};

use siteprobe_e2e::runner::CaseStatus;
use siteprobe_e2e::spec::SuiteKind;
use siteprobe_e2e::{CaseFilter, RunnerConfig, SuiteSpec, TestRunner};

const TOOLS_SUITE: &str = include_str!("../specs/tools_api.yaml");
const LOGIN_SUITE: &str = include_str!("../specs/login.yaml");

#[derive(Clone)]
struct MockApi {
    tools: Arc<Vec<Value>>,
    /// Return out-of-stock tools even when filtering on availability
    leak_out_of_stock: bool,
}

impl MockApi {
    fn new() -> Self {
        Self {
            tools: Arc::new(vec![
                json!({ "id": 4643, "category": "ladders", "name": "Werner 6 ft. Aluminum Step Ladder", "inStock": true }),
                json!({ "id": 2177, "category": "power-drills", "name": "DEWALT 20V MAX Cordless Drill", "inStock": false }),
                json!({ "id": 8554, "category": "trailers", "name": "Big Tex 30PI Pintle Trailer", "inStock": true }),
            ]),
            leak_out_of_stock: false,
        }
    }

    fn empty() -> Self {
        Self {
            tools: Arc::new(Vec::new()),
            leak_out_of_stock: false,
        }
    }
}

fn json_response(status: StatusCode, body: Value) -> Response {
    (
        status,
        [(CONTENT_TYPE, "application/json; charset=utf-8")],
        body.to_string(),
    )
        .into_response()
}

async fn list_tools(
    State(api): State<MockApi>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let available_only = query.get("available").map(|v| v == "true").unwrap_or(false);
    let tools: Vec<Value> = api
        .tools
        .iter()
        .filter(|t| !available_only || api.leak_out_of_stock || t["inStock"] == true)
        .cloned()
        .collect();
    json_response(StatusCode::OK, Value::Array(tools))
}

async fn get_tool(
    State(api): State<MockApi>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Ok(id) = id.parse::<u64>() else {
        return json_response(
            StatusCode::BAD_REQUEST,
            json!({ "error": "Invalid value for parameter toolId. Must be a number." }),
        );
    };
    let Some(tool) = api.tools.iter().find(|t| t["id"] == id) else {
        return json_response(
            StatusCode::NOT_FOUND,
            json!({ "error": format!("No tool with id {}.", id) }),
        );
    };

    match query.get("user-manual").map(String::as_str) {
        None | Some("false") => json_response(StatusCode::OK, tool.clone()),
        Some("true") => (
            StatusCode::OK,
            [(CONTENT_TYPE, "application/pdf")],
            b"%PDF-1.4\n%mock\n".to_vec(),
        )
            .into_response(),
        Some(_) => json_response(
            StatusCode::BAD_REQUEST,
            json!({ "error": "Invalid value for query parameter 'user-manual'." }),
        ),
    }
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_secs(5)).await;
    json_response(StatusCode::OK, json!([]))
}

async fn spawn_mock(api: MockApi) -> String {
    let app = Router::new()
        .route("/tools", get(list_tools))
        .route("/tools/:id", get(get_tool))
        .route("/slow", get(slow))
        .with_state(api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn runner_for(base_url: &str) -> TestRunner {
    let mut config = RunnerConfig {
        request_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    config.set_target(&format!("tool-rental={}", base_url)).unwrap();
    TestRunner::with_config(config)
}

#[tokio::test]
async fn shipped_tools_suite_passes() {
    let base_url = spawn_mock(MockApi::new()).await;
    let suite = SuiteSpec::from_yaml(TOOLS_SUITE).unwrap();

    let result = runner_for(&base_url)
        .run_suites(&[suite], &CaseFilter::default())
        .await
        .unwrap();

    assert_eq!(result.total, 8);
    assert_eq!(result.passed, 8, "{:#?}", result.results);
    assert_eq!(result.failed, 0);
}

#[tokio::test]
async fn chained_lookup_records_every_step() {
    let base_url = spawn_mock(MockApi::new()).await;
    let suite = SuiteSpec::from_yaml(TOOLS_SUITE).unwrap();
    let filter = CaseFilter {
        name: Some("valid tool by id".into()),
        ..Default::default()
    };

    let result = runner_for(&base_url).run_suites(&[suite], &filter).await.unwrap();

    assert_eq!(result.total, 1);
    let case = &result.results[0];
    assert_eq!(case.status, CaseStatus::Passed);
    assert_eq!(case.steps.len(), 2);
    assert_eq!(case.steps[1].step_name, "get:/tools/{{tool_id}}");
}

#[tokio::test]
async fn leaked_out_of_stock_tool_fails_filter_case() {
    let api = MockApi {
        leak_out_of_stock: true,
        ..MockApi::new()
    };
    let base_url = spawn_mock(api).await;
    let suite = SuiteSpec::from_yaml(TOOLS_SUITE).unwrap();

    let result = runner_for(&base_url)
        .run_suites(&[suite], &CaseFilter::default())
        .await
        .unwrap();

    assert_eq!(result.failed, 1);
    let failed = result
        .results
        .iter()
        .find(|r| r.status == CaseStatus::Failed)
        .unwrap();
    assert_eq!(failed.name, "should return only available tools when filtered");
    let error = failed.error.as_deref().unwrap();
    assert!(error.contains("each_equals"), "{}", error);
    assert!(error.contains("element 1 inStock"), "{}", error);
}

#[tokio::test]
async fn empty_catalog_stops_chain_at_discovery() {
    let base_url = spawn_mock(MockApi::empty()).await;
    let suite = SuiteSpec::from_yaml(TOOLS_SUITE).unwrap();
    let filter = CaseFilter {
        name: Some("valid tool by id".into()),
        ..Default::default()
    };

    let result = runner_for(&base_url).run_suites(&[suite], &filter).await.unwrap();

    let case = &result.results[0];
    assert_eq!(case.status, CaseStatus::Failed);
    assert_eq!(case.steps.len(), 1);
    assert!(case.error.as_deref().unwrap().contains("array is empty"));
}

#[tokio::test]
async fn workers_keep_declaration_order() {
    let base_url = spawn_mock(MockApi::new()).await;
    let suite = SuiteSpec::from_yaml(TOOLS_SUITE).unwrap();
    let expected: Vec<String> = suite.cases.iter().map(|c| c.name.clone()).collect();

    let mut runner = runner_for(&base_url);
    let mut config = runner.config().clone();
    config.workers = 4;
    runner = TestRunner::with_config(config);

    let result = runner.run_suites(&[suite], &CaseFilter::default()).await.unwrap();
    let names: Vec<String> = result.results.iter().map(|r| r.name.clone()).collect();
    assert_eq!(names, expected);
    assert_eq!(result.passed, 8);
}

#[tokio::test]
async fn timeout_is_reported_as_failure() {
    let base_url = spawn_mock(MockApi::new()).await;
    let suite = SuiteSpec::from_yaml(
        r#"
suite: slow endpoint
kind: api
target: tool-rental
cases:
  - name: slow call
    steps:
      - action: get
        path: /slow
        expect:
          status: [200]
"#,
    )
    .unwrap();

    let mut runner = runner_for(&base_url);
    let mut config = runner.config().clone();
    config.request_timeout = Duration::from_millis(200);
    runner = TestRunner::with_config(config);

    let result = runner.run_suites(&[suite], &CaseFilter::default()).await.unwrap();
    assert_eq!(result.failed, 1);
    assert!(result.results[0].error.as_deref().unwrap().contains("HTTP error"));
}

#[tokio::test]
async fn api_run_needs_only_its_own_target() {
    let base_url = spawn_mock(MockApi::new()).await;
    let mut config = RunnerConfig::default();
    config.targets.clear();
    config.set_target(&format!("tool-rental={}", base_url)).unwrap();

    let suites = [
        SuiteSpec::from_yaml(LOGIN_SUITE).unwrap(),
        SuiteSpec::from_yaml(TOOLS_SUITE).unwrap(),
    ];
    let filter = CaseFilter {
        kind: Some(SuiteKind::Api),
        ..Default::default()
    };

    let result = TestRunner::with_config(config)
        .run_suites(&suites, &filter)
        .await
        .unwrap();
    assert_eq!(result.total, 8);
    assert_eq!(result.passed, 8, "{:#?}", result.results);
}

#[tokio::test]
async fn required_properties_case_accepts_null_values() {
    let api = MockApi {
        tools: Arc::new(vec![
            json!({ "id": 1.5, "name": null, "category": "saws", "inStock": true }),
        ]),
        ..MockApi::new()
    };
    let base_url = spawn_mock(api).await;
    let suite = SuiteSpec::from_yaml(TOOLS_SUITE).unwrap();
    let filter = CaseFilter {
        name: Some("required properties".into()),
        ..Default::default()
    };

    let result = runner_for(&base_url).run_suites(&[suite], &filter).await.unwrap();
    assert_eq!(result.total, 1);
    assert_eq!(result.results[0].status, CaseStatus::Passed, "{:?}", result.results[0].error);
}
