//! SiteProbe E2E Test Framework
//!
//! This crate probes two hosted services from the outside:
//! - the login form at the-internet.herokuapp.com, driven through Playwright
//! - the tool rental REST API, driven through plain HTTP GETs
//!
//! Cases are declared in YAML suite files and run in isolation. Nothing is
//! shared between cases; a case either passes or fails.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Probe Runner (Rust)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── run_filtered(filter) -> TestSuiteResult              │
//! │    ├── ui case  -> PlaywrightHandle::run_case (node script) │
//! │    └── api case -> ApiClient::run_case (reqwest)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SuiteSpec (YAML)                                           │
//! │    ├── suite, kind (ui | api), target, tags                 │
//! │    └── cases: [CaseSpec]                                    │
//! │          └── steps: [TestStep]                              │
//! │                ├── navigate / fill / click / press          │
//! │                ├── expect_visible / expect_hidden / _url    │
//! │                └── get { path, query, expect, capture }     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod playwright;
pub mod runner;
pub mod spec;
pub mod tool;

pub use config::RunnerConfig;
pub use error::{ProbeError, ProbeResult};
pub use runner::{CaseFilter, TestRunner};
pub use spec::{SuiteSpec, TestStep};
