//! Live probe harness entry point
//!
//! This file is the test binary that runs the YAML suites against the hosted
//! services. It only touches the network when asked to:
//! SITEPROBE_LIVE=1 cargo test --package siteprobe-e2e --test e2e

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use siteprobe_e2e::playwright::Browser;
use siteprobe_e2e::runner::{CaseStatus, TestSuiteResult};
use siteprobe_e2e::spec::SuiteKind;
use siteprobe_e2e::{CaseFilter, ProbeResult, RunnerConfig, TestRunner};

#[derive(Parser, Debug)]
#[command(name = "siteprobe-e2e")]
#[command(about = "Browser and API probes for the-internet and the tool rental API")]
struct Args {
    /// Run the probes against the live services
    #[arg(long, env = "SITEPROBE_LIVE")]
    live: bool,

    /// Run only cases whose name contains this text
    filter: Option<String>,

    /// Path to the suite directory
    #[arg(short, long, env = "SITEPROBE_SPECS")]
    specs: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "SITEPROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Run only cases carrying this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only a specific case by name
    #[arg(short, long)]
    name: Option<String>,

    /// Run only ui or api suites
    #[arg(long, value_parser = parse_kind)]
    kind: Option<SuiteKind>,

    /// Override a target base URL (NAME=URL, repeatable)
    #[arg(long = "target", value_name = "NAME=URL")]
    targets: Vec<String>,

    /// Browser to use
    #[arg(long, value_enum)]
    browser: Option<Browser>,

    /// Run the browser headed
    #[arg(long)]
    headed: bool,

    /// Cases in flight at once
    #[arg(short, long, env = "SITEPROBE_WORKERS")]
    workers: Option<usize>,

    /// Report UI cases as skipped when Playwright is missing
    #[arg(long, env = "SITEPROBE_SKIP_UI")]
    skip_ui_without_playwright: bool,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,

    // Flags cargo may forward to test binaries; accepted and ignored
    #[arg(long, hide = true)]
    nocapture: bool,
    #[arg(long, hide = true)]
    test_threads: Option<usize>,
    #[arg(short, long, hide = true)]
    quiet: bool,
    #[arg(long, hide = true)]
    exact: bool,
    #[arg(long, hide = true)]
    ignored: bool,
    #[arg(long, hide = true)]
    include_ignored: bool,
}

fn parse_kind(s: &str) -> Result<SuiteKind, String> {
    match s {
        "ui" => Ok(SuiteKind::Ui),
        "api" => Ok(SuiteKind::Api),
        other => Err(format!("expected 'ui' or 'api', got '{}'", other)),
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if !args.live {
        println!("siteprobe-e2e: live probes skipped (set SITEPROBE_LIVE=1 or pass --live)");
        return;
    }

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    let result = rt.block_on(async_main(args));

    match result {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

fn build_config(args: &Args) -> ProbeResult<RunnerConfig> {
    let mut config = match &args.config {
        Some(path) => RunnerConfig::from_file(path)?,
        None => RunnerConfig::default(),
    };

    for assignment in &args.targets {
        config.set_target(assignment)?;
    }
    if let Some(specs) = &args.specs {
        config.specs_dir = specs.clone();
    }
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(browser) = args.browser {
        config.playwright.browser = browser;
    }
    if args.headed {
        config.playwright.headless = false;
    }
    if args.skip_ui_without_playwright {
        config.skip_ui_without_playwright = true;
    }
    config.playwright.screenshot_dir = config.output_dir.join("screenshots");

    Ok(config)
}

async fn async_main(args: Args) -> ProbeResult<bool> {
    let config = build_config(&args)?;
    let mut runner = TestRunner::with_config(config);

    let results = if let Some(name) = &args.name {
        let result = runner.run_case(name).await?;
        TestSuiteResult {
            started_at: chrono::Utc::now(),
            total: 1,
            passed: usize::from(result.status == CaseStatus::Passed),
            failed: usize::from(result.status == CaseStatus::Failed),
            skipped: usize::from(result.status == CaseStatus::Skipped),
            duration_ms: result.duration_ms,
            results: vec![result],
        }
    } else {
        let filter = CaseFilter {
            tag: args.tag.clone(),
            name: args.filter.clone(),
            kind: args.kind,
        };
        runner.run_filtered(&filter).await?
    };

    runner.write_results(&results)?;

    Ok(results.failed == 0)
}
