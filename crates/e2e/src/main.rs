//! Scenario runner entry point
//!
//! Runs the smart repay scenario against the simulator page.
//! Run with: cargo run --package tokensim-e2e

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tokensim_e2e::playwright::{Browser, PlaywrightConfig};
use tokensim_e2e::simulator::SimulatorUi;
use tokensim_e2e::{RunnerConfig, ScenarioRunner};

#[derive(Parser, Debug)]
#[command(name = "tokensim-e2e")]
#[command(version, about = "E2E scenario runner for the tokenized funds simulator")]
struct Args {
    /// Simulator page to load
    #[arg(long, env = "TOKENSIM_PAGE", default_value = "simulator.html")]
    page: PathBuf,

    /// Directory for checkpoint screenshots
    #[arg(long, env = "TOKENSIM_SCREENSHOTS", default_value = "jules-scratch/verification")]
    screenshots: PathBuf,

    /// Output directory for the run report
    #[arg(short, long, env = "TOKENSIM_OUTPUT", default_value = "test-results")]
    output: PathBuf,

    /// Browser to use
    #[arg(long, env = "TOKENSIM_BROWSER", value_enum, default_value = "chromium")]
    browser: Browser,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Viewport width
    #[arg(long, default_value = "1280")]
    viewport_width: u32,

    /// Viewport height
    #[arg(long, default_value = "720")]
    viewport_height: u32,

    /// YAML file overriding the simulator page's selectors and labels
    #[arg(long, env = "TOKENSIM_UI")]
    ui: Option<PathBuf>,

    /// Timeout for each busy overlay transition [default: 60000]
    #[arg(long)]
    overlay_timeout_ms: Option<u64>,

    /// Node executable
    #[arg(long = "node", env = "TOKENSIM_NODE", default_value = "node")]
    node_binary: PathBuf,

    /// Where Node finds the playwright package
    #[arg(long, env = "NODE_PATH")]
    node_path: Option<PathBuf>,

    /// Skip the `npx playwright --version` probe
    #[arg(long)]
    skip_probe: bool,

    /// Run a scenario file instead of the built-in scenario
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Print the scenario as YAML and exit
    #[arg(long)]
    print_scenario: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let mut ui = match &args.ui {
        Some(path) => SimulatorUi::from_file(path)
            .with_context(|| format!("loading UI overrides from {}", path.display()))?,
        None => SimulatorUi::default(),
    };
    if let Some(timeout_ms) = args.overlay_timeout_ms {
        ui.overlay_timeout_ms = timeout_ms;
    }

    let config = RunnerConfig {
        playwright: PlaywrightConfig {
            browser: args.browser,
            headless: !args.headed,
            viewport_width: args.viewport_width,
            viewport_height: args.viewport_height,
            node_binary: args.node_binary,
            node_path: args.node_path,
            probe: !args.skip_probe,
            ..Default::default()
        },
        page: args.page,
        ui,
        scenario_file: args.scenario,
        screenshot_dir: args.screenshots,
        output_dir: args.output,
    };

    let runner = ScenarioRunner::with_config(config);
    let scenario = runner.scenario()?;

    if args.print_scenario {
        print!("{}", scenario.to_yaml()?);
        return Ok(true);
    }

    let report = runner.run(&scenario).await?;
    runner.write_report(&report)?;

    Ok(report.success)
}
