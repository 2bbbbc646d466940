//! Scenario runner: drives one browser session through a scenario

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::artifact::{self, Artifact};
use crate::dialog::{DialogRecord, DialogScript};
use crate::error::{E2eError, E2eResult};
use crate::playwright::{self, PlaywrightConfig, PlaywrightSession};
use crate::protocol::WaitState;
use crate::scenario::{Scenario, Step};
use crate::simulator::SimulatorUi;

/// Result of executing a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Result of running a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub scenario: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub dialogs: Vec<DialogRecord>,
    pub artifacts: Vec<Artifact>,
    pub error: Option<String>,
}

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub playwright: PlaywrightConfig,

    /// Simulator page, used by the built-in scenario
    pub page: PathBuf,

    pub ui: SimulatorUi,

    /// Scenario file replacing the built-in scenario
    pub scenario_file: Option<PathBuf>,

    pub screenshot_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            playwright: PlaywrightConfig::default(),
            page: PathBuf::from("simulator.html"),
            ui: SimulatorUi::default(),
            scenario_file: None,
            screenshot_dir: PathBuf::from("jules-scratch/verification"),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Steps executed so far and screenshots taken along the way
#[derive(Default)]
struct Progress {
    steps: Vec<StepResult>,
    screenshots: Vec<(String, PathBuf)>,
}

impl Progress {
    fn record(&mut self, name: String, start: Instant, outcome: &E2eResult<()>) {
        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => debug!("✓ {} ({} ms)", name, duration_ms),
            Err(e) => error!("✗ {} - {}", name, e),
        }
        self.steps.push(StepResult {
            index: self.steps.len(),
            name,
            success: outcome.is_ok(),
            duration_ms,
            error: outcome.as_ref().err().map(|e| e.to_string()),
        });
    }
}

/// Runs a scenario against the simulator page
pub struct ScenarioRunner {
    config: RunnerConfig,
}

impl ScenarioRunner {
    /// Create a new runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// The configured scenario: the file if one is set, else the built-in one
    pub fn scenario(&self) -> E2eResult<Scenario> {
        match &self.config.scenario_file {
            Some(path) => Scenario::from_file(path),
            None => Ok(Scenario::smart_repay(
                &self.config.ui,
                &self.config.page.to_string_lossy(),
            )),
        }
    }

    /// Run a scenario to completion or to its first failing step.
    ///
    /// Errors are returned only when the run could not start; step failures
    /// are reported in the [`RunReport`].
    pub async fn run(&self, scenario: &Scenario) -> E2eResult<RunReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        std::fs::create_dir_all(&self.config.screenshot_dir)?;
        std::fs::create_dir_all(&self.config.output_dir)?;

        info!("Running scenario '{}' ({} steps)", scenario.name, scenario.steps.len());

        let mut session = PlaywrightSession::launch(&self.config.playwright).await?;
        let mut progress = Progress::default();

        let outcome = self.run_steps(&mut session, &scenario.steps, &mut progress).await;
        let dialogs = session.dialog_log().to_vec();

        if let Err(e) = session.close().await {
            error!("Browser teardown failed: {}", e);
        }

        let mut artifacts = Vec::new();
        let outcome = outcome.and_then(|()| {
            for (name, path) in &progress.screenshots {
                artifacts.push(artifact::verify_screenshot(name, path)?);
            }
            Ok(())
        });

        let duration_ms = start.elapsed().as_millis() as u64;
        let report = RunReport {
            scenario: scenario.name.clone(),
            success: outcome.is_ok(),
            started_at,
            duration_ms,
            steps: progress.steps,
            dialogs,
            artifacts,
            error: outcome.err().map(|e| e.to_string()),
        };

        match &report.error {
            None => info!("✓ {} ({} ms)", report.scenario, duration_ms),
            Some(e) => error!("✗ {} - {}", report.scenario, e),
        }

        Ok(report)
    }

    async fn run_steps(
        &self,
        session: &mut PlaywrightSession,
        steps: &[Step],
        progress: &mut Progress,
    ) -> E2eResult<()> {
        for step in steps {
            match step {
                Step::WithDialogs { rules, steps: scoped } => {
                    let name = step.name();
                    let start = Instant::now();

                    session.install_dialogs(DialogScript::new(rules.iter().cloned()))?;
                    let mut outcome = Ok(());
                    for inner in scoped {
                        outcome = self.run_step(session, inner, progress).await;
                        if outcome.is_err() {
                            break;
                        }
                    }
                    // Rules never outlive their scope, even on failure
                    let finished = session.uninstall_dialogs();

                    outcome?;
                    progress.record(name, start, &finished);
                    finished?;
                }
                _ => self.run_step(session, step, progress).await?,
            }
        }
        Ok(())
    }

    async fn run_step(
        &self,
        session: &mut PlaywrightSession,
        step: &Step,
        progress: &mut Progress,
    ) -> E2eResult<()> {
        let name = step.name();
        let start = Instant::now();
        debug!("Executing step: {}", name);

        let outcome = match step {
            Step::Navigate { page, wait_until } => match resolve_page(page) {
                Ok(url) => session.goto(&url, *wait_until).await,
                Err(e) => Err(e),
            },
            Step::Select { selector, value } => session.select_option(selector, value).await,
            Step::Fill { selector, value } => session.fill(selector, value).await,
            Step::Invoke { panel, label } => {
                session.click(&playwright::action_selector(panel, label)).await
            }
            Step::AwaitOverlay { selector, timeout_ms } => {
                await_overlay(session, selector, *timeout_ms).await
            }
            Step::AwaitOptions { selector, sentinel, timeout_ms } => {
                session.wait_for_options(selector, sentinel, *timeout_ms).await
            }
            Step::Screenshot { name: shot, file, full_page } => {
                let path = absolute(&self.config.screenshot_dir.join(file))?;
                let outcome = session.screenshot(&path, *full_page).await;
                if outcome.is_ok() {
                    info!("Captured '{}' -> {}", shot, path.display());
                    progress.screenshots.push((shot.clone(), path));
                }
                outcome
            }
            Step::Log { message } => {
                info!("[SCENARIO] {}", message);
                Ok(())
            }
            Step::WithDialogs { .. } => Err(E2eError::SpecParse(
                "dialog scopes cannot be nested".to_string(),
            )),
        };

        let outcome = outcome.map_err(|e| match e {
            E2eError::Playwright(reason) => E2eError::StepFailed {
                step: name.clone(),
                reason,
            },
            other => other,
        });

        progress.record(name, start, &outcome);
        outcome
    }

    /// Write the run report as JSON
    pub fn write_report(&self, report: &RunReport) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("scenario-report.json");
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;

        info!("Report written to: {}", path.display());
        Ok(path)
    }
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// The overlay must appear, then disappear, within `timeout_ms` each
async fn await_overlay(
    session: &mut PlaywrightSession,
    selector: &str,
    timeout_ms: u64,
) -> E2eResult<()> {
    session
        .wait_for_selector(selector, WaitState::Visible, timeout_ms)
        .await?;
    session
        .wait_for_selector(selector, WaitState::Hidden, timeout_ms)
        .await
}

/// Turn a page reference into a URL; local paths must exist.
pub fn resolve_page(page: &str) -> E2eResult<String> {
    if page.contains("://") {
        return Ok(page.to_string());
    }

    let path = Path::new(page);
    let canonical = path
        .canonicalize()
        .map_err(|_| E2eError::PageNotFound(path.to_path_buf()))?;
    Ok(format!("file://{}", canonical.display()))
}

fn absolute(path: &Path) -> E2eResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::DialogRule;

    #[test]
    fn test_resolve_url_passthrough() {
        assert_eq!(
            resolve_page("http://127.0.0.1:8080/simulator.html").unwrap(),
            "http://127.0.0.1:8080/simulator.html"
        );
    }

    #[test]
    fn test_resolve_local_page() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("simulator.html");
        std::fs::write(&page, "<html></html>").unwrap();

        let url = resolve_page(&page.to_string_lossy()).unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("simulator.html"));
    }

    #[test]
    fn test_resolve_missing_page() {
        let err = resolve_page("/definitely/not/here/simulator.html").unwrap_err();
        assert!(matches!(err, E2eError::PageNotFound(_)));
    }

    #[test]
    fn test_default_directories() {
        let config = RunnerConfig::default();
        assert_eq!(config.screenshot_dir, PathBuf::from("jules-scratch/verification"));
        assert_eq!(config.output_dir, PathBuf::from("test-results"));
    }

    #[test]
    fn test_default_scenario_uses_configured_page() {
        let runner = ScenarioRunner::with_config(RunnerConfig {
            page: PathBuf::from("pages/simulator.html"),
            ..Default::default()
        });
        let scenario = runner.scenario().unwrap();
        assert!(matches!(
            &scenario.steps[0],
            Step::Navigate { page, .. } if page == "pages/simulator.html"
        ));
    }

    #[test]
    fn test_scenario_file_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("custom.yaml");
        std::fs::write(
            &file,
            "name: custom\nsteps:\n  - action: log\n    message: hello\n",
        )
        .unwrap();

        let runner = ScenarioRunner::with_config(RunnerConfig {
            scenario_file: Some(file),
            ..Default::default()
        });
        assert_eq!(runner.scenario().unwrap().name, "custom");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dialog_scope_removed_after_failed_step() {
        const HIDDEN_FAILS: &str = r#"
echo '{"type":"ready"}'
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"type":"command","id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"type":"close"'*) echo '{"type":"closed"}'; exit 0 ;;
    *'"state":"hidden"'*) echo "{\"type\":\"failed\",\"id\":$id,\"error\":\"overlay stuck\"}" ;;
    *) echo "{\"type\":\"done\",\"id\":$id}" ;;
  esac
done
"#;
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(HIDDEN_FAILS);
        let mut session = PlaywrightSession::spawn(cmd, std::time::Duration::from_secs(10))
            .await
            .unwrap();

        let runner = ScenarioRunner::new();
        let steps = vec![Step::WithDialogs {
            rules: vec![DialogRule::accept_next().with_label("swap confirmation")],
            steps: vec![
                Step::Invoke {
                    panel: "Repay borrowed funds".to_string(),
                    label: "Go".to_string(),
                },
                Step::AwaitOverlay {
                    selector: "#statusModalOverlay".to_string(),
                    timeout_ms: 60_000,
                },
            ],
        }];
        let mut progress = Progress::default();

        let err = runner
            .run_steps(&mut session, &steps, &mut progress)
            .await
            .unwrap_err();
        // The step failure wins over the unfired swap rule
        assert!(matches!(err, E2eError::StepFailed { ref reason, .. } if reason == "overlay stuck"));

        let names: Vec<&str> = progress.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["invoke:Repay borrowed funds/Go", "await_overlay:#statusModalOverlay"]
        );

        // A fresh scope installs cleanly, so the failed one was removed
        session.install_dialogs(DialogScript::default()).unwrap();
        session.close().await.unwrap();
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScenarioRunner::with_config(RunnerConfig {
            output_dir: dir.path().join("results"),
            ..Default::default()
        });
        let report = RunReport {
            scenario: "smart-repay".to_string(),
            success: false,
            started_at: Utc::now(),
            duration_ms: 12,
            steps: vec![StepResult {
                index: 0,
                name: "navigate:simulator.html".to_string(),
                success: false,
                duration_ms: 12,
                error: Some("Page not found: simulator.html".to_string()),
            }],
            dialogs: vec![],
            artifacts: vec![],
            error: Some("Page not found: simulator.html".to_string()),
        };

        let path = runner.write_report(&report).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["scenario"], "smart-repay");
        assert_eq!(value["success"], false);
        assert_eq!(value["steps"][0]["name"], "navigate:simulator.html");
    }
}
