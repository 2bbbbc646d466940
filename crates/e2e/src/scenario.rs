//! Declarative scenario model and the built-in smart repay scenario

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dialog::DialogRule;
use crate::error::{E2eError, E2eResult};
use crate::simulator::{Currency, Operation, Participant, SimulatorUi};

/// A named, ordered list of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub steps: Vec<Step>,
}

/// Page load milestone to wait for after navigation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    #[serde(rename = "load")]
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[default]
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

/// A single step in a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Load a page: a URL, or a local file path resolved by the runner
    Navigate {
        page: String,
        #[serde(default)]
        wait_until: LoadState,
    },

    /// Choose an option of a dropdown
    Select { selector: String, value: String },

    /// Replace an input's content
    Fill { selector: String, value: String },

    /// Click the labeled button inside an `aria-label`ed action panel
    Invoke { panel: String, label: String },

    /// Wait for the busy overlay to appear, then to go away
    AwaitOverlay {
        selector: String,
        #[serde(default = "default_overlay_timeout")]
        timeout_ms: u64,
    },

    /// Poll until a dropdown's first option is a real entry
    AwaitOptions {
        selector: String,
        sentinel: String,
        #[serde(default = "default_options_timeout")]
        timeout_ms: u64,
    },

    /// Run nested steps with dialog rules installed
    WithDialogs {
        rules: Vec<DialogRule>,
        steps: Vec<Step>,
    },

    /// Take a screenshot
    Screenshot {
        name: String,
        file: String,
        #[serde(default = "default_full_page")]
        full_page: bool,
    },

    /// Log a message
    Log { message: String },
}

fn default_overlay_timeout() -> u64 {
    60_000
}

fn default_options_timeout() -> u64 {
    30_000
}

fn default_full_page() -> bool {
    true
}

impl Step {
    pub fn select(selector: impl Into<String>, value: impl Into<String>) -> Self {
        Step::Select {
            selector: selector.into(),
            value: value.into(),
        }
    }

    pub fn fill(selector: impl Into<String>, value: impl Into<String>) -> Self {
        Step::Fill {
            selector: selector.into(),
            value: value.into(),
        }
    }

    pub fn screenshot(name: impl Into<String>, file: impl Into<String>) -> Self {
        Step::Screenshot {
            name: name.into(),
            file: file.into(),
            full_page: true,
        }
    }

    /// Short name used in logs and step results
    pub fn name(&self) -> String {
        match self {
            Step::Navigate { page, .. } => format!("navigate:{}", page),
            Step::Select { selector, value } => format!("select:{}={}", selector, value),
            Step::Fill { selector, value } => format!("fill:{}={}", selector, value),
            Step::Invoke { panel, label } => format!("invoke:{}/{}", panel, label),
            Step::AwaitOverlay { selector, .. } => format!("await_overlay:{}", selector),
            Step::AwaitOptions { selector, .. } => format!("await_options:{}", selector),
            Step::WithDialogs { rules, .. } => format!("with_dialogs:{}", rules.len()),
            Step::Screenshot { name, .. } => format!("screenshot:{}", name),
            Step::Log { message } => {
                let end = message
                    .char_indices()
                    .nth(30)
                    .map(|(i, _)| i)
                    .unwrap_or(message.len());
                format!("log:{}", &message[..end])
            }
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl Scenario {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Scenario = serde_yaml::from_str(yaml)?;
        if scenario.steps.is_empty() {
            return Err(E2eError::SpecParse(format!(
                "scenario '{}' has no steps",
                scenario.name
            )));
        }
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn to_yaml(&self) -> E2eResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Screenshot steps at any nesting depth, in execution order
    pub fn screenshots(&self) -> Vec<&Step> {
        fn collect<'a>(steps: &'a [Step], out: &mut Vec<&'a Step>) {
            for step in steps {
                match step {
                    Step::Screenshot { .. } => out.push(step),
                    Step::WithDialogs { steps, .. } => collect(steps, out),
                    _ => {}
                }
            }
        }

        let mut out = Vec::new();
        collect(&self.steps, &mut out);
        out
    }

    /// Tokenize and lend in setup, then repay London's USD loan with a swap.
    pub fn smart_repay(ui: &SimulatorUi, page: &str) -> Self {
        let mut steps = vec![Step::Navigate {
            page: page.to_string(),
            wait_until: LoadState::NetworkIdle,
        }];

        // Sydney funds London in AUD so the repay can swap from it
        steps.extend(
            Operation::Tokenize {
                participant: Participant::Sydney,
                currency: Currency::Aud,
                amount: 100_000,
            }
            .steps(ui, vec![]),
        );
        steps.extend(
            Operation::Transfer {
                sender: Participant::Sydney,
                receiver: Participant::London,
                currency: Currency::Aud,
                amount: 100_000,
            }
            .steps(ui, vec![]),
        );

        // Dubai's USD is the borrowable pool
        steps.extend(
            Operation::Tokenize {
                participant: Participant::Dubai,
                currency: Currency::Usd,
                amount: 500_000,
            }
            .steps(ui, vec![]),
        );

        // London has no USD: decline the offered swap, accept the borrow
        steps.extend(
            Operation::Transfer {
                sender: Participant::London,
                receiver: Participant::NewYork,
                currency: Currency::Usd,
                amount: 20_000,
            }
            .steps(
                ui,
                vec![DialogRule::accept_if("borrow").with_label("borrow confirmation")],
            ),
        );

        steps.push(Step::screenshot("setup complete", "01_setup_complete.png"));

        // Full outstanding amount; London pays by swapping AUD
        steps.extend(
            Operation::Repay {
                participant: Participant::London,
                currency: Currency::Usd,
                loan: None,
                amount: 20_000,
            }
            .steps(
                ui,
                vec![DialogRule::accept_next().with_label("swap confirmation")],
            ),
        );

        steps.push(Step::screenshot("after smart repay", "02_after_smart_repay.png"));

        Scenario {
            name: "smart-repay".to_string(),
            description: "Borrow USD for London against Dubai's pool, then repay it by accepting a swap"
                .to_string(),
            steps,
        }
    }
}
