//! UI surface of the tokenized funds simulator page
//!
//! The page owns every balance and loan; the runner only knows the controls
//! that drive it. [`SimulatorUi`] names those controls and [`Operation`]
//! expands a tokenize, transfer or repay request into scenario steps.

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::dialog::DialogRule;
use crate::error::E2eResult;
use crate::scenario::Step;

/// A simulator participant, selected by its display name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    Sydney,
    London,
    Dubai,
    NewYork,
}

impl Participant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Participant::Sydney => "Sydney",
            Participant::London => "London",
            Participant::Dubai => "Dubai",
            Participant::NewYork => "New York",
        }
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Aud,
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Aud => "AUD",
            Currency::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selectors and labels of the simulator page
///
/// Loadable from YAML; missing keys keep the stock page's values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimulatorUi {
    pub tokenize_panel: String,
    pub tokenize_participant: String,
    pub tokenize_currency: String,
    pub tokenize_amount: String,

    pub transfer_panel: String,
    pub transfer_sender: String,
    pub transfer_receiver: String,
    pub transfer_currency: String,
    pub transfer_amount: String,

    pub repay_panel: String,
    pub repay_participant: String,
    pub repay_currency: String,
    pub repay_loan: String,
    pub repay_amount: String,

    /// Visible text of the button inside every action panel
    pub action_label: String,

    /// Busy overlay shown while an operation runs
    pub status_overlay: String,

    /// Option value the loan selector shows when there is nothing to repay
    pub no_loans_sentinel: String,

    pub overlay_timeout_ms: u64,
    pub options_timeout_ms: u64,
}

impl Default for SimulatorUi {
    fn default() -> Self {
        Self {
            tokenize_panel: "Tokenize funds".to_string(),
            tokenize_participant: "select#tokenizeParticipant".to_string(),
            tokenize_currency: "select#tokenizeCurrency".to_string(),
            tokenize_amount: "input#tokenizeAmount".to_string(),

            transfer_panel: "Transfer tokens".to_string(),
            transfer_sender: "select#sender".to_string(),
            transfer_receiver: "select#receiver".to_string(),
            transfer_currency: "select#transferCurrency".to_string(),
            transfer_amount: "input#transferAmount".to_string(),

            repay_panel: "Repay borrowed funds".to_string(),
            repay_participant: "select#repayParticipant".to_string(),
            repay_currency: "select#repayCurrency".to_string(),
            repay_loan: "select#repayLoanId".to_string(),
            repay_amount: "input#repayAmount".to_string(),

            action_label: "Go".to_string(),
            status_overlay: "#statusModalOverlay".to_string(),
            no_loans_sentinel: "No outstanding loans".to_string(),

            overlay_timeout_ms: 60_000,
            options_timeout_ms: 30_000,
        }
    }
}

impl SimulatorUi {
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load selector overrides from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

/// A simulator operation driven through its action panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Tokenize {
        participant: Participant,
        currency: Currency,
        amount: u64,
    },
    Transfer {
        sender: Participant,
        receiver: Participant,
        currency: Currency,
        amount: u64,
    },
    Repay {
        participant: Participant,
        currency: Currency,
        /// Loan to settle; the page preselects the first one when `None`
        loan: Option<String>,
        amount: u64,
    },
}

impl Operation {
    fn panel<'a>(&self, ui: &'a SimulatorUi) -> &'a str {
        match self {
            Operation::Tokenize { .. } => &ui.tokenize_panel,
            Operation::Transfer { .. } => &ui.transfer_panel,
            Operation::Repay { .. } => &ui.repay_panel,
        }
    }

    /// Steps that fill the operation's form
    pub fn form_steps(&self, ui: &SimulatorUi) -> Vec<Step> {
        match self {
            Operation::Tokenize { participant, currency, amount } => vec![
                Step::select(&ui.tokenize_participant, participant.as_str()),
                Step::select(&ui.tokenize_currency, currency.as_str()),
                Step::fill(&ui.tokenize_amount, amount.to_string()),
            ],
            Operation::Transfer { sender, receiver, currency, amount } => vec![
                Step::select(&ui.transfer_sender, sender.as_str()),
                Step::select(&ui.transfer_receiver, receiver.as_str()),
                Step::select(&ui.transfer_currency, currency.as_str()),
                Step::fill(&ui.transfer_amount, amount.to_string()),
            ],
            Operation::Repay { participant, currency, loan, amount } => {
                let mut steps = vec![
                    Step::select(&ui.repay_participant, participant.as_str()),
                    Step::select(&ui.repay_currency, currency.as_str()),
                    // The loan list is rebuilt after participant/currency change
                    Step::AwaitOptions {
                        selector: ui.repay_loan.clone(),
                        sentinel: ui.no_loans_sentinel.clone(),
                        timeout_ms: ui.options_timeout_ms,
                    },
                ];
                if let Some(loan) = loan {
                    steps.push(Step::select(&ui.repay_loan, loan));
                }
                steps.push(Step::fill(&ui.repay_amount, amount.to_string()));
                steps
            }
        }
    }

    /// Click the panel's action button and wait out the busy overlay
    pub fn submit_steps(&self, ui: &SimulatorUi) -> Vec<Step> {
        vec![
            Step::Invoke {
                panel: self.panel(ui).to_string(),
                label: ui.action_label.clone(),
            },
            Step::AwaitOverlay {
                selector: ui.status_overlay.clone(),
                timeout_ms: ui.overlay_timeout_ms,
            },
        ]
    }

    /// Full step list; submission is scoped by `dialogs` when any are given
    pub fn steps(&self, ui: &SimulatorUi, dialogs: Vec<DialogRule>) -> Vec<Step> {
        let mut steps = vec![Step::Log {
            message: self.to_string(),
        }];
        steps.extend(self.form_steps(ui));

        if dialogs.is_empty() {
            steps.extend(self.submit_steps(ui));
        } else {
            steps.push(Step::WithDialogs {
                rules: dialogs,
                steps: self.submit_steps(ui),
            });
        }
        steps
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Tokenize { participant, currency, amount } => {
                write!(f, "tokenize {} {} for {}", amount, currency, participant)
            }
            Operation::Transfer { sender, receiver, currency, amount } => {
                write!(f, "transfer {} {} from {} to {}", amount, currency, sender, receiver)
            }
            Operation::Repay { participant, currency, amount, .. } => {
                write!(f, "repay {} {} for {}", amount, currency, participant)
            }
        }
    }
}
