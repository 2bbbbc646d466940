//! Tokenized funds simulator E2E runner
//!
//! This crate drives the simulator page through a fixed scenario:
//! - Launches a browser through a Playwright driver process
//! - Fills and submits the tokenize, transfer and repay panels
//! - Answers native dialogs from explicit, scoped expectations
//! - Captures and verifies screenshots at checkpoints
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Scenario Runner (Rust)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner                                             │
//! │    ├── PlaywrightSession::launch() -> node driver.js        │
//! │    ├── run(scenario: Scenario) -> RunReport                 │
//! │    └── verify_screenshot(name, path) -> Artifact            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario                                                   │
//! │    └── steps: [Step]                                        │
//! │          ├── navigate { page }                              │
//! │          ├── select / fill { selector, value }              │
//! │          ├── invoke { panel, label }                        │
//! │          ├── await_overlay { selector, timeout_ms }         │
//! │          ├── await_options { selector, sentinel }           │
//! │          ├── with_dialogs { rules: [DialogRule], steps }    │
//! │          └── screenshot { name, file }                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Driver protocol (JSON lines over stdio)                    │
//! │    host → command | dialog_decision | close                 │
//! │    driver → ready | done | failed | dialog | closed         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod artifact;
pub mod dialog;
pub mod error;
pub mod playwright;
pub mod protocol;
pub mod runner;
pub mod scenario;
pub mod simulator;

pub use dialog::{DialogAction, DialogRule, DialogScript};
pub use error::{E2eError, E2eResult};
pub use runner::{RunReport, RunnerConfig, ScenarioRunner};
pub use scenario::{Scenario, Step};
