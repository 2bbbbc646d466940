//! Error types for E2E scenario runs

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Driver process exited before answering")]
    DriverExited,

    #[error("Driver protocol error: {0}")]
    Protocol(String),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Unexpected dialog: {message:?}")]
    UnexpectedDialog { message: String },

    #[error("Expected dialog(s) never appeared: {rules}")]
    MissingDialog { rules: String },

    #[error("Page not found: {}", .0.display())]
    PageNotFound(PathBuf),

    #[error("Artifact check failed: {0}")]
    Artifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type E2eResult<T> = Result<T, E2eError>;
