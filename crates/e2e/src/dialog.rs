//! Expected-dialog rules for native `confirm`/`alert` prompts
//!
//! A scoped block of steps carries an ordered list of [`DialogRule`]s. The
//! runner turns them into a [`DialogScript`] before the first scoped step and
//! finishes it after the last one, so a rule can never answer a dialog that
//! belongs to a later step.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

/// How a dialog is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogAction {
    Accept,
    Dismiss,
}

impl DialogAction {
    pub fn accepts(self) -> bool {
        matches!(self, DialogAction::Accept)
    }
}

impl fmt::Display for DialogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogAction::Accept => f.write_str("accept"),
            DialogAction::Dismiss => f.write_str("dismiss"),
        }
    }
}

/// Whether a rule is consumed by the first dialog it answers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repeat {
    #[default]
    Once,
    Persistent,
}

/// One expected dialog: a case-insensitive message pattern and the answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogRule {
    /// Substring to look for; `None` matches any message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Answer when the pattern matches
    pub on_match: DialogAction,

    /// Answer when it does not
    #[serde(default = "default_otherwise")]
    pub otherwise: DialogAction,

    #[serde(default)]
    pub repeat: Repeat,

    /// What the dialog is expected to be about, for logs and reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

fn default_otherwise() -> DialogAction {
    DialogAction::Dismiss
}

impl DialogRule {
    /// Accept every dialog mentioning `keyword`, dismiss the rest.
    pub fn accept_if(keyword: impl Into<String>) -> Self {
        Self {
            pattern: Some(keyword.into()),
            on_match: DialogAction::Accept,
            otherwise: DialogAction::Dismiss,
            repeat: Repeat::Persistent,
            label: None,
        }
    }

    /// Accept exactly the next dialog, whatever it says.
    pub fn accept_next() -> Self {
        Self {
            pattern: None,
            on_match: DialogAction::Accept,
            otherwise: DialogAction::Accept,
            repeat: Repeat::Once,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn matches(&self, message: &str) -> bool {
        match &self.pattern {
            Some(pattern) => message.to_lowercase().contains(&pattern.to_lowercase()),
            None => true,
        }
    }

    pub fn action_for(&self, message: &str) -> DialogAction {
        if self.matches(message) {
            self.on_match
        } else {
            self.otherwise
        }
    }

    pub fn describe(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match &self.pattern {
            Some(pattern) => format!("dialog mentioning {:?}", pattern),
            None => "any dialog".to_string(),
        }
    }
}

/// A dialog the page raised and how it was answered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogRecord {
    pub kind: String,
    pub message: String,
    pub action: DialogAction,
    /// Rule that answered it; `None` when nothing was expecting it
    pub rule: Option<String>,
}

/// Rules installed for one scoped block, consumed front to back
#[derive(Debug, Clone, Default)]
pub struct DialogScript {
    rules: VecDeque<DialogRule>,
}

impl DialogScript {
    pub fn new(rules: impl IntoIterator<Item = DialogRule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Answer one dialog with the front rule.
    ///
    /// Returns the action and the rule description, suffixed with
    /// `(otherwise)` when the pattern did not match, or `None` when no rule
    /// is left to answer it.
    pub fn answer(&mut self, message: &str) -> Option<(DialogAction, String)> {
        let rule = self.rules.front()?;
        let action = rule.action_for(message);
        let description = if rule.matches(message) {
            rule.describe()
        } else {
            format!("{} (otherwise)", rule.describe())
        };

        if rule.repeat == Repeat::Once {
            self.rules.pop_front();
        }

        Some((action, description))
    }

    /// Rules that still expect a dialog
    pub fn outstanding(&self) -> impl Iterator<Item = &DialogRule> {
        self.rules.iter().filter(|r| r.repeat == Repeat::Once)
    }

    /// Close the scope; every `once` rule must have fired.
    pub fn finish(self) -> E2eResult<()> {
        let missing: Vec<String> = self.outstanding().map(DialogRule::describe).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(E2eError::MissingDialog {
                rules: missing.join(", "),
            })
        }
    }
}
