//! JSON-lines protocol spoken with the Playwright driver process
//!
//! One JSON object per line in each direction. The host sends a command and
//! reads events until the matching `done`/`failed`; `dialog` events may arrive
//! in between and are held open by the driver until the host answers them.

use serde::{Deserialize, Serialize};

/// Element state for `wait_for_selector`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    Attached,
    Detached,
    Visible,
    Hidden,
}

/// A page operation executed by the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Goto {
        url: String,
        wait_until: String,
        timeout_ms: u64,
    },
    SelectOption {
        selector: String,
        value: String,
        timeout_ms: u64,
    },
    Fill {
        selector: String,
        value: String,
        timeout_ms: u64,
    },
    Click {
        selector: String,
        timeout_ms: u64,
    },
    WaitForSelector {
        selector: String,
        state: WaitState,
        timeout_ms: u64,
    },
    WaitForFunction {
        expression: String,
        polling_ms: u64,
        timeout_ms: u64,
    },
    Screenshot {
        path: String,
        full_page: bool,
        timeout_ms: u64,
    },
}

impl Command {
    /// Time the driver may spend on this command before failing it
    pub fn timeout_ms(&self) -> u64 {
        match self {
            Command::Goto { timeout_ms, .. }
            | Command::SelectOption { timeout_ms, .. }
            | Command::Fill { timeout_ms, .. }
            | Command::Click { timeout_ms, .. }
            | Command::WaitForSelector { timeout_ms, .. }
            | Command::WaitForFunction { timeout_ms, .. }
            | Command::Screenshot { timeout_ms, .. } => *timeout_ms,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Command::Goto { url, .. } => format!("goto {}", url),
            Command::SelectOption { selector, value, .. } => {
                format!("select {:?} in {}", value, selector)
            }
            Command::Fill { selector, value, .. } => format!("fill {} with {:?}", selector, value),
            Command::Click { selector, .. } => format!("click {}", selector),
            Command::WaitForSelector { selector, state, .. } => {
                format!("{} to be {:?}", selector, state)
            }
            Command::WaitForFunction { .. } => "page condition".to_string(),
            Command::Screenshot { path, .. } => format!("screenshot {}", path),
        }
    }
}

/// Host → driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Command { id: u64, command: Command },
    DialogDecision { id: u64, accept: bool },
    Close,
}

/// Driver → host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverEvent {
    Ready,
    Done { id: u64 },
    Failed {
        id: u64,
        error: String,
        /// Playwright raised a `TimeoutError`
        #[serde(default)]
        timeout: bool,
    },
    Dialog { id: u64, kind: String, message: String },
    Closed,
    Fatal { error: String },
}

pub fn encode(message: &HostMessage) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

pub fn decode(line: &str) -> serde_json::Result<DriverEvent> {
    serde_json::from_str(line.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_shape() {
        let msg = HostMessage::Command {
            id: 3,
            command: Command::Click {
                selector: "div[aria-label=\"Tokenize funds\"] button:has-text(\"Go\")".to_string(),
                timeout_ms: 30_000,
            },
        };
        let line = encode(&msg).unwrap();

        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "command");
        assert_eq!(value["id"], 3);
        assert_eq!(value["command"]["op"], "click");
        assert_eq!(value["command"]["timeout_ms"], 30_000);
    }

    #[test]
    fn test_dialog_decision_wire_shape() {
        let line = encode(&HostMessage::DialogDecision { id: 0, accept: false }).unwrap();
        assert_eq!(line, "{\"type\":\"dialog_decision\",\"id\":0,\"accept\":false}\n");
    }

    #[test]
    fn test_decode_driver_events() {
        assert_eq!(decode("{\"type\":\"ready\"}\n").unwrap(), DriverEvent::Ready);
        assert_eq!(
            decode(r#"{"type":"dialog","id":1,"kind":"confirm","message":"Borrow 20000 USD?"}"#).unwrap(),
            DriverEvent::Dialog {
                id: 1,
                kind: "confirm".to_string(),
                message: "Borrow 20000 USD?".to_string(),
            }
        );
        assert_eq!(
            decode(r#"{"type":"failed","id":7,"error":"Timeout 60000ms exceeded"}"#).unwrap(),
            DriverEvent::Failed {
                id: 7,
                error: "Timeout 60000ms exceeded".to_string(),
                timeout: false,
            }
        );
    }

    #[test]
    fn test_decode_rejects_unknown_event() {
        assert!(decode(r#"{"type":"console","text":"hi"}"#).is_err());
        assert!(decode("Debugger listening on ws://").is_err());
    }

    #[test]
    fn test_wait_state_names() {
        let cmd = Command::WaitForSelector {
            selector: "#statusModalOverlay".to_string(),
            state: WaitState::Hidden,
            timeout_ms: 60_000,
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["op"], "wait_for_selector");
        assert_eq!(value["state"], "hidden");
        assert_eq!(cmd.timeout_ms(), 60_000);
    }
}
