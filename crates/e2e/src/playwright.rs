//! Playwright browser automation
//!
//! The browser is driven by a generated Node script that keeps one page open
//! and executes [`Command`]s received on stdin. Dialogs raised by the page are
//! forwarded to the host and held open until a [`DialogScript`] answers them.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use regex::Regex;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::dialog::{DialogAction, DialogRecord, DialogScript};
use crate::error::{E2eError, E2eResult};
use crate::protocol::{self, Command, DriverEvent, HostMessage, WaitState};
use crate::scenario::LoadState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Node executable running the driver script
    pub node_binary: PathBuf,

    /// `NODE_PATH` for resolving the `playwright` package
    pub node_path: Option<PathBuf>,

    /// Probe `npx playwright --version` before launching
    pub probe: bool,

    /// Timeout for select, fill and click
    pub action_timeout_ms: u64,

    /// Timeout for navigation and screenshots
    pub navigation_timeout_ms: u64,

    /// How long the driver may take to report ready
    pub startup_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: PathBuf::from("node"),
            node_path: None,
            probe: true,
            action_timeout_ms: 30_000,
            navigation_timeout_ms: 30_000,
            startup_timeout: Duration::from_secs(60),
        }
    }
}

/// Extra time granted on top of a command's own timeout before the driver
/// is considered wedged
const COMMAND_GRACE: Duration = Duration::from_secs(5);

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

const OPTIONS_POLL_MS: u64 = 100;

const DRIVER_TEMPLATE: &str = r#"
const readline = require('readline');
const { chromium, firefox, webkit } = require('playwright');

const emit = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

(async () => {
  const browser = await __BROWSER__.launch({ headless: __HEADLESS__ });
  const context = await browser.newContext({
    viewport: { width: __WIDTH__, height: __HEIGHT__ }
  });
  const page = await context.newPage();

  const pendingDialogs = new Map();
  let nextDialog = 0;

  page.on('dialog', async (dialog) => {
    const id = nextDialog++;
    const decision = new Promise((resolve) => pendingDialogs.set(id, resolve));
    emit({ type: 'dialog', id, kind: dialog.type(), message: dialog.message() });
    if (await decision) {
      await dialog.accept();
    } else {
      await dialog.dismiss();
    }
  });

  const ops = {
    goto: (c) => page.goto(c.url, { waitUntil: c.wait_until, timeout: c.timeout_ms }),
    select_option: (c) => page.selectOption(c.selector, c.value, { timeout: c.timeout_ms }),
    fill: (c) => page.fill(c.selector, c.value, { timeout: c.timeout_ms }),
    click: (c) => page.locator(c.selector).click({ timeout: c.timeout_ms }),
    wait_for_selector: (c) => page.waitForSelector(c.selector, { state: c.state, timeout: c.timeout_ms }),
    wait_for_function: (c) => page.waitForFunction(c.expression, null, { polling: c.polling_ms, timeout: c.timeout_ms }),
    screenshot: (c) => page.screenshot({ path: c.path, fullPage: c.full_page, timeout: c.timeout_ms }),
  };

  let queue = Promise.resolve();
  const shutdown = async () => {
    await browser.close();
    emit({ type: 'closed' });
    process.exit(0);
  };

  const rl = readline.createInterface({ input: process.stdin });
  rl.on('line', (line) => {
    let msg;
    try {
      msg = JSON.parse(line);
    } catch (e) {
      emit({ type: 'fatal', error: 'unparseable host message: ' + line });
      return;
    }
    if (msg.type === 'dialog_decision') {
      const resolve = pendingDialogs.get(msg.id);
      pendingDialogs.delete(msg.id);
      if (resolve) resolve(msg.accept);
      return;
    }
    if (msg.type === 'close') {
      queue = queue.then(shutdown);
      return;
    }
    queue = queue.then(async () => {
      const op = ops[msg.command.op];
      try {
        if (!op) throw new Error('unknown op ' + msg.command.op);
        await op(msg.command);
        emit({ type: 'done', id: msg.id });
      } catch (e) {
        emit({
          type: 'failed',
          id: msg.id,
          error: String((e && e.message) || e),
          timeout: !!e && e.name === 'TimeoutError',
        });
      }
    });
  });
  rl.on('close', () => { queue = queue.then(shutdown); });

  emit({ type: 'ready' });
})().catch((e) => {
  emit({ type: 'fatal', error: String((e && e.message) || e) });
  process.exit(1);
});
"#;

/// Build the driver script for a configuration
pub fn build_script(config: &PlaywrightConfig) -> String {
    DRIVER_TEMPLATE
        .replace("__BROWSER__", config.browser.as_str())
        .replace("__HEADLESS__", if config.headless { "true" } else { "false" })
        .replace("__WIDTH__", &config.viewport_width.to_string())
        .replace("__HEIGHT__", &config.viewport_height.to_string())
}

/// Check that Playwright is installed and return its version
pub fn check_playwright_installed() -> E2eResult<String> {
    let output = std::process::Command::new("npx")
        .args(["playwright", "--version"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let text = String::from_utf8_lossy(&out.stdout);
            Ok(parse_version(&text).unwrap_or_else(|| text.trim().to_string()))
        }
        _ => Err(E2eError::PlaywrightNotFound),
    }
}

fn parse_version(output: &str) -> Option<String> {
    let re = Regex::new(r"Version\s+(\d+\.\d+\.\d+)").ok()?;
    re.captures(output).map(|caps| caps[1].to_string())
}

/// Selector of the labeled button inside an `aria-label`ed action panel
pub fn action_selector(panel: &str, label: &str) -> String {
    format!(
        r#"div[aria-label="{}"] button:has-text("{}")"#,
        panel.replace('"', "\\\""),
        label.replace('"', "\\\"")
    )
}

/// Page expression that holds once a dropdown's first option is a real entry
pub fn options_ready_expression(selector: &str, sentinel: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({}); \
         return !!el && el.options.length > 0 && el.options[0].value !== {}; }})()",
        serde_json::Value::from(selector),
        serde_json::Value::from(sentinel)
    )
}

/// One browser with one page, commanded over the driver protocol
pub struct PlaywrightSession {
    child: Child,
    writer: BufWriter<ChildStdin>,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    action_timeout_ms: u64,
    navigation_timeout_ms: u64,

    /// Rules for the current dialog scope
    dialogs: Option<DialogScript>,

    /// Every dialog seen so far
    dialog_log: Vec<DialogRecord>,

    _script_dir: Option<TempDir>,
}

impl PlaywrightSession {
    /// Write the driver script and start a browser
    pub async fn launch(config: &PlaywrightConfig) -> E2eResult<Self> {
        if config.probe {
            let version = check_playwright_installed()?;
            info!("Using Playwright {}", version);
        }

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("driver.js");
        std::fs::write(&script_path, build_script(config))?;

        debug!("Driver script: {}", script_path.display());

        let mut cmd = TokioCommand::new(&config.node_binary);
        cmd.arg(&script_path);
        if let Some(node_path) = &config.node_path {
            cmd.env("NODE_PATH", node_path);
        }

        info!(
            "Launching {} ({})",
            config.browser.as_str(),
            if config.headless { "headless" } else { "headed" }
        );

        let mut session = Self::spawn(cmd, config.startup_timeout).await?;
        session.action_timeout_ms = config.action_timeout_ms;
        session.navigation_timeout_ms = config.navigation_timeout_ms;
        session._script_dir = Some(script_dir);
        Ok(session)
    }

    /// Start any process speaking the driver protocol and wait for `ready`
    pub async fn spawn(mut cmd: TokioCommand, startup_timeout: Duration) -> E2eResult<Self> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("Failed to spawn driver: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("Failed to get driver stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("Failed to get driver stdout".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        let defaults = PlaywrightConfig::default();
        let mut session = Self {
            child,
            writer: BufWriter::new(stdin),
            lines: BufReader::new(stdout).lines(),
            next_id: 1,
            action_timeout_ms: defaults.action_timeout_ms,
            navigation_timeout_ms: defaults.navigation_timeout_ms,
            dialogs: None,
            dialog_log: Vec::new(),
            _script_dir: None,
        };

        let first = timeout(startup_timeout, session.next_event()).await;
        match first {
            Ok(Ok(DriverEvent::Ready)) => Ok(session),
            Ok(Ok(DriverEvent::Fatal { error })) => Err(E2eError::Playwright(error)),
            Ok(Ok(other)) => Err(E2eError::Protocol(format!(
                "expected ready, got {:?}",
                other
            ))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(E2eError::Timeout("driver startup".to_string())),
        }
    }

    async fn send(&mut self, message: &HostMessage) -> E2eResult<()> {
        let line = protocol::encode(message)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn next_event(&mut self) -> E2eResult<DriverEvent> {
        loop {
            let line = self.lines.next_line().await?.ok_or(E2eError::DriverExited)?;
            if line.trim().is_empty() {
                continue;
            }
            match protocol::decode(&line) {
                Ok(event) => return Ok(event),
                Err(_) => debug!(target: "driver", "{}", line),
            }
        }
    }

    /// Execute one command, answering dialogs until it completes
    pub async fn execute(&mut self, command: Command) -> E2eResult<()> {
        let id = self.next_id;
        self.next_id += 1;

        let what = command.describe();
        let until = Instant::now() + Duration::from_millis(command.timeout_ms()) + COMMAND_GRACE;

        debug!("-> #{} {}", id, what);
        self.send(&HostMessage::Command { id, command }).await?;

        let mut unexpected: Option<String> = None;

        loop {
            let event = match timeout_at(until, self.next_event()).await {
                Ok(event) => event?,
                Err(_) => return Err(E2eError::Timeout(what)),
            };

            match event {
                DriverEvent::Done { id: done } if done == id => break,
                DriverEvent::Failed { id: failed, error, timeout: timed_out } if failed == id => {
                    if let Some(message) = unexpected {
                        return Err(E2eError::UnexpectedDialog { message });
                    }
                    return Err(if timed_out {
                        E2eError::Timeout(format!("{} ({})", what, error))
                    } else {
                        E2eError::Playwright(error)
                    });
                }
                DriverEvent::Dialog { id: dialog, kind, message } => {
                    if !self.answer_dialog(dialog, kind, message.clone()).await? {
                        unexpected.get_or_insert(message);
                    }
                }
                DriverEvent::Fatal { error } => return Err(E2eError::Playwright(error)),
                DriverEvent::Closed => return Err(E2eError::DriverExited),
                other => warn!("Ignoring driver event out of sequence: {:?}", other),
            }
        }

        debug!("<- #{} done", id);

        match unexpected {
            Some(message) => Err(E2eError::UnexpectedDialog { message }),
            None => Ok(()),
        }
    }

    /// Answer a dialog from the installed rules; `false` if none expected it
    async fn answer_dialog(&mut self, id: u64, kind: String, message: String) -> E2eResult<bool> {
        let answer = self.dialogs.as_mut().and_then(|script| script.answer(&message));

        let (action, rule) = match answer {
            Some((action, rule)) => {
                info!("{} dialog {:?} -> {} ({})", kind, message, action, rule);
                (action, Some(rule))
            }
            None => {
                warn!("Unexpected {} dialog {:?}, dismissing", kind, message);
                (DialogAction::Dismiss, None)
            }
        };

        self.send(&HostMessage::DialogDecision {
            id,
            accept: action.accepts(),
        })
        .await?;

        let handled = rule.is_some();
        self.dialog_log.push(DialogRecord {
            kind,
            message,
            action,
            rule,
        });
        Ok(handled)
    }

    /// Install the rules for a dialog scope
    pub fn install_dialogs(&mut self, script: DialogScript) -> E2eResult<()> {
        if self.dialogs.is_some() {
            return Err(E2eError::SpecParse(
                "dialog scopes cannot be nested".to_string(),
            ));
        }
        self.dialogs = Some(script);
        Ok(())
    }

    /// Remove the current scope's rules; fails if an expected dialog never came
    pub fn uninstall_dialogs(&mut self) -> E2eResult<()> {
        match self.dialogs.take() {
            Some(script) => script.finish(),
            None => Ok(()),
        }
    }

    pub fn dialog_log(&self) -> &[DialogRecord] {
        &self.dialog_log
    }

    pub async fn goto(&mut self, url: &str, wait_until: LoadState) -> E2eResult<()> {
        let timeout_ms = self.navigation_timeout_ms;
        self.execute(Command::Goto {
            url: url.to_string(),
            wait_until: wait_until.as_str().to_string(),
            timeout_ms,
        })
        .await
    }

    pub async fn select_option(&mut self, selector: &str, value: &str) -> E2eResult<()> {
        let timeout_ms = self.action_timeout_ms;
        self.execute(Command::SelectOption {
            selector: selector.to_string(),
            value: value.to_string(),
            timeout_ms,
        })
        .await
    }

    pub async fn fill(&mut self, selector: &str, value: &str) -> E2eResult<()> {
        let timeout_ms = self.action_timeout_ms;
        self.execute(Command::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
            timeout_ms,
        })
        .await
    }

    pub async fn click(&mut self, selector: &str) -> E2eResult<()> {
        let timeout_ms = self.action_timeout_ms;
        self.execute(Command::Click {
            selector: selector.to_string(),
            timeout_ms,
        })
        .await
    }

    pub async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: WaitState,
        timeout_ms: u64,
    ) -> E2eResult<()> {
        self.execute(Command::WaitForSelector {
            selector: selector.to_string(),
            state,
            timeout_ms,
        })
        .await
    }

    /// Wait for a dropdown to hold a non-sentinel first option
    pub async fn wait_for_options(
        &mut self,
        selector: &str,
        sentinel: &str,
        timeout_ms: u64,
    ) -> E2eResult<()> {
        self.execute(Command::WaitForFunction {
            expression: options_ready_expression(selector, sentinel),
            polling_ms: OPTIONS_POLL_MS,
            timeout_ms,
        })
        .await
    }

    pub async fn screenshot(&mut self, path: &std::path::Path, full_page: bool) -> E2eResult<()> {
        let timeout_ms = self.navigation_timeout_ms;
        self.execute(Command::Screenshot {
            path: path.to_string_lossy().to_string(),
            full_page,
            timeout_ms,
        })
        .await
    }

    /// Close the browser and stop the driver
    pub async fn close(mut self) -> E2eResult<()> {
        info!("Closing browser");

        if self.send(&HostMessage::Close).await.is_ok() {
            let closed = timeout(CLOSE_TIMEOUT, async {
                loop {
                    match self.next_event().await {
                        Ok(DriverEvent::Closed) | Err(_) => break,
                        Ok(_) => continue,
                    }
                }
            })
            .await;

            if closed.is_ok() {
                if let Ok(Ok(status)) = timeout(CLOSE_TIMEOUT, self.child.wait()).await {
                    debug!("Driver exited with {}", status);
                    return Ok(());
                }
            }
        }

        self.terminate().await
    }

    async fn terminate(&mut self) -> E2eResult<()> {
        warn!("Driver did not exit cleanly, terminating");

        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                sleep(Duration::from_millis(500)).await;
            }
        }

        // Force kill if still running
        let _ = self.child.start_kill();
        self.child.wait().await?;
        Ok(())
    }
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "driver", "{}", line);
    }
}
