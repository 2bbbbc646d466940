//! Driver session tests against a scripted stand-in for the Playwright driver
//!
//! The fake driver speaks the JSON-lines protocol from `sh`: `click` raises a
//! swap confirmation, `fill` raises a swap then a borrow prompt, and
//! `wait_for_selector` always times out.
#![cfg(unix)]

use std::time::Duration;

use tokio::process::Command;

use tokensim_e2e::dialog::{DialogAction, DialogRule, DialogScript};
use tokensim_e2e::playwright::PlaywrightSession;
use tokensim_e2e::protocol::WaitState;
use tokensim_e2e::E2eError;

const FAKE_DRIVER: &str = r#"
echo '{"type":"ready"}'
while IFS= read -r line; do
  case "$line" in
    *'"type":"close"'*)
      echo '{"type":"closed"}'
      exit 0
      ;;
  esac
  id=$(printf '%s\n' "$line" | sed -n 's/.*"type":"command","id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"op":"click"'*)
      echo '{"type":"dialog","id":0,"kind":"confirm","message":"Swap 30000 AUD into USD to repay?"}'
      IFS= read -r decision
      case "$decision" in
        *'"accept":true'*) echo "{\"type\":\"done\",\"id\":$id}" ;;
        *) echo "{\"type\":\"failed\",\"id\":$id,\"error\":\"swap dismissed\"}" ;;
      esac
      ;;
    *'"op":"fill"'*)
      echo '{"type":"dialog","id":1,"kind":"confirm","message":"Swap AUD into USD instead?"}'
      IFS= read -r first
      echo '{"type":"dialog","id":2,"kind":"confirm","message":"Borrow 20000 USD from the pool?"}'
      IFS= read -r second
      case "$first $second" in
        *'"accept":false'*'"accept":true'*) echo "{\"type\":\"done\",\"id\":$id}" ;;
        *) echo "{\"type\":\"failed\",\"id\":$id,\"error\":\"wrong decisions\"}" ;;
      esac
      ;;
    *'"op":"wait_for_selector"'*)
      echo "{\"type\":\"failed\",\"id\":$id,\"error\":\"Timeout 50ms exceeded.\",\"timeout\":true}"
      ;;
    *)
      echo "{\"type\":\"done\",\"id\":$id}"
      ;;
  esac
done
"#;

const STARTUP: Duration = Duration::from_secs(10);

async fn fake_session(script: &str) -> PlaywrightSession {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    PlaywrightSession::spawn(cmd, STARTUP)
        .await
        .expect("fake driver starts")
}

#[tokio::test]
async fn one_shot_rule_accepts_swap() {
    let mut session = fake_session(FAKE_DRIVER).await;
    session
        .install_dialogs(DialogScript::new([
            DialogRule::accept_next().with_label("swap confirmation")
        ]))
        .unwrap();

    session.click("#repay").await.unwrap();
    session.uninstall_dialogs().unwrap();

    let log = session.dialog_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, DialogAction::Accept);
    assert_eq!(log[0].rule.as_deref(), Some("swap confirmation"));
    assert_eq!(log[0].kind, "confirm");

    session.close().await.unwrap();
}

#[tokio::test]
async fn keyword_rule_declines_swap_and_accepts_borrow() {
    let mut session = fake_session(FAKE_DRIVER).await;
    session
        .install_dialogs(DialogScript::new([DialogRule::accept_if("borrow")]))
        .unwrap();

    session.fill("input#transferAmount", "20000").await.unwrap();
    session.uninstall_dialogs().unwrap();

    let actions: Vec<DialogAction> = session.dialog_log().iter().map(|r| r.action).collect();
    assert_eq!(actions, [DialogAction::Dismiss, DialogAction::Accept]);

    let rules: Vec<Option<&str>> = session.dialog_log().iter().map(|r| r.rule.as_deref()).collect();
    assert_eq!(
        rules,
        [
            Some("dialog mentioning \"borrow\" (otherwise)"),
            Some("dialog mentioning \"borrow\""),
        ]
    );

    session.close().await.unwrap();
}

#[tokio::test]
async fn dialog_without_rule_fails_the_command() {
    let mut session = fake_session(FAKE_DRIVER).await;

    let err = session.click("#repay").await.unwrap_err();
    match err {
        E2eError::UnexpectedDialog { message } => assert!(message.contains("Swap")),
        other => panic!("expected UnexpectedDialog, got {:?}", other),
    }

    let log = session.dialog_log();
    assert_eq!(log[0].action, DialogAction::Dismiss);
    assert!(log[0].rule.is_none());
}

#[tokio::test]
async fn dismissed_dialog_surfaces_driver_failure() {
    let mut session = fake_session(FAKE_DRIVER).await;
    session
        .install_dialogs(DialogScript::new([DialogRule::accept_if("borrow")]))
        .unwrap();

    let err = session.click("#repay").await.unwrap_err();
    assert!(matches!(err, E2eError::Playwright(ref msg) if msg == "swap dismissed"));
}

#[tokio::test]
async fn unanswered_expectation_fails_on_uninstall() {
    let mut session = fake_session(FAKE_DRIVER).await;
    session
        .install_dialogs(DialogScript::new([
            DialogRule::accept_next().with_label("swap confirmation")
        ]))
        .unwrap();

    session.select_option("select#repayParticipant", "London").await.unwrap();

    let err = session.uninstall_dialogs().unwrap_err();
    assert!(matches!(err, E2eError::MissingDialog { ref rules } if rules == "swap confirmation"));

    // The scope is gone either way
    session
        .install_dialogs(DialogScript::new([DialogRule::accept_next()]))
        .unwrap();
}

#[tokio::test]
async fn nested_scopes_are_rejected() {
    let mut session = fake_session(FAKE_DRIVER).await;
    session
        .install_dialogs(DialogScript::new([DialogRule::accept_next()]))
        .unwrap();

    assert!(session
        .install_dialogs(DialogScript::new([DialogRule::accept_next()]))
        .is_err());
}

#[tokio::test]
async fn playwright_timeout_is_classified() {
    let mut session = fake_session(FAKE_DRIVER).await;

    let err = session
        .wait_for_selector("#statusModalOverlay", WaitState::Hidden, 50)
        .await
        .unwrap_err();
    assert!(matches!(err, E2eError::Timeout(ref what) if what.contains("#statusModalOverlay")));
}

#[tokio::test]
async fn consecutive_commands_match_their_replies() {
    let mut session = fake_session(FAKE_DRIVER).await;

    session.select_option("select#sender", "Sydney").await.unwrap();
    session.select_option("select#receiver", "London").await.unwrap();
    session.select_option("select#transferCurrency", "AUD").await.unwrap();
    assert!(session.dialog_log().is_empty());

    session.close().await.unwrap();
}

#[tokio::test]
async fn driver_fatal_at_startup() {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(r#"echo '{"type":"fatal","error":"browserType.launch: Executable does not exist"}'"#);

    let err = PlaywrightSession::spawn(cmd, STARTUP).await.err().unwrap();
    assert!(matches!(err, E2eError::Playwright(ref msg) if msg.contains("Executable")));
}

#[tokio::test]
async fn driver_exit_is_an_error() {
    let mut session = fake_session(r#"echo '{"type":"ready"}'"#).await;

    let err = session.click("#anything").await.unwrap_err();
    assert!(matches!(err, E2eError::DriverExited | E2eError::Io(_)));
}
