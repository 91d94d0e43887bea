//! Challenge evaluation.
//!
//! Verifies the caller's answer for the selected mode and turns the raw
//! verdict into the session-level outcome (next step, retry budget, final
//! grant). Out-of-band modes wait on a timer raced against the evaluation's
//! [`CancelToken`].

use crate::config::BrokerConfig;
use crate::error::{BrokerError, Result};
use crate::inflight::CancelToken;
use crate::layout::{AuthData, UiLayout};
use crate::modes::ModeKind;
use crate::state::{AuthAccess, AuthResult, Session};
use crate::userinfo::UserInfo;
use std::time::Duration;

const EXPECTED_PASSWORD: &str = "goodpass";
const EXPECTED_PINCODE: &str = "4242";
const EXPECTED_EMAILED_CODE: &str = "aaaaa";
const QR_CODE_CONTENT: &str = "https://ubuntu.com";

/// Record the mode selected by the caller and return the layout to display.
///
/// Performs the out-of-band side effects of the mode: a one time code is
/// regenerated, a QR code gets its content.
///
/// # Errors
///
/// Returns [`BrokerError::PolicyViolation`] if `mode_id` was not offered at
/// the last resolution.
pub fn select_mode(session: &mut Session, mode_id: &str) -> Result<UiLayout> {
    let Some(mode) = session.all_modes.get_mut(mode_id) else {
        return Err(unknown_mode(mode_id));
    };

    let mut ui = mode.ui.clone();
    match &mut mode.kind {
        ModeKind::Totp { wanted_code, phone } => {
            // A new code is "sent" to the phone on each selection.
            wanted_code.push('0');
            tracing::debug!(phone = %phone, "Sent new one time code");
        }
        ModeKind::QrCode => {
            ui.content = Some(QR_CODE_CONTENT.to_string());
            ui.label = Some(format!("{}1337", ui.label.unwrap_or_default()));
        }
        ModeKind::PhoneAck { phone, .. } => {
            tracing::debug!(phone = %phone, "Sent acknowledgement request");
        }
        _ => {}
    }

    session.selected_mode = Some(mode_id.to_string());
    if session.current_auth_step == 1 {
        session.first_selected_mode = Some(mode_id.to_string());
    }

    Ok(ui)
}

/// Verify `data` against the selected mode.
///
/// `known_user` tells whether the user may be granted at all once the
/// credentials check out.
///
/// # Errors
///
/// Returns [`BrokerError::PolicyViolation`] when no mode is selected or the
/// selected mode is no longer offered.
pub async fn verify(
    session: &Session,
    data: &AuthData,
    token: &mut CancelToken,
    config: &BrokerConfig,
    known_user: bool,
) -> Result<AuthResult> {
    let Some(mode_id) = session.selected_mode.as_deref() else {
        return Err(BrokerError::policy("no authentication mode selected"));
    };
    let Some(mode) = session.all_modes.get(mode_id) else {
        return Err(unknown_mode(mode_id));
    };

    if mode.kind.waits() {
        if !data.is_waiting() {
            return Ok(wait_not_set(mode_id));
        }
        if !wait_or_cancel(config.ack_wait, token).await {
            return Ok(AuthResult::empty(AuthAccess::Cancelled));
        }
    }

    let verdict = match &mode.kind {
        ModeKind::Password => {
            expect_challenge(data, EXPECTED_PASSWORD, "invalid password, should be goodpass")
        }
        ModeKind::PinCode => {
            expect_challenge(data, EXPECTED_PINCODE, "invalid pincode, should be 4242")
        }
        ModeKind::Totp { wanted_code, .. } => {
            expect_challenge(data, wanted_code, "invalid totp code")
        }
        ModeKind::PhoneAck { remote_denies: true, .. } => {
            return Ok(AuthResult::with_message(AuthAccess::Denied, "Timeout reached"));
        }
        ModeKind::PhoneAck { .. } | ModeKind::FidoDevice | ModeKind::QrCode => None,
        ModeKind::EntryOrWait { email } => {
            if !data.challenge().is_empty() {
                if data.challenge() != EXPECTED_EMAILED_CODE {
                    return Ok(AuthResult::with_message(
                        AuthAccess::Denied,
                        "invalid challenge, should be aaaaa",
                    ));
                }
            } else if data.is_waiting() {
                tracing::debug!(email = %email, "Waiting for emailed link to be clicked");
                if !wait_or_cancel(config.link_wait, token).await {
                    return Ok(AuthResult::empty(AuthAccess::Cancelled));
                }
            } else {
                return Ok(AuthResult::with_message(AuthAccess::Denied, "challenge timeout "));
            }
            None
        }
        ModeKind::PasswordReset { .. } => None,
    };

    if let Some(retry) = verdict {
        return Ok(retry);
    }

    if !known_user {
        return Ok(AuthResult::with_message(AuthAccess::Denied, "user not found"));
    }
    Ok(AuthResult::new(
        AuthAccess::Granted,
        UserInfo::example(&session.username).to_payload()?,
    ))
}

/// Turn the verdict obtained for `mode` into the session outcome.
///
/// A grant before the last step becomes `Next` and advances the step. A
/// retry consumes one attempt of `mode` and becomes `Denied` once
/// `max_attempts` is reached.
pub fn refine_outcome(
    session: &mut Session,
    mode: &str,
    result: AuthResult,
    max_attempts: u32,
) -> AuthResult {
    match result.access {
        AuthAccess::Granted if session.current_auth_step < session.needed_auth_steps => {
            session.current_auth_step += 1;
            AuthResult::empty(AuthAccess::Next)
        }
        AuthAccess::Retry => {
            let attempts = session.attempts_per_mode.entry(mode.to_string()).or_default();
            *attempts += 1;
            if *attempts >= max_attempts {
                AuthResult {
                    access: AuthAccess::Denied,
                    ..result
                }
            } else {
                result
            }
        }
        _ => result,
    }
}

/// Whether the selected mode already used up its attempts.
#[must_use]
pub fn attempts_exhausted(session: &Session, max_attempts: u32) -> bool {
    session
        .attempts_per_mode
        .get(session.selected_mode())
        .is_some_and(|attempts| *attempts >= max_attempts)
}

fn unknown_mode(mode_id: &str) -> BrokerError {
    BrokerError::policy(format!("selected authentication mode {mode_id:?} does not exist"))
}

fn expect_challenge(data: &AuthData, expected: &str, message: &str) -> Option<AuthResult> {
    (data.challenge() != expected).then(|| AuthResult::with_message(AuthAccess::Retry, message))
}

fn wait_not_set(mode_id: &str) -> AuthResult {
    AuthResult::with_message(
        AuthAccess::Denied,
        &format!("{mode_id} should have wait set to true"),
    )
}

/// Sleep for `duration` unless cancelled first. Returns `false` on cancellation.
async fn wait_or_cancel(duration: Duration, token: &mut CancelToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = token.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{LayoutType, UiLayout};
    use crate::inflight::InFlightEvaluations;
    use crate::modes::{self, supported_modes};
    use crate::state::{AuthRequirements, SessionId};

    fn session_with_modes(username: &str) -> Session {
        let mut session = Session::new(username, "en", AuthRequirements::default());
        let layouts = vec![
            UiLayout::new(LayoutType::Form)
                .with_entry("optional:chars,chars_password,digits")
                .with_wait("true"),
            UiLayout::new(LayoutType::QrCode).with_wait("true"),
        ];
        session.all_modes = supported_modes(&session, &layouts);
        session
    }

    fn fast_config() -> BrokerConfig {
        BrokerConfig::new()
            .with_ack_wait(Duration::from_millis(10))
            .with_link_wait(Duration::from_millis(10))
    }

    fn challenge(value: &str) -> AuthData {
        AuthData {
            challenge: Some(value.to_string()),
            wait: None,
        }
    }

    fn waiting() -> AuthData {
        AuthData {
            challenge: None,
            wait: Some("true".to_string()),
        }
    }

    async fn run(session: &Session, data: &AuthData) -> AuthResult {
        verify(session, data, &mut CancelToken::never(), &fast_config(), true)
            .await
            .unwrap()
    }

    #[test]
    fn test_select_unknown_mode() {
        let mut session = session_with_modes("user1");
        let err = select_mode(&mut session, "webauthn").unwrap_err();
        assert_eq!(
            err,
            BrokerError::policy(r#"selected authentication mode "webauthn" does not exist"#)
        );
        assert_eq!(session.selected_mode, None);
    }

    #[test]
    fn test_select_records_first_mode_on_first_step_only() {
        let mut session = session_with_modes("user1");
        select_mode(&mut session, modes::PASSWORD).unwrap();
        assert_eq!(session.first_selected_mode.as_deref(), Some(modes::PASSWORD));

        session.current_auth_step = 2;
        select_mode(&mut session, modes::FIDO_DEVICE_1).unwrap();
        assert_eq!(session.selected_mode(), modes::FIDO_DEVICE_1);
        assert_eq!(session.first_selected_mode.as_deref(), Some(modes::PASSWORD));
    }

    #[test]
    fn test_select_totp_regenerates_code() {
        let mut session = session_with_modes("user1");
        select_mode(&mut session, modes::TOTP).unwrap();
        select_mode(&mut session, modes::TOTP).unwrap();

        assert_eq!(
            session.all_modes[modes::TOTP].kind,
            ModeKind::Totp {
                phone: "+33…".to_string(),
                wanted_code: "temporary pass00".to_string(),
            }
        );
    }

    #[test]
    fn test_select_qrcode_injects_content() {
        let mut session = session_with_modes("user1");
        let ui = select_mode(&mut session, modes::QR_CODE).unwrap();
        assert_eq!(ui.content.as_deref(), Some("https://ubuntu.com"));
        assert!(ui.label.unwrap().ends_with("1337"));
        // The stored layout is left untouched.
        assert_eq!(session.all_modes[modes::QR_CODE].ui.content, None);
    }

    #[tokio::test]
    async fn test_password_verdicts() {
        let mut session = session_with_modes("user1");
        select_mode(&mut session, modes::PASSWORD).unwrap();

        let granted = run(&session, &challenge("goodpass")).await;
        assert_eq!(granted.access, AuthAccess::Granted);
        assert!(granted.data.contains(r#""name": "user1""#));

        let retry = run(&session, &challenge("wrongpass")).await;
        assert_eq!(retry.access, AuthAccess::Retry);
        assert_eq!(retry.data, r#"{"message":"invalid password, should be goodpass"}"#);
    }

    #[tokio::test]
    async fn test_totp_expects_current_code() {
        let mut session = session_with_modes("user1");
        select_mode(&mut session, modes::TOTP).unwrap();

        assert_eq!(run(&session, &challenge("temporary pass")).await.access, AuthAccess::Retry);
        assert_eq!(run(&session, &challenge("temporary pass0")).await.access, AuthAccess::Granted);
    }

    #[tokio::test]
    async fn test_wait_modes_require_wait_flag() {
        let mut session = session_with_modes("user1");
        select_mode(&mut session, modes::FIDO_DEVICE_1).unwrap();

        let result = run(&session, &challenge("anything")).await;
        assert_eq!(result.access, AuthAccess::Denied);
        assert!(result.data.contains("fidodevice1 should have wait set to true"));

        assert_eq!(run(&session, &waiting()).await.access, AuthAccess::Granted);
    }

    #[tokio::test]
    async fn test_phoneack2_is_denied_remotely() {
        let mut session = session_with_modes("user1");
        select_mode(&mut session, modes::PHONE_ACK_2).unwrap();

        let result = run(&session, &waiting()).await;
        assert_eq!(result.access, AuthAccess::Denied);
        assert!(result.data.contains("Timeout reached"));
    }

    #[tokio::test]
    async fn test_entry_or_wait() {
        let mut session = session_with_modes("user1");
        select_mode(&mut session, &modes::entry_or_wait_mode_id("user1")).unwrap();

        assert_eq!(run(&session, &challenge("aaaaa")).await.access, AuthAccess::Granted);
        assert_eq!(run(&session, &challenge("bbbbb")).await.access, AuthAccess::Denied);
        assert_eq!(run(&session, &waiting()).await.access, AuthAccess::Granted);
        assert_eq!(run(&session, &AuthData::default()).await.access, AuthAccess::Denied);
    }

    #[tokio::test]
    async fn test_cancelled_wait() {
        let mut session = session_with_modes("user1");
        select_mode(&mut session, modes::PHONE_ACK_1).unwrap();

        let in_flight = InFlightEvaluations::new();
        let id = SessionId::new();
        let mut guard = in_flight.register(id).unwrap();
        assert!(in_flight.cancel(&id).unwrap());

        // Default waits are seconds long; cancellation must not wait for them.
        let config = BrokerConfig::new();
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            verify(&session, &waiting(), guard.token(), &config, true),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(result, AuthResult::empty(AuthAccess::Cancelled));
    }

    #[tokio::test]
    async fn test_unknown_user_is_denied_after_verification() {
        let mut session = session_with_modes("stranger");
        select_mode(&mut session, modes::PASSWORD).unwrap();

        let result = verify(&session, &challenge("goodpass"), &mut CancelToken::never(), &fast_config(), false)
            .await
            .unwrap();
        assert_eq!(result.access, AuthAccess::Denied);
        assert!(result.data.contains("user not found"));
    }

    #[tokio::test]
    async fn test_verify_without_selection() {
        let session = session_with_modes("user1");
        let err = verify(&session, &AuthData::default(), &mut CancelToken::never(), &fast_config(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::PolicyViolation { .. }));
    }

    #[test]
    fn test_refine_grant_before_last_step() {
        let mut session = Session::new(
            "user-mfa",
            "en",
            AuthRequirements {
                needed_auth_steps: 2,
                ..AuthRequirements::default()
            },
        );
        let refined = refine_outcome(&mut session, modes::PASSWORD, AuthResult::new(AuthAccess::Granted, "{}"), 5);
        assert_eq!(refined, AuthResult::empty(AuthAccess::Next));
        assert_eq!(session.current_auth_step, 2);

        let refined = refine_outcome(&mut session, modes::PASSWORD, AuthResult::new(AuthAccess::Granted, "{}"), 5);
        assert_eq!(refined.access, AuthAccess::Granted);
        assert_eq!(session.current_auth_step, 2);
    }

    #[test]
    fn test_refine_retry_budget() {
        let mut session = session_with_modes("user1");
        select_mode(&mut session, modes::PASSWORD).unwrap();

        for _ in 0..4 {
            let refined = refine_outcome(&mut session, modes::PASSWORD, AuthResult::empty(AuthAccess::Retry), 5);
            assert_eq!(refined.access, AuthAccess::Retry);
        }
        assert!(!attempts_exhausted(&session, 5));

        let refined = refine_outcome(&mut session, modes::PASSWORD, AuthResult::new(AuthAccess::Retry, "msg"), 5);
        assert_eq!(refined, AuthResult::new(AuthAccess::Denied, "msg"));
        assert!(attempts_exhausted(&session, 5));
    }
}
