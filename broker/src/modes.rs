//! Authentication mode resolution.
//!
//! Computes which modes a session is offered from the layouts the caller
//! declared, then applies multi-factor and password reset policy and orders
//! the result for display.
//!
//! ```text
//! declared layouts ──► supported modes ──► MFA allow-list (steps 2..n)
//!                                      ──► reset modes   (last step, reset users)
//!                                      ──► ordering      (last used, password, rest)
//! ```

use crate::error::{BrokerError, Result};
use crate::layout::{LayoutType, UiLayout};
use crate::state::{AuthMode, PasswdReset, Session};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Password mode id.
pub const PASSWORD: &str = "password";
/// Pin code mode id.
pub const PINCODE: &str = "pincode";
/// One time code mode id.
pub const TOTP: &str = "totp";
/// One time code mode id, with a "resend" button.
pub const TOTP_WITH_BUTTON: &str = "totp_with_button";
/// Phone acknowledgement mode id.
pub const PHONE_ACK_1: &str = "phoneack1";
/// Phone acknowledgement mode id whose remote side always denies.
pub const PHONE_ACK_2: &str = "phoneack2";
/// FIDO device mode id.
pub const FIDO_DEVICE_1: &str = "fidodevice1";
/// QR code mode id.
pub const QR_CODE: &str = "qrcodewithtypo";
/// Mandatory password reset mode id.
pub const MANDATORY_RESET: &str = "mandatoryreset";
/// Optional password reset mode id.
pub const OPTIONAL_RESET: &str = "optionalreset";
/// Prefix of the per-user emailed link mode id.
pub const ENTRY_OR_WAIT_PREFIX: &str = "entry_or_wait_for_";

/// Modes that may be offered after the first step.
pub const MFA_MODES: [&str; 3] = [PHONE_ACK_1, TOTP_WITH_BUTTON, FIDO_DEVICE_1];

const INITIAL_TOTP_CODE: &str = "temporary pass";
const EXAMPLE_PHONE_1: &str = "+33…";
const EXAMPLE_PHONE_2: &str = "+1…";

/// What a mode verifies and the state it needs to do so.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModeKind {
    /// Static password.
    Password,
    /// Numeric pin code.
    PinCode,
    /// One time code sent by SMS.
    Totp {
        /// Phone the code is sent to.
        phone: String,
        /// Code currently expected.
        wanted_code: String,
    },
    /// Push notification acknowledged on a phone.
    PhoneAck {
        /// Phone receiving the request.
        phone: String,
        /// Whether the remote side denies after its wait.
        remote_denies: bool,
    },
    /// Security key touch.
    FidoDevice,
    /// QR code flashed on another device.
    QrCode,
    /// Code typed manually or link clicked in an email.
    EntryOrWait {
        /// Address the link is sent to.
        email: String,
    },
    /// New password entry.
    PasswordReset {
        /// Whether the user may skip it.
        optional: bool,
    },
}

impl ModeKind {
    /// Whether this mode waits on an external event.
    #[must_use]
    pub const fn waits(&self) -> bool {
        matches!(self, Self::PhoneAck { .. } | Self::FidoDevice | Self::QrCode)
    }
}

/// A mode offered to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeDescriptor {
    /// Label in the selection list.
    pub label: String,
    /// Layout presented once selected.
    pub ui: UiLayout,
    /// Verification kind and state.
    pub kind: ModeKind,
}

impl ModeDescriptor {
    fn new(label: impl Into<String>, ui: UiLayout, kind: ModeKind) -> Self {
        Self {
            label: label.into(),
            ui,
            kind,
        }
    }
}

/// Map of mode id to descriptor.
pub type ModeMap = BTreeMap<String, ModeDescriptor>;

/// Modes offered for this step with their display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModes {
    /// Descriptors to store on the session.
    pub modes: ModeMap,
    /// Ordered `(id, label)` list for the caller.
    pub ordered: Vec<AuthMode>,
}

/// Resolve the modes offered to `session` for the current step.
///
/// `last_selection` is the mode the user last authenticated with, if any.
///
/// # Errors
///
/// Returns [`BrokerError::PolicyViolation`] when a password reset is due
/// before any step was completed, or when a mandatory reset cannot be offered
/// with the declared layouts.
pub fn resolve(
    session: &Session,
    layouts: &[UiLayout],
    last_selection: Option<&str>,
) -> Result<ResolvedModes> {
    let mut modes = supported_modes(session, layouts);

    if session.is_multi_factor_step() {
        modes = mfa_modes(session, &session.all_modes);
    }

    if session.is_last_step() && session.pwd_change != PasswdReset::None {
        if session.current_auth_step < 2 {
            return Err(BrokerError::policy(
                "password reset is not allowed before authentication",
            ));
        }

        modes = passwd_reset_modes(session, layouts);
        if session.pwd_change == PasswdReset::MustReset && modes.is_empty() {
            return Err(BrokerError::policy(format!(
                "user {:?} must reset password, but no mode was provided for it",
                session.username
            )));
        }
    }

    let ordered = order_modes(&modes, last_selection);
    Ok(ResolvedModes { modes, ordered })
}

/// Modes the declared layouts can render.
#[must_use]
pub fn supported_modes(session: &Session, layouts: &[UiLayout]) -> ModeMap {
    let mut modes = ModeMap::new();

    for layout in layouts {
        match layout.kind {
            LayoutType::Form => {
                if layout.has_entry() {
                    add_entry_modes(&mut modes, session, layout);
                }
                if layout.supports_wait() {
                    add_wait_modes(&mut modes, layout);
                }
            }
            LayoutType::QrCode => {
                modes.insert(
                    QR_CODE.to_string(),
                    ModeDescriptor::new(
                        "Use a QR code",
                        UiLayout::new(LayoutType::QrCode)
                            .with_label("Enter the following code after flashing the address: ")
                            .with_wait("true")
                            .with_button("regenerate QR code"),
                        ModeKind::QrCode,
                    ),
                );
            }
            LayoutType::Webview | LayoutType::NewPassword => {}
        }
    }

    modes
}

fn add_entry_modes(modes: &mut ModeMap, session: &Session, layout: &UiLayout) {
    if layout.supports_entry("chars_password") {
        modes.insert(
            PASSWORD.to_string(),
            ModeDescriptor::new(
                "Password authentication",
                UiLayout::new(LayoutType::Form)
                    .with_label("Gimme your password")
                    .with_entry("chars_password"),
                ModeKind::Password,
            ),
        );
    }

    if layout.supports_entry("digits") {
        modes.insert(
            PINCODE.to_string(),
            ModeDescriptor::new(
                "Pin code",
                UiLayout::new(LayoutType::Form)
                    .with_label("Enter your pin code")
                    .with_entry("digits"),
                ModeKind::PinCode,
            ),
        );
    }

    if layout.supports_entry("chars") && layout.supports_wait() {
        let email = format!("{}@gmail.com", session.username);
        modes.insert(
            entry_or_wait_mode_id(&session.username),
            ModeDescriptor::new(
                format!("Send URL to {email}"),
                UiLayout::new(LayoutType::Form)
                    .with_label(format!(
                        "Click on the link received at {email} or enter the code:"
                    ))
                    .with_entry("chars")
                    .with_wait("true"),
                ModeKind::EntryOrWait { email },
            ),
        );
    }
}

fn add_wait_modes(modes: &mut ModeMap, layout: &UiLayout) {
    let totp_ui = UiLayout::new(LayoutType::Form)
        .with_label("Enter your one time credential")
        .with_entry("chars");
    let totp = ModeKind::Totp {
        phone: EXAMPLE_PHONE_1.to_string(),
        wanted_code: INITIAL_TOTP_CODE.to_string(),
    };
    if layout.button.as_deref() == Some("optional") {
        modes.insert(
            TOTP_WITH_BUTTON.to_string(),
            ModeDescriptor::new(
                "Authentication code",
                totp_ui.with_button("Resend sms"),
                totp,
            ),
        );
    } else {
        modes.insert(
            TOTP.to_string(),
            ModeDescriptor::new("Authentication code", totp_ui, totp),
        );
    }

    modes.insert(
        PHONE_ACK_1.to_string(),
        ModeDescriptor::new(
            format!("Use your phone {EXAMPLE_PHONE_1}"),
            UiLayout::new(LayoutType::Form)
                .with_label(format!(
                    "Unlock your phone {EXAMPLE_PHONE_1} or accept request on web interface:"
                ))
                .with_wait("true"),
            ModeKind::PhoneAck {
                phone: EXAMPLE_PHONE_1.to_string(),
                remote_denies: false,
            },
        ),
    );

    modes.insert(
        PHONE_ACK_2.to_string(),
        ModeDescriptor::new(
            format!("Use your phone {EXAMPLE_PHONE_2}"),
            UiLayout::new(LayoutType::Form)
                .with_label(format!(
                    "Unlock your phone {EXAMPLE_PHONE_2} or accept request on web interface"
                ))
                .with_wait("true"),
            ModeKind::PhoneAck {
                phone: EXAMPLE_PHONE_2.to_string(),
                remote_denies: true,
            },
        ),
    );

    modes.insert(
        FIDO_DEVICE_1.to_string(),
        ModeDescriptor::new(
            "Use your fido device foo",
            UiLayout::new(LayoutType::Form)
                .with_label("Plug your fido device and press with your thumb")
                .with_wait("true"),
            ModeKind::FidoDevice,
        ),
    );
}

/// Id of the emailed link mode for `username`.
#[must_use]
pub fn entry_or_wait_mode_id(username: &str) -> String {
    format!("{ENTRY_OR_WAIT_PREFIX}{username}_gmail.com")
}

/// Second factor modes among `previous`, minus the mode used on the previous step.
#[must_use]
pub fn mfa_modes(session: &Session, previous: &ModeMap) -> ModeMap {
    MFA_MODES
        .iter()
        .filter(|id| session.selected_mode.as_deref() != Some(**id))
        .filter_map(|id| previous.get(*id).map(|mode| ((*id).to_string(), mode.clone())))
        .collect()
}

/// Password reset modes the declared layouts can render.
#[must_use]
pub fn passwd_reset_modes(session: &Session, layouts: &[UiLayout]) -> ModeMap {
    let mut modes = ModeMap::new();

    for layout in layouts {
        if layout.kind != LayoutType::NewPassword {
            continue;
        }
        if !layout.has_entry() {
            break;
        }

        let mut ui = UiLayout::new(LayoutType::NewPassword)
            .with_label("Enter your new password")
            .with_entry("chars_password");
        let mut id = MANDATORY_RESET;
        let optional = session.pwd_change == PasswdReset::CanReset && layout.has_button();
        if optional {
            id = OPTIONAL_RESET;
            ui = ui
                .with_label("Enter your new password (3 days until mandatory)")
                .with_button("Skip");
        }

        modes.insert(
            id.to_string(),
            ModeDescriptor::new("Password reset", ui, ModeKind::PasswordReset { optional }),
        );
    }

    modes
}

/// Order modes for display.
///
/// The last successfully used mode comes first when still offered, then
/// `password`, then every other mode by id.
#[must_use]
pub fn order_modes(modes: &ModeMap, last_selection: Option<&str>) -> Vec<AuthMode> {
    let last_selection = last_selection.filter(|id| modes.contains_key(*id));

    let mut ids: Vec<&str> = Vec::with_capacity(modes.len());
    if let Some(last) = last_selection.filter(|id| *id != PASSWORD) {
        ids.push(last);
    }
    if modes.contains_key(PASSWORD) {
        ids.push(PASSWORD);
    }
    // BTreeMap keys are already sorted.
    ids.extend(
        modes
            .keys()
            .map(String::as_str)
            .filter(|id| *id != PASSWORD && Some(*id) != last_selection),
    );

    ids.into_iter()
        .filter_map(|id| {
            modes.get(id).map(|mode| AuthMode {
                id: id.to_string(),
                label: mode.label.clone(),
            })
        })
        .collect()
}
