//! # authd Broker
//!
//! Session authentication engine for the authd daemon.
//!
//! A broker authenticates a user through a session: it offers the
//! authentication modes the client can render, evaluates the answers for the
//! selected mode and walks the user through multi-factor steps and password
//! resets until access is granted or denied.
//!
//! ## Architecture
//!
//! ```text
//! SessionRegistry ─► modes::resolve ─► evaluator::select_mode ─► evaluator::verify
//!        ▲                                                              │
//!        └────────────── evaluator::refine_outcome ◄────────────────────┘
//! ```
//!
//! - [`registry`]: active sessions and last used modes
//! - [`modes`]: which modes a session is offered and in which order
//! - [`evaluator`]: challenge verification and outcome refinement
//! - [`inflight`]: one evaluation per session, cancellable from outside
//! - [`example`]: the reference [`Broker`] wiring all of the above
//!
//! ## Example
//!
//! ```no_run
//! use authd_broker::{AuthAccess, Broker, ExampleBroker, LayoutType, UiLayout};
//!
//! # async fn example() -> authd_broker::Result<()> {
//! let broker = ExampleBroker::new("example_broker");
//! let (session_id, _) = broker.new_session("user1", "en").await?;
//!
//! let layouts = [UiLayout::new(LayoutType::Form).with_entry("chars_password")];
//! broker.authentication_modes(&session_id, &layouts).await?;
//! broker.select_authentication_mode(&session_id, "password").await?;
//!
//! let result = broker
//!     .is_authenticated(&session_id, r#"{"challenge": "goodpass"}"#)
//!     .await?;
//! assert_eq!(result.access, AuthAccess::Granted);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod config;
pub mod error;
pub mod evaluator;
pub mod example;
pub mod inflight;
pub mod layout;
pub mod modes;
pub mod policy;
pub mod providers;
pub mod registry;
pub mod state;
pub mod userinfo;

// Re-export main types for convenience
pub use config::BrokerConfig;
pub use error::{BrokerError, Result};
pub use example::ExampleBroker;
pub use layout::{AuthData, LayoutType, UiLayout};
pub use providers::{Broker, BrokerInfo};
pub use state::{AuthAccess, AuthMode, AuthResult, PasswdReset, Session, SessionId};
pub use userinfo::{GroupInfo, UserInfo};
