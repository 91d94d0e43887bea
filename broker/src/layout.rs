//! UI layout descriptors exchanged with the caller.
//!
//! Callers declare which layouts their UI can render, and the broker answers
//! with the layout to present for a selected mode. Both directions share the
//! same map-like shape: a `type` tag plus optional string fields.

use serde::{Deserialize, Serialize};

/// Layout type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutType {
    /// Label plus optional entry, button and wait.
    Form,
    /// QR code with a text rendering of its content.
    QrCode,
    /// Embedded web view.
    Webview,
    /// New password entry, used for password resets.
    NewPassword,
}

/// A UI layout, either declared by the caller or returned for a mode.
///
/// When declared, each field states a capability (`wait: "true"`, an
/// `entry` list such as `optional:chars,chars_password`). When returned,
/// fields carry the values to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiLayout {
    /// Layout type tag.
    #[serde(rename = "type")]
    pub kind: LayoutType,

    /// Text shown above the entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Secondary action button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<String>,

    /// Whether the broker waits on an external event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<String>,

    /// Entry kind, or comma separated list of supported entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,

    /// Extra content such as a QR code URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl UiLayout {
    /// Create an empty layout of the given type.
    #[must_use]
    pub const fn new(kind: LayoutType) -> Self {
        Self {
            kind,
            label: None,
            button: None,
            wait: None,
            entry: None,
            content: None,
        }
    }

    /// Set the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the button.
    #[must_use]
    pub fn with_button(mut self, button: impl Into<String>) -> Self {
        self.button = Some(button.into());
        self
    }

    /// Set the wait flag.
    #[must_use]
    pub fn with_wait(mut self, wait: impl Into<String>) -> Self {
        self.wait = Some(wait.into());
        self
    }

    /// Set the entry.
    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// Set the content.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Whether the caller declared it can wait on this layout.
    #[must_use]
    pub fn supports_wait(&self) -> bool {
        is_set(self.wait.as_deref())
    }

    /// Whether the caller declared a button on this layout.
    #[must_use]
    pub fn has_button(&self) -> bool {
        is_set(self.button.as_deref())
    }

    /// Whether an entry capability was declared at all.
    #[must_use]
    pub fn has_entry(&self) -> bool {
        is_set(self.entry.as_deref())
    }

    /// Entry kinds the caller supports.
    ///
    /// The `optional:` prefix only tells that the entry may be left empty and
    /// does not change the list.
    #[must_use]
    pub fn supported_entries(&self) -> Vec<&str> {
        let Some(entry) = self.entry.as_deref().filter(|e| !e.is_empty()) else {
            return Vec::new();
        };
        entry
            .strip_prefix("optional:")
            .unwrap_or(entry)
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .collect()
    }

    /// Whether `entry` is among the supported entry kinds.
    #[must_use]
    pub fn supports_entry(&self, entry: &str) -> bool {
        self.supported_entries().contains(&entry)
    }
}

fn is_set(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

/// Data sent by the caller when asking for an authentication decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthData {
    /// Secret typed by the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,

    /// `"true"` when the caller is waiting on an out-of-band event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<String>,
}

impl AuthData {
    /// Parse the raw payload sent by the caller.
    ///
    /// An empty payload or a JSON `null` is accepted as empty data.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::InvalidInput`](crate::BrokerError::InvalidInput)
    /// if the payload is not a JSON object of strings.
    pub fn parse(raw: &str) -> crate::Result<Self> {
        if raw.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str::<Option<Self>>(raw)
            .map(Option::unwrap_or_default)
            .map_err(|_| crate::BrokerError::InvalidInput)
    }

    /// Challenge, or an empty string.
    #[must_use]
    pub fn challenge(&self) -> &str {
        self.challenge.as_deref().unwrap_or_default()
    }

    /// Whether the caller asked to wait.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.wait.as_deref() == Some("true")
    }
}
