//! Prior messages of a conversation and their transcript form.

use serde::{Deserialize, Serialize};

/// Role label for messages the owner sent.
pub const SELF_LABEL: &str = "Me";
/// Role label for messages from the other party.
pub const OTHER_LABEL: &str = "Them";

/// One earlier message, oldest first in any list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Sent by the owner (true) or by the other party.
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub text: String,
}

impl HistoryEntry {
    pub fn me(text: impl Into<String>) -> Self {
        Self {
            is_self: true,
            text: text.into(),
        }
    }

    pub fn them(text: impl Into<String>) -> Self {
        Self {
            is_self: false,
            text: text.into(),
        }
    }
}

/// Render history as `Role: text` lines joined by `\n`, in input order. Text is not escaped or trimmed.
pub fn format_history(history: &[HistoryEntry]) -> String {
    history
        .iter()
        .map(|e| {
            let role = if e.is_self { SELF_LABEL } else { OTHER_LABEL };
            format!("{}: {}", role, e.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
