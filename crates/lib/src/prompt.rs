//! System instruction for the reply model: the behavioral policy with status and transcript filled in.
//!
//! The default policy ships with the crate (`config/POLICY.md`). A non-empty `POLICY.md` in the
//! workspace replaces it, so the wording can be tuned without rebuilding.

use std::fs;
use std::path::Path;

/// Bundled reply policy. Placeholders: [`STATUS_PLACEHOLDER`], [`TRANSCRIPT_PLACEHOLDER`].
pub const DEFAULT_POLICY: &str = include_str!("../config/POLICY.md");

/// File name of the workspace policy override.
pub const POLICY_FILE: &str = "POLICY.md";

pub const STATUS_PLACEHOLDER: &str = "{{status}}";
pub const TRANSCRIPT_PLACEHOLDER: &str = "{{transcript}}";

/// Load the policy from the workspace (POLICY.md), falling back to [`DEFAULT_POLICY`].
pub fn load_policy(workspace_dir: Option<&Path>) -> String {
    let Some(dir) = workspace_dir else {
        return DEFAULT_POLICY.to_string();
    };
    let path = dir.join(POLICY_FILE);
    match fs::read_to_string(&path) {
        Ok(s) if !s.trim().is_empty() => {
            log::info!("prompt: using policy from {}", path.display());
            s
        }
        _ => DEFAULT_POLICY.to_string(),
    }
}

/// Fill the policy placeholders in one left-to-right pass. Inserted values are never rescanned,
/// so status and transcript land verbatim even when they contain placeholder text.
pub fn build_system_prompt(policy: &str, transcript: &str, status: &str) -> String {
    let mut out = String::with_capacity(policy.len() + transcript.len() + status.len());
    let mut rest = policy;
    while let Some(start) = rest.find("{{") {
        let tail = &rest[start..];
        let (value, len) = if tail.starts_with(STATUS_PLACEHOLDER) {
            (status, STATUS_PLACEHOLDER.len())
        } else if tail.starts_with(TRANSCRIPT_PLACEHOLDER) {
            (transcript, TRANSCRIPT_PLACEHOLDER.len())
        } else {
            out.push_str(&rest[..start + 1]);
            rest = &rest[start + 1..];
            continue;
        };
        out.push_str(&rest[..start]);
        out.push_str(value);
        rest = &rest[start + len..];
    }
    out.push_str(rest);
    out
}

/// User-role content for the completion request.
pub fn user_content(sender_label: &str, text: &str) -> String {
    format!("New message from {}: \"{}\"", sender_label, text)
}
