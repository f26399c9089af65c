//! Owner commands: in-chat (`/status busy` sent from the owner's own account) and console lines.

use crate::status::StatusStore;

/// Prefix that marks an owner message as a command rather than conversation.
pub const CHAT_COMMAND_PREFIX: char = '/';

/// A parsed owner command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerCommand {
    /// Report the current status.
    ShowStatus,
    /// Replace the status with the given token.
    SetStatus(String),
    Help,
    /// Stop the process (console only).
    Exit,
}

/// Parse an owner chat message. Returns `None` for messages that are not commands, and
/// `Some(None)` for `/`-prefixed text that is not a known command (it is swallowed, not answered).
pub fn parse_chat_command(text: &str) -> Option<Option<OwnerCommand>> {
    let rest = text.trim().strip_prefix(CHAT_COMMAND_PREFIX)?;
    Some(parse_status_words(&rest.to_lowercase()))
}

/// Parse a console line (`status`, `status <token>`, `help`, `exit`). Unknown input is `None`.
pub fn parse_console_line(line: &str) -> Option<OwnerCommand> {
    let line = line.trim();
    let (cmd, _) = split_word(line);
    match cmd.to_lowercase().as_str() {
        "help" | "?" => Some(OwnerCommand::Help),
        "exit" | "quit" => Some(OwnerCommand::Exit),
        // Console tokens keep their case.
        _ => parse_status_words(line),
    }
}

fn parse_status_words(s: &str) -> Option<OwnerCommand> {
    let (cmd, arg) = split_word(s.trim());
    if !cmd.eq_ignore_ascii_case("status") {
        return None;
    }
    if arg.is_empty() {
        Some(OwnerCommand::ShowStatus)
    } else {
        Some(OwnerCommand::SetStatus(arg.to_string()))
    }
}

fn split_word(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (s, ""),
    }
}

/// Apply a status command to the store and return the confirmation text for the owner.
/// `Help` and `Exit` are handled by the caller and produce `None` here.
pub async fn apply(store: &StatusStore, cmd: &OwnerCommand) -> Option<String> {
    match cmd {
        OwnerCommand::ShowStatus => Some(format!("current status: {}", store.get().await)),
        OwnerCommand::SetStatus(token) => {
            store.set(token.clone()).await;
            Some(format!("status set to: {}", token.to_uppercase()))
        }
        OwnerCommand::Help | OwnerCommand::Exit => None,
    }
}

/// Console help text.
pub const CONSOLE_HELP: &str = "commands: status | status <token> | help | exit";
