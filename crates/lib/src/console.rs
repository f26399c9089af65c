//! Line-based operator console (stdin): change or show the owner status while the gateway runs.

use crate::commands::{self, OwnerCommand, CONSOLE_HELP};
use crate::status::StatusStore;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Why the console loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleEnd {
    /// Operator typed `exit`; the process should shut down.
    Exit,
    /// Input closed (e.g. running detached). The gateway keeps running.
    Eof,
}

/// Read commands line by line until `exit` or end of input.
pub async fn run_console<R, W>(status: &StatusStore, input: R, mut out: W) -> std::io::Result<ConsoleEnd>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match commands::parse_console_line(&line) {
            Some(OwnerCommand::Exit) => return Ok(ConsoleEnd::Exit),
            Some(OwnerCommand::Help) => CONSOLE_HELP.to_string(),
            Some(cmd) => commands::apply(status, &cmd).await.unwrap_or_default(),
            None => format!("unknown command: {} ({})", line.trim(), CONSOLE_HELP),
        };
        out.write_all(reply.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
    }
    Ok(ConsoleEnd::Eof)
}

/// Console on the process stdin/stdout.
pub async fn run_stdio_console(status: &StatusStore) -> std::io::Result<ConsoleEnd> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run_console(status, stdin, tokio::io::stdout()).await
}
