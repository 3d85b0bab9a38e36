//! The [`Shell`] trait: the line-oriented interface to the driven wallet process.

use crate::error::SessionError;
use async_trait::async_trait;
use std::time::Duration;

/// One running interactive process, spoken to one line at a time.
///
/// [`PtySession`](crate::pty::PtySession) is the real implementation; tests
/// substitute a scripted fake. Implementations do no logging of their own:
/// the event stream mirrors output to the log because only it knows which
/// text follows a password prompt.
#[async_trait]
pub trait Shell: Send {
    /// Write `text` followed by a newline.
    ///
    /// Fails with [`SessionError::Dead`] once the process has exited.
    fn send_line(&mut self, text: &str) -> Result<(), SessionError>;

    /// Return and clear output produced since the last call. Never blocks;
    /// returns an empty string when nothing new has arrived.
    fn poll(&mut self) -> String;

    fn is_alive(&mut self) -> bool;

    /// Ask the process to exit with `exit_command`, then kill it if it is
    /// still running after `grace`. Calling it again is a no-op.
    async fn terminate(&mut self, exit_command: &str, grace: Duration);
}
