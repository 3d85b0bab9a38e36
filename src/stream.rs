//! [`EventStream`] turns the shell's raw output into a queue of typed events.
//!
//! Output can arrive split anywhere, so complete lines are classified as they
//! form while the unfinished tail is kept and checked for prompts, which the
//! wallet prints without a newline. Events are consumed once; there is no
//! rewind.

use crate::cancel::CancelToken;
use crate::error::{ProtocolError, SessionError};
use crate::event::OutputEvent;
use crate::patterns::{PatternSet, clean_line};
use crate::shell::Shell;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

// A "line" this long without a newline is flushed as is.
const MAX_PARTIAL_LEN: usize = 64 * 1024;

const REDACTED: &str = "[redacted]";

pub struct EventStream<S> {
    shell: S,
    patterns: PatternSet,
    partial: String,
    events: VecDeque<OutputEvent>,
    // Set when a password prompt ended a partial line: the rest of that line
    // is the echo of the secret.
    hide_rest_of_line: bool,
    poll_interval: Duration,
}

impl<S: Shell> EventStream<S> {
    pub fn new(shell: S, patterns: PatternSet) -> Self {
        Self {
            shell,
            patterns,
            partial: String::new(),
            events: VecDeque::new(),
            hide_rest_of_line: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    pub fn shell_mut(&mut self) -> &mut S {
        &mut self.shell
    }

    /// Send one command line; it is logged verbatim.
    pub fn send(&mut self, line: &str) -> Result<(), SessionError> {
        debug!(target: "kaspa_batch::shell", input = line, "sending command");
        self.shell.send_line(line)
    }

    /// Send a secret; only a placeholder is logged.
    pub fn send_secret(&mut self, secret: &str) -> Result<(), SessionError> {
        debug!(target: "kaspa_batch::shell", input = REDACTED, "sending secret");
        self.shell.send_line(secret)
    }

    /// Feed a chunk of raw output into the stream.
    pub fn ingest(&mut self, chunk: &str) {
        self.partial.push_str(chunk);

        while let Some(idx) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=idx).collect();
            if std::mem::take(&mut self.hide_rest_of_line) {
                trace!(target: "kaspa_batch::shell", output = REDACTED, "shell output");
                continue;
            }
            self.push_line(&line);
        }

        if self.hide_rest_of_line {
            return;
        }

        if let Some(event) = self.patterns.classify_prompt(&self.partial) {
            trace!(target: "kaspa_batch::shell", output = %clean_line(&self.partial), "shell prompt");
            self.partial.clear();
            self.hide_rest_of_line = event.is_password_prompt();
            self.record(event);
        } else if self.partial.len() > MAX_PARTIAL_LEN {
            let line = std::mem::take(&mut self.partial);
            self.push_line(&line);
        }
    }

    fn push_line(&mut self, raw: &str) {
        let line = clean_line(raw);
        if line.is_empty() {
            return;
        }
        trace!(target: "kaspa_batch::shell", output = %line, "shell output");
        let event = self.patterns.classify(&line);
        self.record(event);
    }

    fn record(&mut self, event: OutputEvent) {
        if !matches!(event, OutputEvent::Unrecognized(_)) {
            debug!(?event, "event classified");
        }
        self.events.push_back(event);
    }

    fn pump(&mut self) {
        let chunk = self.shell.poll();
        if !chunk.is_empty() {
            self.ingest(&chunk);
        }
    }

    /// Pull new output once and pop the oldest event, if any.
    pub fn next_event(&mut self) -> Option<OutputEvent> {
        self.pump();
        self.events.pop_front()
    }

    /// Drop every event that has already been produced, so that stale
    /// output cannot be attributed to the next command.
    pub fn discard_pending(&mut self) {
        self.pump();
        if !self.events.is_empty() {
            debug!(count = self.events.len(), "discarding stale events");
            self.events.clear();
        }
    }

    /// Wait until an event satisfying `accept` arrives.
    ///
    /// Events that do not satisfy `accept` are consumed and dropped. Fails
    /// with [`ProtocolError::Timeout`] once `timeout` elapses, with
    /// [`ProtocolError::SessionDead`] when the process is gone and its output
    /// exhausted, and with [`ProtocolError::Cancelled`] on cancellation.
    pub async fn await_event<F>(
        &mut self,
        expected: &'static str,
        timeout: Duration,
        cancel: &CancelToken,
        mut accept: F,
    ) -> Result<OutputEvent, ProtocolError>
    where
        F: FnMut(&OutputEvent) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut exit_seen = false;
        loop {
            if cancel.is_cancelled() {
                return Err(ProtocolError::Cancelled);
            }

            self.pump();
            while let Some(event) = self.events.pop_front() {
                if accept(&event) {
                    return Ok(event);
                }
                trace!(?event, expected, "skipping event");
            }

            if !self.shell.is_alive() {
                // One more round so output still in flight from the reader
                // gets a chance to arrive.
                if exit_seen {
                    return Err(ProtocolError::SessionDead);
                }
                exit_seen = true;
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ProtocolError::Timeout {
                    expected,
                    after: timeout,
                });
            }
            let nap = self.poll_interval.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                _ = cancel.cancelled() => return Err(ProtocolError::Cancelled),
            }
        }
    }
}
