//! Scripted stand-in for the wallet shell used by unit tests.

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::SessionError;
use crate::patterns::PatternSet;
use crate::protocol::{Credentials, ProtocolSettings, WalletProtocol};
use crate::shell::Shell;
use crate::stream::EventStream;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;

/// Transaction id every scripted transfer is accepted with.
pub const TEST_TX: &str = "3f1c9a0b7d2e4f6a8b9c0d1e2f3a4b5c6d7e8f9a0b1c2d3e4f5a6b7c8d9e0f1a";

struct Reply {
    trigger: String,
    outputs: VecDeque<String>,
}

/// A [`Shell`] that answers sent lines with canned output.
///
/// Replies are matched by prefix; later registrations take precedence. A
/// trigger registered with several outputs answers with them in turn and
/// repeats the last one.
#[derive(Default)]
pub struct ScriptedShell {
    replies: Vec<Reply>,
    output: String,
    sent: Vec<String>,
    dead: bool,
    die_on_send: Option<usize>,
    exit_trigger: Option<String>,
    terminated: bool,
    open_prefix: Option<String>,
    close_markers: Vec<String>,
    outstanding: usize,
    max_outstanding: usize,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output already waiting before anything is sent.
    pub fn with_banner(mut self, text: &str) -> Self {
        self.output.push_str(text);
        self
    }

    pub fn on(self, trigger: &str, output: &str) -> Self {
        self.on_seq(trigger, &[output])
    }

    pub fn on_seq(mut self, trigger: &str, outputs: &[&str]) -> Self {
        self.replies.push(Reply {
            trigger: trigger.to_string(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// The `n`-th sent line (1-based) kills the process instead of being answered.
    pub fn die_on_send(mut self, n: usize) -> Self {
        self.die_on_send = Some(n);
        self
    }

    /// Lines starting with `trigger` are answered, then the process exits.
    pub fn exit_on(mut self, trigger: &str) -> Self {
        self.exit_trigger = Some(trigger.to_string());
        self
    }

    /// Count lines starting with `open_prefix` as in flight until one of
    /// `close_markers` shows up in polled output.
    pub fn track_outstanding(mut self, open_prefix: &str, close_markers: &[&str]) -> Self {
        self.open_prefix = Some(open_prefix.to_string());
        self.close_markers = close_markers.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Replies the way `kaspa-cli` does for wallet password `pw` and
    /// payment password `pay`.
    pub fn kaspa_cli() -> Self {
        Self::new()
            .with_banner("Kaspa Cli Wallet v0.15.0\ntype 'help' for list of commands\n$ ")
            .on("network", "Setting network id to: testnet-10\n$ ")
            .on("connect", "Connected to Kaspa node version 0.15.0\n$ ")
            .on("open", "Enter wallet password: ")
            .on_seq(
                "pw",
                &["\nYour wallet hint is: blue\n$ ", "\nEnter payment password: "],
            )
            .on("pay", &format!("\nSending 1 TKAS\ntx ids: {TEST_TX}\n$ "))
            .on("list", "Accounts:\n  • 12.5 TKAS  kaspatest:qq0\n$ ")
            .on("send", "Enter wallet password: ")
            .on("exit", "bye!\n")
            .exit_on("exit")
    }

    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding
    }

    pub fn was_terminated(&self) -> bool {
        self.terminated
    }

    pub fn push_output(&mut self, text: &str) {
        self.output.push_str(text);
    }

    pub fn kill(&mut self) {
        self.dead = true;
    }
}

#[async_trait]
impl Shell for ScriptedShell {
    fn send_line(&mut self, text: &str) -> Result<(), SessionError> {
        if self.dead {
            return Err(SessionError::Dead);
        }
        self.sent.push(text.to_string());
        if self.die_on_send == Some(self.sent.len()) {
            self.dead = true;
            return Ok(());
        }
        if let Some(prefix) = &self.open_prefix {
            if text.starts_with(prefix.as_str()) {
                self.outstanding += 1;
                self.max_outstanding = self.max_outstanding.max(self.outstanding);
            }
        }
        if let Some(reply) = self
            .replies
            .iter_mut()
            .rev()
            .find(|r| text.starts_with(r.trigger.as_str()))
        {
            let output = if reply.outputs.len() > 1 {
                reply.outputs.pop_front()
            } else {
                reply.outputs.front().cloned()
            };
            if let Some(output) = output {
                self.output.push_str(&output);
            }
        }
        if let Some(trigger) = &self.exit_trigger {
            if text.starts_with(trigger.as_str()) {
                self.dead = true;
            }
        }
        Ok(())
    }

    fn poll(&mut self) -> String {
        let text = std::mem::take(&mut self.output);
        let closed: usize = self
            .close_markers
            .iter()
            .map(|marker| text.matches(marker.as_str()).count())
            .sum();
        self.outstanding = self.outstanding.saturating_sub(closed);
        text
    }

    fn is_alive(&mut self) -> bool {
        !self.dead
    }

    async fn terminate(&mut self, exit_command: &str, _grace: Duration) {
        if self.terminated {
            return;
        }
        if !self.dead {
            self.sent.push(exit_command.to_string());
        }
        self.dead = true;
        self.terminated = true;
    }
}

pub fn fast_settings() -> ProtocolSettings {
    ProtocolSettings {
        startup_timeout: Duration::from_millis(200),
        step_timeout: Duration::from_millis(200),
        transfer_timeout: Duration::from_millis(200),
        terminate_grace: Duration::from_millis(50),
        ..ProtocolSettings::default()
    }
}

pub fn protocol(shell: ScriptedShell) -> WalletProtocol<ScriptedShell> {
    let stream =
        EventStream::new(shell, PatternSet::default()).with_poll_interval(Duration::from_millis(2));
    WalletProtocol::new(stream, fast_settings(), CancelToken::never())
}

pub fn credentials() -> Credentials {
    Credentials::new("", "pw").with_payment_password("pay")
}

/// A protocol that went through every setup step and is ready to transfer.
pub async fn ready(shell: ScriptedShell) -> WalletProtocol<ScriptedShell> {
    let config = Config::default();
    let profile = config.network("testnet").unwrap();
    let mut p = protocol(shell);
    p.await_ready().await.unwrap();
    p.select_network(profile).await.unwrap();
    p.connect(profile).await.unwrap();
    p.open_wallet("").await.unwrap();
    p.unlock(credentials()).await.unwrap();
    p.get_balance().await.unwrap();
    p
}
