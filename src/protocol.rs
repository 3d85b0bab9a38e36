//! The dialogue with the wallet shell, one confirmed step at a time.
//!
//! Every operation sends a command and then waits, with a bound, for the
//! reply that proves it worked. Errors, timeouts and prompts nobody asked
//! for fail the step. Nothing is assumed from the absence of output.

use crate::amount::{Address, Amount};
use crate::cancel::CancelToken;
use crate::config::{CommandSet, Config, NetworkProfile};
use crate::error::{ConfigError, ProtocolError};
use crate::event::{AckKind, ErrorKind, OutputEvent, TxRef};
use crate::shell::Shell;
use crate::stream::EventStream;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

pub const WALLET_PASSWORD_ENV: &str = "KASPA_WALLET_PASSWORD";
pub const PAYMENT_PASSWORD_ENV: &str = "KASPA_PAYMENT_PASSWORD";

/// Where the wallet session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Disconnected,
    NetworkSelected,
    Connected,
    WalletOpen,
    Unlocked,
    Ready,
}

/// Progress of the command currently being exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpState {
    Idle,
    CommandSent,
    AwaitingResult,
    Resolved,
}

/// Wallet name and passwords. The passwords are wiped from memory on drop
/// and never printed by `Debug`.
pub struct Credentials {
    wallet_name: String,
    wallet_password: Zeroizing<String>,
    payment_password: Option<Zeroizing<String>>,
}

impl Credentials {
    pub fn new(wallet_name: impl Into<String>, wallet_password: impl Into<String>) -> Self {
        Self {
            wallet_name: wallet_name.into(),
            wallet_password: Zeroizing::new(wallet_password.into()),
            payment_password: None,
        }
    }

    pub fn with_payment_password(mut self, payment_password: impl Into<String>) -> Self {
        let payment_password = payment_password.into();
        if !payment_password.is_empty() {
            self.payment_password = Some(Zeroizing::new(payment_password));
        }
        self
    }

    /// Read the passwords from `KASPA_WALLET_PASSWORD` and the optional
    /// `KASPA_PAYMENT_PASSWORD`.
    pub fn from_env(wallet_name: impl Into<String>) -> Result<Self, ConfigError> {
        let wallet_password = Zeroizing::new(
            std::env::var(WALLET_PASSWORD_ENV)
                .map_err(|_| ConfigError::MissingEnv(WALLET_PASSWORD_ENV))?,
        );
        let mut credentials = Self::new(wallet_name, wallet_password.as_str());
        if let Ok(payment) = std::env::var(PAYMENT_PASSWORD_ENV) {
            credentials = credentials.with_payment_password(Zeroizing::new(payment).as_str());
        }
        Ok(credentials)
    }

    pub fn wallet_name(&self) -> &str {
        &self.wallet_name
    }

    fn wallet_password(&self) -> &str {
        &self.wallet_password
    }

    /// The payment password, falling back to the wallet password.
    fn payment_password(&self) -> &str {
        self.payment_password
            .as_deref()
            .map_or_else(|| self.wallet_password(), |p| p.as_str())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("wallet_name", &self.wallet_name)
            .field("wallet_password", &"***")
            .field("payment_password", &self.payment_password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Commands and time limits for one session.
#[derive(Debug, Clone)]
pub struct ProtocolSettings {
    pub commands: CommandSet,
    pub startup_timeout: Duration,
    pub step_timeout: Duration,
    pub transfer_timeout: Duration,
    pub exit_command: String,
    pub terminate_grace: Duration,
}

impl ProtocolSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            commands: config.commands.clone(),
            startup_timeout: config.shell.startup_timeout,
            step_timeout: config.timeouts.step,
            transfer_timeout: config.timeouts.transfer,
            exit_command: config.shell.exit_command.clone(),
            terminate_grace: config.shell.terminate_grace,
        }
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Drives one wallet shell session through its [`ProtocolState`]s.
///
/// All operations take `&mut self`, so at most one command is ever in flight.
pub struct WalletProtocol<S> {
    stream: EventStream<S>,
    settings: ProtocolSettings,
    cancel: CancelToken,
    state: ProtocolState,
    op: OpState,
    password_pending: bool,
    credentials: Option<Credentials>,
}

impl<S: Shell> WalletProtocol<S> {
    pub fn new(stream: EventStream<S>, settings: ProtocolSettings, cancel: CancelToken) -> Self {
        Self {
            stream,
            settings,
            cancel,
            state: ProtocolState::Disconnected,
            op: OpState::Idle,
            password_pending: false,
            credentials: None,
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn op_state(&self) -> OpState {
        self.op
    }

    pub fn stream(&self) -> &EventStream<S> {
        &self.stream
    }

    /// Wait for the shell's start-up banner.
    pub async fn await_ready(&mut self) -> Result<(), ProtocolError> {
        self.require("await_ready", &[ProtocolState::Disconnected])?;
        let timeout = self.settings.startup_timeout;
        self.exchange(None, "shell banner", timeout, |e| {
            matches!(e, OutputEvent::Acknowledged(AckKind::ShellReady))
        })
        .await?;
        info!("wallet shell is ready");
        Ok(())
    }

    pub async fn select_network(&mut self, profile: &NetworkProfile) -> Result<(), ProtocolError> {
        self.require("select_network", &[ProtocolState::Disconnected])?;
        let timeout = self.settings.step_timeout;
        self.exchange(
            Some(&profile.network_command),
            "network acknowledgement",
            timeout,
            |e| matches!(e, OutputEvent::Acknowledged(AckKind::NetworkSet)),
        )
        .await?;
        self.state = ProtocolState::NetworkSelected;
        info!(command = %profile.network_command, "network selected");
        Ok(())
    }

    pub async fn connect(&mut self, profile: &NetworkProfile) -> Result<(), ProtocolError> {
        self.require("connect", &[ProtocolState::NetworkSelected])?;
        let timeout = self.settings.step_timeout;
        self.exchange(
            Some(&profile.connect_command),
            "node connection",
            timeout,
            |e| matches!(e, OutputEvent::Acknowledged(AckKind::Connected)),
        )
        .await?;
        self.state = ProtocolState::Connected;
        info!("connected to node");
        Ok(())
    }

    /// Open the named wallet (empty name: the shell's default wallet).
    pub async fn open_wallet(&mut self, name: &str) -> Result<(), ProtocolError> {
        self.require("open_wallet", &[ProtocolState::Connected])?;
        let command = self.settings.commands.open_command(name);
        let timeout = self.settings.step_timeout;
        let event = self
            .exchange(Some(&command), "wallet password prompt", timeout, |e| {
                matches!(
                    e,
                    OutputEvent::PasswordPrompt
                        | OutputEvent::Acknowledged(AckKind::WalletAlreadyOpen)
                )
            })
            .await?;
        self.password_pending = event == OutputEvent::PasswordPrompt;
        self.state = ProtocolState::WalletOpen;
        debug!(wallet = name, password_pending = self.password_pending, "wallet opened");
        Ok(())
    }

    /// Answer the pending password prompt and keep the credentials for
    /// later transfer prompts.
    pub async fn unlock(&mut self, credentials: Credentials) -> Result<(), ProtocolError> {
        self.require("unlock", &[ProtocolState::WalletOpen])?;
        if !self.password_pending {
            self.credentials = Some(credentials);
            self.state = ProtocolState::Unlocked;
            return Ok(());
        }

        let result = self.answer_unlock(&credentials).await;
        self.op = OpState::Resolved;
        result?;
        info!(wallet = credentials.wallet_name(), "wallet unlocked");
        self.password_pending = false;
        self.credentials = Some(credentials);
        self.state = ProtocolState::Unlocked;
        Ok(())
    }

    async fn answer_unlock(&mut self, credentials: &Credentials) -> Result<(), ProtocolError> {
        self.stream.send_secret(credentials.wallet_password())?;
        self.op = OpState::CommandSent;
        let deadline = Instant::now() + self.settings.step_timeout;
        let mut payment_answered = false;
        loop {
            self.op = OpState::AwaitingResult;
            let event = self
                .await_until(deadline, "wallet unlock", |e| {
                    e.is_password_prompt()
                        || matches!(e, OutputEvent::Acknowledged(AckKind::WalletOpened))
                })
                .await?;
            match event {
                OutputEvent::Acknowledged(_) => return Ok(()),
                OutputEvent::PaymentPasswordPrompt if !payment_answered => {
                    payment_answered = true;
                    self.stream.send_secret(credentials.payment_password())?;
                }
                _ => {
                    return Err(ProtocolError::AuthFailed(
                        "password prompt repeated".to_string(),
                    ));
                }
            }
        }
    }

    /// Ask for the wallet balance. The first success makes the session ready
    /// for transfers.
    pub async fn get_balance(&mut self) -> Result<Amount, ProtocolError> {
        self.require("get_balance", &[ProtocolState::Unlocked, ProtocolState::Ready])?;
        let command = self.settings.commands.balance.clone();
        let timeout = self.settings.step_timeout;
        let event = self
            .exchange(Some(&command), "balance", timeout, |e| {
                matches!(e, OutputEvent::BalanceReported(_))
            })
            .await?;
        let OutputEvent::BalanceReported(balance) = event else {
            return Err(ProtocolError::UnexpectedPrompt(format!("{event:?}")));
        };
        self.state = ProtocolState::Ready;
        info!(%balance, "wallet balance");
        Ok(balance)
    }

    /// Send one transfer and wait for the shell to confirm it with a
    /// transaction id. Password prompts along the way are answered with the
    /// stored credentials.
    pub async fn send_transfer(
        &mut self,
        address: &Address,
        amount: Amount,
    ) -> Result<TxRef, ProtocolError> {
        self.require("send_transfer", &[ProtocolState::Ready])?;
        if !matches!(self.op, OpState::Idle | OpState::Resolved) {
            return Err(ProtocolError::InvalidState {
                operation: "send_transfer",
                state: self.state,
            });
        }
        let command = self
            .settings
            .commands
            .send_command(address.as_str(), &amount.to_string());
        let timeout = self.settings.transfer_timeout;

        self.stream.discard_pending();
        self.op = OpState::Idle;
        let result = self.transfer_dialogue(&command, timeout).await;
        self.op = OpState::Resolved;

        match result {
            Err(ProtocolError::Timeout { .. }) => Err(ProtocolError::Timeout {
                expected: "transfer result",
                after: timeout,
            }),
            other => other,
        }
    }

    async fn transfer_dialogue(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<TxRef, ProtocolError> {
        let credentials = self.credentials.take().ok_or(ProtocolError::InvalidState {
            operation: "send_transfer",
            state: self.state,
        })?;
        let result = self.run_transfer(command, timeout, &credentials).await;
        self.credentials = Some(credentials);
        result
    }

    async fn run_transfer(
        &mut self,
        command: &str,
        timeout: Duration,
        credentials: &Credentials,
    ) -> Result<TxRef, ProtocolError> {
        self.stream.send(command)?;
        self.op = OpState::CommandSent;
        let deadline = Instant::now() + timeout;
        let mut wallet_answered = false;
        let mut payment_answered = false;
        loop {
            self.op = OpState::AwaitingResult;
            let event = self
                .await_until(deadline, "transfer result", |e| {
                    e.is_password_prompt() || matches!(e, OutputEvent::TransferAccepted(_))
                })
                .await?;
            match event {
                // Before any password of ours went in, a tx id can only be a
                // late reply to an earlier send, and the shell may still be
                // waiting for a password.
                OutputEvent::TransferAccepted(tx) if !wallet_answered && !payment_answered => {
                    warn!(tx = %tx, "transaction id arrived before the transfer was authorised");
                    return Err(ProtocolError::OutOfStep(format!(
                        "tx id {tx} arrived before the password prompt was answered"
                    )));
                }
                OutputEvent::TransferAccepted(tx) => return Ok(tx),
                OutputEvent::PasswordPrompt if !wallet_answered => {
                    wallet_answered = true;
                    self.stream.send_secret(credentials.wallet_password())?;
                }
                OutputEvent::PaymentPasswordPrompt if !payment_answered => {
                    payment_answered = true;
                    self.stream.send_secret(credentials.payment_password())?;
                }
                _ => {
                    return Err(ProtocolError::AuthFailed(
                        "password prompt repeated during transfer".to_string(),
                    ));
                }
            }
        }
    }

    /// Say goodbye to the shell and make sure the process is gone.
    pub async fn shutdown(&mut self) {
        let grace = self.settings.terminate_grace;
        let exit_command = self.settings.exit_command.clone();
        if self.stream.shell_mut().is_alive() {
            self.stream.discard_pending();
            match self.stream.send(&exit_command) {
                Ok(()) => {
                    let goodbye = self
                        .stream
                        .await_event("goodbye", grace, &CancelToken::never(), |e| {
                            matches!(e, OutputEvent::Acknowledged(AckKind::Goodbye))
                        })
                        .await;
                    if let Err(e) = goodbye {
                        debug!(error = %e, "no goodbye from wallet shell");
                    }
                }
                Err(e) => debug!(error = %e, "could not send exit command"),
            }
        }
        self.stream.shell_mut().terminate(&exit_command, grace).await;
        self.state = ProtocolState::Disconnected;
        self.op = OpState::Idle;
        self.credentials = None;
    }

    fn require(
        &self,
        operation: &'static str,
        allowed: &[ProtocolState],
    ) -> Result<(), ProtocolError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ProtocolError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Send `command` (if any) and wait for an event accepted by `accept`.
    async fn exchange<F>(
        &mut self,
        command: Option<&str>,
        expected: &'static str,
        timeout: Duration,
        accept: F,
    ) -> Result<OutputEvent, ProtocolError>
    where
        F: Fn(&OutputEvent) -> bool,
    {
        if let Some(command) = command {
            self.stream.discard_pending();
            self.stream.send(command)?;
            self.op = OpState::CommandSent;
        }
        self.op = OpState::AwaitingResult;
        let result = self
            .await_until(Instant::now() + timeout, expected, accept)
            .await;
        self.op = OpState::Resolved;
        result
    }

    /// Wait until `deadline` for an accepted event, failing early on errors
    /// and on prompts `accept` does not cover.
    async fn await_until<F>(
        &mut self,
        deadline: Instant,
        expected: &'static str,
        accept: F,
    ) -> Result<OutputEvent, ProtocolError>
    where
        F: Fn(&OutputEvent) -> bool,
    {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = self
            .stream
            .await_event(expected, remaining, &self.cancel, |e| {
                accept(e) || e.is_error() || is_prompt(e)
            })
            .await?;
        if accept(&event) {
            return Ok(event);
        }
        match event {
            OutputEvent::ErrorReported {
                kind: ErrorKind::AuthFailed,
                raw,
            } => Err(ProtocolError::AuthFailed(raw)),
            OutputEvent::ErrorReported { kind, raw } => {
                warn!(%kind, raw = %raw, expected, "wallet reported an error");
                Err(ProtocolError::Reported { kind, raw })
            }
            other => Err(ProtocolError::UnexpectedPrompt(match other {
                OutputEvent::ConfirmationPrompt(text) => text,
                other => format!("{other:?}"),
            })),
        }
    }
}

fn is_prompt(event: &OutputEvent) -> bool {
    event.is_password_prompt() || matches!(event, OutputEvent::ConfirmationPrompt(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::PatternSet;
    use crate::testing::{ScriptedShell, TEST_TX, credentials, fast_settings, protocol, ready};

    fn profile() -> NetworkProfile {
        Config::default().network("testnet").unwrap().clone()
    }

    #[tokio::test]
    async fn test_full_session() {
        let mut p = protocol(ScriptedShell::kaspa_cli());
        p.await_ready().await.unwrap();
        p.select_network(&profile()).await.unwrap();
        assert_eq!(p.state(), ProtocolState::NetworkSelected);
        p.connect(&profile()).await.unwrap();
        assert_eq!(p.state(), ProtocolState::Connected);
        p.open_wallet("").await.unwrap();
        assert_eq!(p.state(), ProtocolState::WalletOpen);
        p.unlock(credentials()).await.unwrap();
        assert_eq!(p.state(), ProtocolState::Unlocked);
        let balance = p.get_balance().await.unwrap();
        assert_eq!(balance, "12.5".parse().unwrap());
        assert_eq!(p.state(), ProtocolState::Ready);

        let tx = p
            .send_transfer(&Address::new("kaspatest:qqa"), "1".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(tx, TxRef(TEST_TX.to_string()));
        assert_eq!(p.op_state(), OpState::Resolved);

        p.shutdown().await;
        assert_eq!(p.state(), ProtocolState::Disconnected);
        let shell = p.stream().shell();
        assert!(shell.was_terminated());
        assert_eq!(
            shell.sent(),
            &[
                "network testnet-10",
                "connect wss://tau-10.kaspa.blue/kaspa/testnet-10/wrpc/borsh",
                "open",
                "pw",
                "list",
                "send kaspatest:qqa 1",
                "pw",
                "pay",
                "exit",
            ]
        );
    }

    #[tokio::test]
    async fn test_steps_out_of_order_are_rejected() {
        let mut p = protocol(ScriptedShell::kaspa_cli());
        let err = p
            .send_transfer(&Address::new("kaspatest:qqa"), "1".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidState {
                operation: "send_transfer",
                state: ProtocolState::Disconnected
            }
        ));
        assert!(matches!(
            p.connect(&profile()).await,
            Err(ProtocolError::InvalidState { .. })
        ));
        assert!(p.stream().shell().sent().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_password_is_auth_failure() {
        let shell = ScriptedShell::kaspa_cli().on("bad", "\nError: invalid password\n");
        let mut p = protocol(shell);
        p.await_ready().await.unwrap();
        p.select_network(&profile()).await.unwrap();
        p.connect(&profile()).await.unwrap();
        p.open_wallet("").await.unwrap();
        let err = p.unlock(Credentials::new("", "bad")).await.unwrap_err();
        assert!(matches!(err, ProtocolError::AuthFailed(_)));
        assert!(err.is_fatal());
        assert_eq!(p.state(), ProtocolState::WalletOpen);
    }

    #[tokio::test]
    async fn test_wallet_already_open_skips_password() {
        let shell = ScriptedShell::kaspa_cli().on("open", "Wallet is already open\n");
        let mut p = protocol(shell);
        p.await_ready().await.unwrap();
        p.select_network(&profile()).await.unwrap();
        p.connect(&profile()).await.unwrap();
        p.open_wallet("").await.unwrap();
        p.unlock(credentials()).await.unwrap();
        assert_eq!(p.state(), ProtocolState::Unlocked);
        assert!(!p.stream().shell().sent().contains(&"pw".to_string()));
    }

    #[tokio::test]
    async fn test_network_error_fails_step() {
        let shell = ScriptedShell::new()
            .with_banner("type 'help' for list of commands\n")
            .on("network", "network error: unknown network id\n");
        let mut p = protocol(shell);
        p.await_ready().await.unwrap();
        let err = p.select_network(&profile()).await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Reported {
                kind: ErrorKind::Network,
                ..
            }
        ));
        assert_eq!(p.state(), ProtocolState::Disconnected);
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_reported() {
        let shell = ScriptedShell::kaspa_cli().on("pay", "\nError: not enough funds\n$ ");
        let mut p = ready(shell).await;
        let err = p
            .send_transfer(&Address::new("kaspatest:qqa"), "100".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Reported {
                kind: ErrorKind::InsufficientFunds,
                ..
            }
        ));
        assert!(!err.is_fatal());
        assert_eq!(p.state(), ProtocolState::Ready);
    }

    #[tokio::test]
    async fn test_confirmation_prompt_is_unexpected() {
        let shell = ScriptedShell::kaspa_cli().on("send", "Are you sure? (y/n) ");
        let mut p = ready(shell).await;
        let err = p
            .send_transfer(&Address::new("kaspatest:qqa"), "1".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedPrompt(text) if text.contains("y/n")));
    }

    #[tokio::test]
    async fn test_silence_is_a_timeout_not_a_success() {
        let shell = ScriptedShell::kaspa_cli().on("pay", "\nSending 1 TKAS\n");
        let mut p = ready(shell).await;
        let err = p
            .send_transfer(&Address::new("kaspatest:qqa"), "1".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Timeout {
                expected: "transfer result",
                ..
            }
        ));
        // The session stays usable for the next transfer.
        assert_eq!(p.state(), ProtocolState::Ready);
    }

    #[tokio::test]
    async fn test_late_tx_id_is_not_taken_for_the_next_transfer() {
        let late_tx = "ab".repeat(32);
        let late_reply = format!("tx ids: {late_tx}\nEnter wallet password: ");
        let shell = ScriptedShell::kaspa_cli()
            .on("pay", "\nSending 1 TKAS\n")
            .on_seq("send", &["Enter wallet password: ", late_reply.as_str()]);
        let mut p = ready(shell).await;
        let first = p
            .send_transfer(&Address::new("kaspatest:qqa"), "1".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(first, ProtocolError::Timeout { .. }));

        let second = p
            .send_transfer(&Address::new("kaspatest:qqb"), "1".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(&second, ProtocolError::OutOfStep(text) if text.contains(&late_tx)));
        assert!(second.is_fatal());
        // Nothing was typed into the open password prompt.
        assert_eq!(p.stream().shell().sent().last().unwrap(), "send kaspatest:qqb 1");
    }

    #[tokio::test]
    async fn test_dead_shell_during_transfer() {
        // 6th line sent is the first transfer command.
        let mut p = ready(ScriptedShell::kaspa_cli().die_on_send(6)).await;
        let err = p
            .send_transfer(&Address::new("kaspatest:qqa"), "1".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::SessionDead));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_never_more_than_one_transfer_outstanding() {
        let shell = ScriptedShell::kaspa_cli().track_outstanding("send ", &["tx ids:", "not enough funds"]);
        let mut p = ready(shell).await;
        for i in 0..5 {
            let address = Address::new(format!("kaspatest:qq{i}"));
            p.send_transfer(&address, "1".parse().unwrap()).await.unwrap();
        }
        assert_eq!(p.stream().shell().max_outstanding(), 1);
    }

    #[tokio::test]
    async fn test_cancel_aborts_wait() {
        let (handle, token) = CancelToken::pair();
        let shell = ScriptedShell::new();
        let stream = EventStream::new(shell, PatternSet::default())
            .with_poll_interval(Duration::from_millis(2));
        let mut p = WalletProtocol::new(
            stream,
            ProtocolSettings {
                startup_timeout: Duration::from_secs(30),
                ..fast_settings()
            },
            token,
        );
        handle.cancel();
        let err = p.await_ready().await.unwrap_err();
        assert!(matches!(err, ProtocolError::Cancelled));
    }

    #[test]
    fn test_credentials_debug_hides_passwords() {
        let text = format!("{:?}", credentials());
        assert!(!text.contains("pw\""));
        assert!(!text.contains("pay\""));
        assert_eq!(credentials().payment_password(), "pay");
        assert_eq!(Credentials::new("w", "pw").payment_password(), "pw");
        assert_eq!(
            Credentials::new("w", "pw").with_payment_password("").payment_password(),
            "pw"
        );
    }
}
