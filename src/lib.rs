//! # kaspa-batch
//!
//! Batch KAS disbursement by driving the interactive `kaspa-cli` wallet
//! shell through a PTY, with every transfer confirmed independently against
//! the Kaspa REST API.
//!
//! The crate is layered bottom-up:
//!
//! | Layer | Module |
//! |-------|--------|
//! | Process in a PTY | [`pty`], behind the [`Shell`] trait |
//! | Output classification | [`patterns`], [`event`] |
//! | Line buffering and bounded waits | [`stream`] |
//! | Wallet dialogue state machine | [`protocol`] |
//! | Batch run with retries and verification | [`orchestrator`], [`verify`] |
//!
//! ## Quick start
//!
//! ```no_run
//! use kaspa_batch::{
//!     BatchOptions, CancelToken, Config, Credentials, EventStream, HttpLedger, MatchRules,
//!     Orchestrator, ProtocolSettings, PtySession, VerificationClient, WalletProtocol,
//!     recipients,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let network = config.network("testnet")?;
//!     let batch = recipients::parse_file("redistribution.csv", &network.address_prefix)?;
//!
//!     let shell = PtySession::start(&config.shell.command, &config.shell.args, None)?;
//!     let stream = EventStream::new(shell, config.pattern_set()?);
//!     let settings = ProtocolSettings::from_config(&config);
//!     let mut wallet = WalletProtocol::new(stream, settings, CancelToken::never());
//!
//!     wallet.await_ready().await?;
//!     wallet.select_network(network).await?;
//!     wallet.connect(network).await?;
//!     wallet.open_wallet("").await?;
//!     wallet.unlock(Credentials::from_env("")?).await?;
//!     wallet.get_balance().await?;
//!
//!     let ledger = HttpLedger::from_settings(&config.verification)?;
//!     let verifier = VerificationClient::new(
//!         ledger,
//!         config.verification.backoff(),
//!         MatchRules::default(),
//!     );
//!     let orchestrator = Orchestrator::new(
//!         BatchOptions::from_config(&config),
//!         Some(Arc::new(verifier)),
//!         CancelToken::never(),
//!     );
//!     let report = orchestrator.run(&mut wallet, batch.requests).await;
//!     wallet.shutdown().await;
//!     println!("{} confirmed, {} pending", report.confirmed(), report.pending());
//!     Ok(())
//! }
//! ```
//!
//! ## Adapting to another shell version
//!
//! Command wording and reply patterns live in [`Config`]; a changed prompt
//! text needs a `[[patterns]]` entry, not a code change.

pub mod amount;
pub mod cancel;
pub mod config;
pub mod error;
pub mod event;
pub mod orchestrator;
pub mod patterns;
pub mod protocol;
pub mod pty;
pub(crate) mod pty_reader;
pub mod recipients;
pub mod retry;
pub mod shell;
pub mod stream;
pub mod transfer;
pub mod verify;

#[cfg(test)]
mod testing;

pub use amount::{Address, Amount};
pub use cancel::{CancelHandle, CancelToken};
pub use config::Config;
pub use error::{ConfigError, LookupError, ProtocolError, RecipientError, SessionError};
pub use event::{OutputEvent, TxRef};
pub use orchestrator::{BatchOptions, Orchestrator, Verifier, Wallet};
pub use patterns::PatternSet;
pub use protocol::{Credentials, ProtocolSettings, ProtocolState, WalletProtocol};
pub use pty::PtySession;
pub use shell::Shell;
pub use stream::EventStream;
pub use transfer::{FailureReason, Outcome, RunReport, TransferRecord, TransferRequest};
pub use verify::{HttpLedger, MatchRules, VerificationClient};
