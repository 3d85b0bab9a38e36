//! Runs a batch of transfers through one wallet session.
//!
//! Transfers are sent strictly one after another; their ledger verification
//! runs in the background on a small worker pool, so the confirmation of
//! transfer N overlaps the submission of N+1. Every request ends up in the
//! report exactly once.

use crate::amount::{Address, Amount};
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::ProtocolError;
use crate::event::{ErrorKind, TxRef};
use crate::protocol::WalletProtocol;
use crate::retry::RetryPolicy;
use crate::shell::Shell;
use crate::transfer::{FailureReason, RunReport, TransferRecord, TransferRequest, TransferStatus};
use crate::verify::{VerificationOutcome, VerificationQuery};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// The one operation the orchestrator needs from a wallet session.
#[async_trait]
pub trait Wallet: Send {
    async fn send_transfer(
        &mut self,
        address: &Address,
        amount: Amount,
    ) -> Result<TxRef, ProtocolError>;
}

#[async_trait]
impl<S: Shell> Wallet for WalletProtocol<S> {
    async fn send_transfer(
        &mut self,
        address: &Address,
        amount: Amount,
    ) -> Result<TxRef, ProtocolError> {
        WalletProtocol::send_transfer(self, address, amount).await
    }
}

/// Confirms that a sent transfer reached its destination.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, query: VerificationQuery, cancel: CancelToken) -> VerificationOutcome;
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub retry: RetryPolicy,
    pub pause_between_transfers: Duration,
    pub verification_workers: usize,
}

impl BatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: config.retry_policy(),
            pause_between_transfers: config.batch.pause_between_transfers,
            verification_workers: config.batch.verification_workers,
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct Orchestrator<V> {
    options: BatchOptions,
    verifier: Option<Arc<V>>,
    cancel: CancelToken,
}

impl<V: Verifier + 'static> Orchestrator<V> {
    /// Without a verifier every sent transfer ends as pending verification.
    pub fn new(options: BatchOptions, verifier: Option<Arc<V>>, cancel: CancelToken) -> Self {
        Self {
            options,
            verifier,
            cancel,
        }
    }

    /// Send every request and wait for all verifications to finish.
    pub async fn run<W: Wallet>(&self, wallet: &mut W, requests: Vec<TransferRequest>) -> RunReport {
        let total = requests.len();
        let mut records: Vec<TransferRecord> =
            requests.into_iter().map(TransferRecord::new).collect();
        let mut queue: VecDeque<usize> = (0..total).collect();
        let workers = Arc::new(Semaphore::new(self.options.verification_workers.max(1)));
        let mut verifications: JoinSet<(usize, VerificationOutcome)> = JoinSet::new();
        let mut previous: Option<usize> = None;

        while let Some(idx) = queue.pop_front() {
            let delay = match previous {
                None => Duration::ZERO,
                // Deferred and nothing else left to send: let the balance settle.
                Some(prev) if prev == idx => self
                    .options
                    .retry
                    .funds_settle_delay
                    .max(self.options.pause_between_transfers),
                Some(_) => self.options.pause_between_transfers,
            };
            if !self.pause(delay).await {
                queue.push_front(idx);
                abort_queue(&mut records, &mut queue, FailureReason::Cancelled);
                break;
            }
            previous = Some(idx);

            let record = &mut records[idx];
            record.attempts += 1;
            record.status = TransferStatus::Sent;
            let request = record.request.clone();
            info!(
                position = idx + 1,
                total,
                attempt = record.attempts,
                address = %request.address,
                amount = %request.amount,
                "sending transfer"
            );
            let sent_at = Utc::now();

            match wallet.send_transfer(&request.address, request.amount).await {
                Ok(tx) => {
                    info!(address = %request.address, amount = %request.amount, tx = %tx, "transfer accepted");
                    record.tx_ref = Some(tx.clone());
                    record.status = TransferStatus::Verifying;
                    match &self.verifier {
                        Some(verifier) => {
                            let query = VerificationQuery {
                                address: request.address.clone(),
                                amount: request.amount,
                                since: sent_at,
                                tx_ref: Some(tx),
                            };
                            let verifier = Arc::clone(verifier);
                            let workers = Arc::clone(&workers);
                            let cancel = self.cancel.clone();
                            verifications.spawn(async move {
                                // The pool is never closed, so a permit always comes.
                                let _permit = workers.acquire_owned().await.ok();
                                (idx, verifier.verify(query, cancel).await)
                            });
                        }
                        None => {
                            record.status = TransferStatus::PendingVerification;
                            record.reason = Some("verification disabled".to_string());
                        }
                    }
                }
                Err(ProtocolError::Reported {
                    kind: ErrorKind::InsufficientFunds,
                    raw,
                }) => {
                    if self.options.retry.may_retry_funds(record.attempts) {
                        warn!(
                            address = %request.address,
                            attempt = record.attempts,
                            raw = %raw,
                            "insufficient funds, deferring transfer"
                        );
                        record.status = TransferStatus::Pending;
                        queue.push_back(idx);
                    } else {
                        let attempts = record.attempts;
                        record.fail(FailureReason::InsufficientFundsExhausted { attempts });
                        error!(address = %request.address, attempts, "insufficient funds, giving up");
                    }
                }
                Err(err) if err.is_fatal() => {
                    let reason = fatal_reason(&err);
                    error!(address = %request.address, error = %err, "wallet session unusable, stopping batch");
                    record.fail(reason.clone());
                    abort_queue(&mut records, &mut queue, reason);
                    break;
                }
                Err(err) => {
                    error!(address = %request.address, error = %err, "transfer failed");
                    record.fail(transfer_reason(err));
                }
            }
        }

        while let Some(joined) = verifications.join_next().await {
            match joined {
                Ok((idx, outcome)) => apply_verification(&mut records[idx], outcome),
                Err(e) => error!(error = %e, "verification task failed"),
            }
        }
        for record in &mut records {
            if record.status == TransferStatus::Verifying {
                record.status = TransferStatus::PendingVerification;
                record.reason = Some("verification did not complete".to_string());
            }
        }

        let report = RunReport { records };
        info!(
            total = report.total(),
            confirmed = report.confirmed(),
            pending = report.pending(),
            failed = report.failed(),
            "batch finished"
        );
        report
    }

    /// Sleep for `delay`; false if cancelled first.
    async fn pause(&self, delay: Duration) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        if delay.is_zero() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.cancel.cancelled() => false,
        }
    }
}

fn fatal_reason(err: &ProtocolError) -> FailureReason {
    match err {
        ProtocolError::AuthFailed(raw) => FailureReason::AuthFailed(raw.clone()),
        ProtocolError::Cancelled => FailureReason::Cancelled,
        ProtocolError::OutOfStep(_) => FailureReason::Protocol(err.to_string()),
        _ => FailureReason::SessionDead,
    }
}

fn transfer_reason(err: ProtocolError) -> FailureReason {
    match err {
        ProtocolError::Reported {
            kind: ErrorKind::InvalidAddress,
            raw,
        } => FailureReason::InvalidAddress(raw),
        ProtocolError::Reported { raw, .. } => FailureReason::Rejected(raw),
        ProtocolError::Timeout { .. } => FailureReason::Timeout,
        other => FailureReason::Protocol(other.to_string()),
    }
}

fn abort_queue(records: &mut [TransferRecord], queue: &mut VecDeque<usize>, reason: FailureReason) {
    for idx in queue.drain(..) {
        records[idx].fail(reason.clone());
    }
}

fn apply_verification(record: &mut TransferRecord, outcome: VerificationOutcome) {
    record.verification_attempts = outcome.attempts();
    match outcome {
        VerificationOutcome::Confirmed { tx_id, .. } => {
            record.status = TransferStatus::Confirmed;
            record.confirmed_by = Some(tx_id);
        }
        VerificationOutcome::NotFound { attempts } => {
            record.status = TransferStatus::PendingVerification;
            record.reason = Some(format!(
                "not found on ledger after {attempts} lookups; check before resending"
            ));
        }
        VerificationOutcome::Cancelled { .. } => {
            record.status = TransferStatus::PendingVerification;
            record.reason = Some("verification cancelled; check before resending".to_string());
        }
    }
}
