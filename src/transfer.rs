//! Transfer requests, their per-run records and the final report.

use crate::amount::{Address, Amount};
use crate::event::TxRef;
use std::fmt;

/// One payout: who gets how much.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub address: Address,
    pub amount: Amount,
}

impl TransferRequest {
    pub fn new(address: Address, amount: Amount) -> Self {
        Self { address, amount }
    }
}

impl fmt::Display for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.amount, self.address)
    }
}

/// Why a transfer ended as failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    InsufficientFundsExhausted { attempts: u32 },
    InvalidAddress(String),
    /// Any other error the wallet printed in reply to the send.
    Rejected(String),
    /// No result within the transfer timeout. The transfer may or may not
    /// have gone out.
    Timeout,
    SessionDead,
    AuthFailed(String),
    Cancelled,
    Protocol(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::InsufficientFundsExhausted { attempts } => {
                write!(f, "insufficient funds after {attempts} attempts")
            }
            FailureReason::InvalidAddress(raw) => write!(f, "invalid address: {raw}"),
            FailureReason::Rejected(raw) => write!(f, "rejected by wallet: {raw}"),
            FailureReason::Timeout => f.write_str(
                "no result from wallet before the timeout; check the wallet history before resending",
            ),
            FailureReason::SessionDead => f.write_str("wallet shell exited"),
            FailureReason::AuthFailed(raw) => write!(f, "authentication failed: {raw}"),
            FailureReason::Cancelled => f.write_str("cancelled"),
            FailureReason::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Sent,
    Verifying,
    Confirmed,
    PendingVerification,
    Failed(FailureReason),
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Confirmed
                | TransferStatus::PendingVerification
                | TransferStatus::Failed(_)
        )
    }
}

/// Everything known about one request during a run.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub request: TransferRequest,
    pub status: TransferStatus,
    pub attempts: u32,
    pub tx_ref: Option<TxRef>,
    /// Ledger transaction id that confirmed the transfer.
    pub confirmed_by: Option<String>,
    pub verification_attempts: u32,
    pub reason: Option<String>,
}

impl TransferRecord {
    pub fn new(request: TransferRequest) -> Self {
        Self {
            request,
            status: TransferStatus::Pending,
            attempts: 0,
            tx_ref: None,
            confirmed_by: None,
            verification_attempts: 0,
            reason: None,
        }
    }

    pub fn fail(&mut self, reason: FailureReason) {
        self.reason = Some(reason.to_string());
        self.status = TransferStatus::Failed(reason);
    }

    pub fn outcome(&self) -> Outcome {
        match (&self.status, &self.tx_ref) {
            (TransferStatus::Confirmed, Some(tx)) => Outcome::Confirmed(tx.clone()),
            (TransferStatus::Failed(reason), _) => Outcome::Failed(reason.clone()),
            (_, Some(tx)) => Outcome::PendingVerification(tx.clone()),
            (status, None) => Outcome::Failed(FailureReason::Protocol(format!(
                "record left in state {status:?}"
            ))),
        }
    }
}

/// Final result for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Confirmed(TxRef),
    PendingVerification(TxRef),
    Failed(FailureReason),
}

/// One record per input request, in input order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub records: Vec<TransferRecord>,
}

impl RunReport {
    pub fn outcomes(&self) -> impl Iterator<Item = (&TransferRecord, Outcome)> {
        self.records.iter().map(|r| (r, r.outcome()))
    }

    pub fn confirmed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Confirmed(_)))
    }

    pub fn pending(&self) -> usize {
        self.count(|o| matches!(o, Outcome::PendingVerification(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    /// Records whose transfer went out but was not confirmed on the ledger.
    pub fn pending_records(&self) -> impl Iterator<Item = &TransferRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome(), Outcome::PendingVerification(_)))
    }

    pub fn all_failed(&self) -> bool {
        !self.records.is_empty() && self.failed() == self.total()
    }

    /// Sum of the amounts that left the wallet, confirmed or not.
    pub fn sent_amount(&self) -> Amount {
        self.records
            .iter()
            .filter(|r| r.tx_ref.is_some())
            .fold(Amount::ZERO, |acc, r| {
                acc.checked_add(r.request.amount).unwrap_or(acc)
            })
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome())).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: TransferStatus, tx: Option<&str>) -> TransferRecord {
        let mut record = TransferRecord::new(TransferRequest::new(
            Address::new("kaspa:qq"),
            "1.5".parse().unwrap(),
        ));
        record.status = status;
        record.tx_ref = tx.map(|t| TxRef(t.to_string()));
        record
    }

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(
            record(TransferStatus::Confirmed, Some("aa")).outcome(),
            Outcome::Confirmed(TxRef("aa".into()))
        );
        assert_eq!(
            record(TransferStatus::PendingVerification, Some("aa")).outcome(),
            Outcome::PendingVerification(TxRef("aa".into()))
        );
        // Sent but never verified still counts as pending, never silently dropped.
        assert_eq!(
            record(TransferStatus::Verifying, Some("aa")).outcome(),
            Outcome::PendingVerification(TxRef("aa".into()))
        );
        assert!(matches!(
            record(TransferStatus::Pending, None).outcome(),
            Outcome::Failed(FailureReason::Protocol(_))
        ));
    }

    #[test]
    fn test_fail_records_reason() {
        let mut r = record(TransferStatus::Sent, None);
        r.fail(FailureReason::InsufficientFundsExhausted { attempts: 3 });
        assert_eq!(r.reason.as_deref(), Some("insufficient funds after 3 attempts"));
        assert!(r.status.is_terminal());
    }

    #[test]
    fn test_report_counts() {
        let mut failed = record(TransferStatus::Pending, None);
        failed.fail(FailureReason::Cancelled);
        let report = RunReport {
            records: vec![
                record(TransferStatus::Confirmed, Some("aa")),
                record(TransferStatus::PendingVerification, Some("bb")),
                failed,
            ],
        };
        assert_eq!(
            (report.confirmed(), report.pending(), report.failed()),
            (1, 1, 1)
        );
        assert_eq!(report.pending_records().count(), 1);
        assert!(!report.all_failed());
        assert_eq!(report.sent_amount(), "3".parse().unwrap());
    }
}
