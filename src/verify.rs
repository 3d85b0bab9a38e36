//! Independent confirmation of sent transfers against the public ledger.
//!
//! The ledger is eventually consistent, so a transfer that is not visible yet
//! is looked up again after a growing delay. Lookup errors of any kind cost
//! one attempt and are retried like a miss. Running out of attempts never
//! means the transfer failed, only that it could not be confirmed.

use crate::amount::{Address, Amount};
use crate::cancel::CancelToken;
use crate::config::VerificationSettings;
use crate::error::LookupError;
use crate::event::TxRef;
use crate::orchestrator::Verifier;
use crate::retry::Backoff;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A transaction as returned by the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTransaction {
    pub id: String,
    pub block_time: Option<DateTime<Utc>>,
    pub accepted: bool,
    pub outputs: Vec<LedgerOutput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerOutput {
    pub address: String,
    pub amount: Amount,
}

/// Source of recent transactions touching an address.
#[async_trait]
pub trait LedgerLookup: Send + Sync {
    async fn recent_transactions(
        &self,
        address: &Address,
    ) -> Result<Vec<LedgerTransaction>, LookupError>;
}

/// What to look for.
#[derive(Debug, Clone)]
pub struct VerificationQuery {
    pub address: Address,
    pub amount: Amount,
    /// When the transfer was sent.
    pub since: DateTime<Utc>,
    pub tx_ref: Option<TxRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Confirmed { tx_id: String, attempts: u32 },
    NotFound { attempts: u32 },
    Cancelled { attempts: u32 },
}

impl VerificationOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            VerificationOutcome::Confirmed { attempts, .. }
            | VerificationOutcome::NotFound { attempts }
            | VerificationOutcome::Cancelled { attempts } => *attempts,
        }
    }
}

/// How close a ledger transaction must be to the query to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRules {
    pub amount_tolerance: Amount,
    pub recency_slack: Duration,
}

impl Default for MatchRules {
    fn default() -> Self {
        let settings = VerificationSettings::default();
        Self {
            amount_tolerance: settings.amount_tolerance,
            recency_slack: settings.recency_slack,
        }
    }
}

/// The first transaction that proves `query`, if any.
///
/// A known transaction id always wins. Otherwise an accepted transaction
/// with a block time no earlier than `since - recency_slack` must pay the
/// address an amount within the tolerance.
pub fn find_match<'a>(
    transactions: &'a [LedgerTransaction],
    query: &VerificationQuery,
    rules: &MatchRules,
) -> Option<&'a LedgerTransaction> {
    if let Some(tx_ref) = &query.tx_ref {
        if let Some(tx) = transactions.iter().find(|tx| tx.id == tx_ref.0) {
            return Some(tx);
        }
    }

    let earliest = TimeDelta::from_std(rules.recency_slack)
        .ok()
        .and_then(|slack| query.since.checked_sub_signed(slack))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    transactions.iter().find(|tx| {
        tx.accepted
            && tx.block_time.is_some_and(|t| t >= earliest)
            && tx.outputs.iter().any(|out| {
                out.address == query.address.as_str()
                    && out.amount.abs_diff(query.amount) <= rules.amount_tolerance
            })
    })
}

/// Polls a [`LedgerLookup`] with backoff until the transfer shows up.
pub struct VerificationClient<L> {
    lookup: L,
    backoff: Backoff,
    rules: MatchRules,
}

impl<L: LedgerLookup> VerificationClient<L> {
    pub fn new(lookup: L, backoff: Backoff, rules: MatchRules) -> Self {
        Self {
            lookup,
            backoff,
            rules,
        }
    }

    /// Look the transfer up at most `max_attempts` times (at least once).
    pub async fn verify(
        &self,
        query: &VerificationQuery,
        cancel: &CancelToken,
    ) -> VerificationOutcome {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return VerificationOutcome::Cancelled { attempts: attempt };
            }
            let attempts = attempt + 1;
            match self.lookup.recent_transactions(&query.address).await {
                Ok(transactions) => {
                    if let Some(tx) = find_match(&transactions, query, &self.rules) {
                        info!(
                            address = %query.address,
                            amount = %query.amount,
                            tx_id = %tx.id,
                            attempts,
                            "transfer confirmed on ledger"
                        );
                        return VerificationOutcome::Confirmed {
                            tx_id: tx.id.clone(),
                            attempts,
                        };
                    }
                    debug!(address = %query.address, attempts, "transfer not on ledger yet");
                }
                Err(e) => {
                    warn!(address = %query.address, attempts, error = %e, "ledger lookup failed");
                }
            }

            let Some(delay) = self.backoff.delay_for_attempt(attempt) else {
                warn!(
                    address = %query.address,
                    amount = %query.amount,
                    attempts,
                    "transfer not confirmed, giving up"
                );
                return VerificationOutcome::NotFound { attempts };
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return VerificationOutcome::Cancelled { attempts };
                }
            }
            attempt = attempts;
        }
    }
}

#[async_trait]
impl<L: LedgerLookup + 'static> Verifier for VerificationClient<L> {
    async fn verify(&self, query: VerificationQuery, cancel: CancelToken) -> VerificationOutcome {
        VerificationClient::verify(self, &query, &cancel).await
    }
}

/// [`LedgerLookup`] backed by the Kaspa REST API.
pub struct HttpLedger {
    client: reqwest::Client,
    base_url: String,
    page_limit: u32,
}

impl HttpLedger {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        page_limit: u32,
    ) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("kaspa-batch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_limit,
        })
    }

    pub fn from_settings(settings: &VerificationSettings) -> Result<Self, LookupError> {
        Self::new(
            settings.base_url.clone(),
            settings.request_timeout,
            settings.page_limit,
        )
    }

    fn transactions_url(&self, address: &Address) -> String {
        format!("{}/addresses/{}/full-transactions", self.base_url, address)
    }
}

#[async_trait]
impl LedgerLookup for HttpLedger {
    async fn recent_transactions(
        &self,
        address: &Address,
    ) -> Result<Vec<LedgerTransaction>, LookupError> {
        let response = self
            .client
            .get(self.transactions_url(address))
            .query(&[
                ("limit", self.page_limit.to_string()),
                ("resolve_previous_outpoints", "no".to_string()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }
        let body = response.bytes().await?;
        parse_transactions(&body)
    }
}

#[derive(Deserialize)]
struct RawTransaction {
    transaction_id: String,
    block_time: Option<i64>,
    is_accepted: Option<bool>,
    #[serde(default)]
    outputs: Vec<RawOutput>,
}

#[derive(Deserialize)]
struct RawOutput {
    amount: u64,
    script_public_key_address: Option<String>,
}

/// Decode a `full-transactions` response body.
pub fn parse_transactions(body: &[u8]) -> Result<Vec<LedgerTransaction>, LookupError> {
    let raw: Vec<RawTransaction> =
        serde_json::from_slice(body).map_err(|e| LookupError::Decode(e.to_string()))?;
    Ok(raw
        .into_iter()
        .map(|tx| LedgerTransaction {
            id: tx.transaction_id,
            block_time: tx.block_time.and_then(DateTime::from_timestamp_millis),
            accepted: tx.is_accepted.unwrap_or(true),
            outputs: tx
                .outputs
                .into_iter()
                .filter_map(|out| {
                    Some(LedgerOutput {
                        address: out.script_public_key_address?,
                        amount: Amount::from_sompi(out.amount),
                    })
                })
                .collect(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    const ADDR: &str = "kaspa:qpzry9x8gf2tvdw0s3jn54khce6mua7lmqqqxw";

    fn sent_at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn query(tx_ref: Option<&str>) -> VerificationQuery {
        VerificationQuery {
            address: Address::new(ADDR),
            amount: "1.5".parse().unwrap(),
            since: sent_at(),
            tx_ref: tx_ref.map(|t| TxRef(t.to_string())),
        }
    }

    fn tx(id: &str, secs_after: i64, address: &str, amount: &str) -> LedgerTransaction {
        LedgerTransaction {
            id: id.to_string(),
            block_time: Some(sent_at() + TimeDelta::seconds(secs_after)),
            accepted: true,
            outputs: vec![LedgerOutput {
                address: address.to_string(),
                amount: amount.parse().unwrap(),
            }],
        }
    }

    #[test]
    fn test_match_by_address_amount_and_time() {
        let rules = MatchRules::default();
        let txs = vec![
            tx("old", -3600, ADDR, "1.5"),
            tx("other", 10, "kaspa:qother", "1.5"),
            tx("wrong-amount", 10, ADDR, "2"),
            tx("good", 10, ADDR, "1.49999"),
        ];
        assert_eq!(find_match(&txs, &query(None), &rules).unwrap().id, "good");
    }

    #[test]
    fn test_match_tolerates_clock_skew_within_slack() {
        let rules = MatchRules::default();
        let txs = vec![tx("skewed", -60, ADDR, "1.5")];
        assert!(find_match(&txs, &query(None), &rules).is_some());
    }

    #[test]
    fn test_known_tx_id_wins() {
        let rules = MatchRules::default();
        let txs = vec![tx("abc123", -7200, "kaspa:qelsewhere", "9")];
        assert_eq!(
            find_match(&txs, &query(Some("abc123")), &rules).unwrap().id,
            "abc123"
        );
    }

    #[test]
    fn test_unaccepted_or_unmined_do_not_match() {
        let rules = MatchRules::default();
        let mut rejected = tx("rejected", 10, ADDR, "1.5");
        rejected.accepted = false;
        let mut unmined = tx("unmined", 10, ADDR, "1.5");
        unmined.block_time = None;
        assert!(find_match(&[rejected, unmined], &query(None), &rules).is_none());
    }

    #[test]
    fn test_parse_rest_response() {
        let body = br#"[
            {
                "transaction_id": "f00dbabe",
                "block_time": 1700000010000,
                "is_accepted": true,
                "outputs": [
                    {"amount": 150000000, "script_public_key_address": "kaspa:qpzry9x8gf2tvdw0s3jn54khce6mua7lmqqqxw"},
                    {"amount": 42, "script_public_key_address": null}
                ]
            }
        ]"#;
        let txs = parse_transactions(body).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].id, "f00dbabe");
        assert_eq!(txs[0].block_time, Some(sent_at() + TimeDelta::seconds(10)));
        assert_eq!(txs[0].outputs.len(), 1);
        assert_eq!(txs[0].outputs[0].amount, "1.5".parse().unwrap());
        assert_eq!(
            find_match(&txs, &query(None), &MatchRules::default()).unwrap().id,
            "f00dbabe"
        );
    }

    #[test]
    fn test_parse_garbage_is_decode_error() {
        assert!(matches!(
            parse_transactions(b"<html>502</html>"),
            Err(LookupError::Decode(_))
        ));
    }

    struct FakeLedger {
        replies: Mutex<VecDeque<Result<Vec<LedgerTransaction>, LookupError>>>,
        calls: AtomicU32,
    }

    impl FakeLedger {
        fn new(replies: Vec<Result<Vec<LedgerTransaction>, LookupError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LedgerLookup for FakeLedger {
        async fn recent_transactions(
            &self,
            _address: &Address,
        ) -> Result<Vec<LedgerTransaction>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn client(ledger: FakeLedger, attempts: u32) -> VerificationClient<FakeLedger> {
        VerificationClient::new(
            ledger,
            Backoff::new(Duration::from_secs(1), attempts),
            MatchRules::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_consume_attempts_then_confirm() {
        let ledger = FakeLedger::new(vec![
            Err(LookupError::Status(503)),
            Err(LookupError::Decode("truncated".into())),
            Ok(vec![tx("good", 5, ADDR, "1.5")]),
        ]);
        let client = client(ledger, 5);
        let outcome = client.verify(&query(None), &CancelToken::never()).await;
        assert_eq!(
            outcome,
            VerificationOutcome::Confirmed {
                tx_id: "good".into(),
                attempts: 3
            }
        );
        assert_eq!(client.lookup.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_not_found_within_backoff_budget() {
        let client = client(FakeLedger::new(Vec::new()), 4);
        let start = tokio::time::Instant::now();
        let outcome = client.verify(&query(None), &CancelToken::never()).await;
        assert_eq!(outcome, VerificationOutcome::NotFound { attempts: 4 });
        assert_eq!(client.lookup.calls.load(Ordering::SeqCst), 4);
        // 1 + 2 + 4 seconds of backoff
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(7), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(8), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let (handle, token) = CancelToken::pair();
        let client = client(FakeLedger::new(Vec::new()), 10);
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            handle.cancel();
        });
        let outcome = client.verify(&query(None), &token).await;
        assert_eq!(outcome, VerificationOutcome::Cancelled { attempts: 2 });
        canceller.await.unwrap();
    }
}
