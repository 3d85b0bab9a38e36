//! The pattern library: an ordered list of regex rules mapping one line of
//! shell output to an [`OutputEvent`].
//!
//! Classification is total. Text no rule matches becomes
//! [`OutputEvent::Unrecognized`], so a change in the shell's wording shows up
//! as a protocol timeout rather than a crash.

use crate::amount::Amount;
use crate::error::ConfigError;
use crate::event::{AckKind, ErrorKind, OutputEvent, TxRef};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
        .expect("ANSI escape regex is valid")
});

/// What a rule means when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTag {
    PaymentPasswordPrompt,
    PasswordPrompt,
    ConfirmationPrompt,
    AuthFailed,
    InsufficientFunds,
    InvalidAddress,
    NetworkError,
    GenericError,
    /// Needs a `txid` capture group.
    TransferAccepted,
    /// Needs an `amount` capture group.
    Balance,
    ShellReady,
    NetworkSet,
    Connected,
    WalletOpened,
    WalletAlreadyOpen,
    Goodbye,
}

impl RuleTag {
    /// Prompts are printed without a trailing newline, so these rules are
    /// also tried against partial lines.
    pub fn is_prompt(self) -> bool {
        matches!(
            self,
            RuleTag::PaymentPasswordPrompt | RuleTag::PasswordPrompt | RuleTag::ConfirmationPrompt
        )
    }
}

impl fmt::Display for RuleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the serde name so errors match what users write in the config.
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| format!("{self:?}"));
        f.write_str(&name)
    }
}

/// One uncompiled rule as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub tag: RuleTag,
    pub regex: String,
}

impl PatternRule {
    pub fn new(tag: RuleTag, regex: impl Into<String>) -> Self {
        Self {
            tag,
            regex: regex.into(),
        }
    }
}

/// Rules matching the wording of `kaspa-cli`, most specific first.
pub fn default_rules() -> Vec<PatternRule> {
    use RuleTag::*;
    vec![
        PatternRule::new(PaymentPasswordPrompt, r"(?i)enter payment password"),
        PatternRule::new(PasswordPrompt, r"(?i)enter (?:wallet )?password"),
        PatternRule::new(
            AuthFailed,
            r"(?i)(?:invalid|wrong|incorrect) (?:wallet |payment )?password|unable to decrypt|decryption (?:error|failed)",
        ),
        PatternRule::new(
            InsufficientFunds,
            r"(?i)not enough funds|insufficient (?:funds|balance)",
        ),
        PatternRule::new(InvalidAddress, r"(?i)invalid address"),
        PatternRule::new(
            NetworkError,
            r"(?i)network error|rpc error|not connected|connection refused",
        ),
        PatternRule::new(TransferAccepted, r"(?i)tx ids?:\s*(?P<txid>[0-9a-f]{8,})"),
        PatternRule::new(Balance, r"•\s*(?P<amount>[\d,]+(?:\.\d+)?)\s*T?KAS\b"),
        PatternRule::new(ShellReady, r"type 'help' for list of commands"),
        PatternRule::new(NetworkSet, r"Setting network id to:"),
        PatternRule::new(Connected, r"Connected to Kaspa node"),
        PatternRule::new(WalletOpened, r"Your wallet hint is:"),
        PatternRule::new(WalletAlreadyOpen, r"(?i)wallet (?:is )?already open"),
        PatternRule::new(Goodbye, r"bye!"),
        PatternRule::new(ConfirmationPrompt, r"(?i)\((?:y/n|yes/no)\)"),
        PatternRule::new(GenericError, r"(?i)^\s*error\b|\berror:"),
    ]
}

struct CompiledRule {
    tag: RuleTag,
    regex: Regex,
}

/// A compiled, ordered rule set.
pub struct PatternSet {
    rules: Vec<CompiledRule>,
}

impl PatternSet {
    /// Compile `rules`, keeping their order as the match priority.
    pub fn new(rules: &[PatternRule]) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.regex)
                    .map(|regex| CompiledRule {
                        tag: rule.tag,
                        regex,
                    })
                    .map_err(|source| ConfigError::Pattern {
                        tag: rule.tag,
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Classify one complete line of output.
    pub fn classify(&self, line: &str) -> OutputEvent {
        let line = clean_line(line);
        self.rules
            .iter()
            .find_map(|rule| build_event(rule, &line))
            .unwrap_or(OutputEvent::Unrecognized(line))
    }

    /// Classify a partial line, trying prompt rules only.
    pub fn classify_prompt(&self, fragment: &str) -> Option<OutputEvent> {
        let fragment = clean_line(fragment);
        if fragment.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .filter(|rule| rule.tag.is_prompt())
            .find_map(|rule| build_event(rule, &fragment))
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::new(&default_rules()).expect("built-in patterns compile")
    }
}

/// Strip terminal escape sequences and carriage returns, then trim.
pub fn clean_line(raw: &str) -> String {
    ANSI_ESCAPE.replace_all(raw, "").replace('\r', "").trim().to_string()
}

fn build_event(rule: &CompiledRule, line: &str) -> Option<OutputEvent> {
    let caps = rule.regex.captures(line)?;
    let error = |kind| OutputEvent::ErrorReported {
        kind,
        raw: line.to_string(),
    };
    let event = match rule.tag {
        RuleTag::PaymentPasswordPrompt => OutputEvent::PaymentPasswordPrompt,
        RuleTag::PasswordPrompt => OutputEvent::PasswordPrompt,
        RuleTag::ConfirmationPrompt => OutputEvent::ConfirmationPrompt(line.to_string()),
        RuleTag::AuthFailed => error(ErrorKind::AuthFailed),
        RuleTag::InsufficientFunds => error(ErrorKind::InsufficientFunds),
        RuleTag::InvalidAddress => error(ErrorKind::InvalidAddress),
        RuleTag::NetworkError => error(ErrorKind::Network),
        RuleTag::GenericError => error(ErrorKind::Other),
        RuleTag::TransferAccepted => {
            let txid = caps.name("txid")?.as_str().trim_end_matches(',');
            OutputEvent::TransferAccepted(TxRef(txid.to_string()))
        }
        // A balance that fails to parse falls through to the next rule.
        RuleTag::Balance => OutputEvent::BalanceReported(
            caps.name("amount")?.as_str().parse::<Amount>().ok()?,
        ),
        RuleTag::ShellReady => OutputEvent::Acknowledged(AckKind::ShellReady),
        RuleTag::NetworkSet => OutputEvent::Acknowledged(AckKind::NetworkSet),
        RuleTag::Connected => OutputEvent::Acknowledged(AckKind::Connected),
        RuleTag::WalletOpened => OutputEvent::Acknowledged(AckKind::WalletOpened),
        RuleTag::WalletAlreadyOpen => OutputEvent::Acknowledged(AckKind::WalletAlreadyOpen),
        RuleTag::Goodbye => OutputEvent::Acknowledged(AckKind::Goodbye),
    };
    Some(event)
}
