//! TOML configuration: how to launch the wallet shell, what to type into it,
//! what its replies look like, and how patient to be.
//!
//! Every key is optional; the defaults describe `kaspa-cli`.
//!
//! ```toml
//! [shell]
//! command = "kaspa-cli"
//! startup_timeout = "60s"
//!
//! [commands]
//! send = "send {address} {amount}"
//!
//! [retry]
//! max_funds_retries = 3
//!
//! [verification]
//! base_url = "https://api.kaspa.org"
//! base_delay = "2s"
//! ```

use crate::amount::Amount;
use crate::error::ConfigError;
use crate::patterns::{PatternRule, PatternSet, default_rules};
use crate::retry::{Backoff, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Per-transfer fee estimate used for the balance check.
    pub fee_per_transfer: Amount,
    pub shell: ShellConfig,
    pub networks: BTreeMap<String, NetworkProfile>,
    pub commands: CommandSet,
    pub timeouts: Timeouts,
    pub retry: RetrySettings,
    pub batch: BatchSettings,
    pub verification: VerificationSettings,
    /// Replaces the built-in rules when non-empty. Order is priority.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<PatternRule>,
}

impl Default for Config {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            "mainnet".to_string(),
            NetworkProfile {
                network_command: "network mainnet".into(),
                connect_command: "connect wss://anna.kaspa.stream/kaspa/mainnet/wrpc/borsh".into(),
                address_prefix: "kaspa:".into(),
                currency_symbol: "KAS".into(),
            },
        );
        networks.insert(
            "testnet".to_string(),
            NetworkProfile {
                network_command: "network testnet-10".into(),
                connect_command: "connect wss://tau-10.kaspa.blue/kaspa/testnet-10/wrpc/borsh"
                    .into(),
                address_prefix: "kaspatest:".into(),
                currency_symbol: "TKAS".into(),
            },
        );
        Self {
            fee_per_transfer: Amount::from_sompi(2036),
            shell: ShellConfig::default(),
            networks,
            commands: CommandSet::default(),
            timeouts: Timeouts::default(),
            retry: RetrySettings::default(),
            batch: BatchSettings::default(),
            verification: VerificationSettings::default(),
            patterns: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn network(&self, name: &str) -> Result<&NetworkProfile, ConfigError> {
        self.networks
            .get(name)
            .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string()))
    }

    /// Compile the configured rules, or the built-in ones if none are set.
    pub fn pattern_set(&self) -> Result<PatternSet, ConfigError> {
        if self.patterns.is_empty() {
            PatternSet::new(&default_rules())
        } else {
            PatternSet::new(&self.patterns)
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_funds_retries: self.retry.max_funds_retries,
            funds_settle_delay: self.retry.funds_settle_delay,
            verification: self.verification.backoff(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
    pub command: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(with = "duration_text")]
    pub startup_timeout: Duration,
    pub exit_command: String,
    #[serde(with = "duration_text")]
    pub terminate_grace: Duration,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            command: "kaspa-cli".into(),
            args: Vec::new(),
            working_dir: None,
            startup_timeout: Duration::from_secs(60),
            exit_command: "exit".into(),
            terminate_grace: Duration::from_secs(5),
        }
    }
}

/// Network-specific commands and address format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkProfile {
    pub network_command: String,
    pub connect_command: String,
    pub address_prefix: String,
    pub currency_symbol: String,
}

/// Command templates. `{name}`, `{address}` and `{amount}` are substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandSet {
    pub open: String,
    pub balance: String,
    pub send: String,
}

impl Default for CommandSet {
    fn default() -> Self {
        Self {
            open: "open {name}".into(),
            balance: "list".into(),
            send: "send {address} {amount}".into(),
        }
    }
}

impl CommandSet {
    pub fn open_command(&self, wallet_name: &str) -> String {
        render(&self.open, &[("name", wallet_name)])
    }

    pub fn send_command(&self, address: &str, amount: &str) -> String {
        render(&self.send, &[("address", address), ("amount", amount)])
    }
}

fn render(template: &str, values: &[(&str, &str)]) -> String {
    let rendered = values.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    });
    rendered.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    /// Bound on each setup step (network, connect, open, unlock, balance).
    #[serde(with = "duration_text")]
    pub step: Duration,
    /// Bound on one whole transfer dialogue, prompts included.
    #[serde(with = "duration_text")]
    pub transfer: Duration,
    #[serde(with = "duration_text")]
    pub poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(30),
            transfer: Duration::from_secs(60),
            poll_interval: Duration::from_millis(25),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_funds_retries: u32,
    #[serde(with = "duration_text")]
    pub funds_settle_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_funds_retries: policy.max_funds_retries,
            funds_settle_delay: policy.funds_settle_delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSettings {
    /// Pause after each transfer before the next one is sent.
    #[serde(with = "duration_text")]
    pub pause_between_transfers: Duration,
    /// Concurrent verification lookups.
    pub verification_workers: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            pause_between_transfers: Duration::from_secs(3),
            verification_workers: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerificationSettings {
    pub enabled: bool,
    pub base_url: String,
    #[serde(with = "duration_text")]
    pub base_delay: Duration,
    pub multiplier: f64,
    #[serde(with = "duration_text")]
    pub max_delay: Duration,
    pub max_attempts: u32,
    pub amount_tolerance: Amount,
    /// How far before the send time a ledger timestamp may lie and still match.
    #[serde(with = "duration_text")]
    pub recency_slack: Duration,
    #[serde(with = "duration_text")]
    pub request_timeout: Duration,
    pub page_limit: u32,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        let backoff = Backoff::default();
        Self {
            enabled: true,
            base_url: "https://api.kaspa.org".into(),
            base_delay: backoff.base_delay,
            multiplier: backoff.multiplier,
            max_delay: backoff.max_delay,
            max_attempts: backoff.max_attempts,
            amount_tolerance: Amount::from_sompi(10_000),
            recency_slack: Duration::from_secs(120),
            request_timeout: Duration::from_secs(10),
            page_limit: 20,
        }
    }
}

impl VerificationSettings {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            base_delay: self.base_delay,
            multiplier: self.multiplier,
            max_delay: self.max_delay,
            max_attempts: self.max_attempts,
        }
    }
}

/// Parse a duration string: `1s`, `500ms`, `1.5s`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Some(ms_str) = s.strip_suffix("ms") {
        let ms: u64 = ms_str
            .trim()
            .parse()
            .map_err(|_| format!("invalid milliseconds value: {s}"))?;
        Ok(Duration::from_millis(ms))
    } else if let Some(s_str) = s.strip_suffix('s') {
        let secs: f64 = s_str
            .trim()
            .parse()
            .map_err(|_| format!("invalid seconds value: {s}"))?;
        Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid seconds value {s}: {e}"))
    } else {
        Err(format!("duration must end with 's' or 'ms', got: {s}"))
    }
}

mod duration_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&format_args!("{}ms", value.as_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::OutputEvent;
    use crate::patterns::RuleTag;
    use std::io::Write;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(
            parse_duration("1.5s").unwrap(),
            Duration::from_secs_f64(1.5)
        );
        assert!(parse_duration("5minutes").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.network("testnet").unwrap().address_prefix, "kaspatest:");
        assert_eq!(config.fee_per_transfer.to_string(), "0.00002036");
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
fee_per_transfer = "0.0001"

[shell]
command = "cargo"
args = ["run", "--release"]
startup_timeout = "90s"

[retry]
max_funds_retries = 5

[verification]
base_delay = "500ms"
max_attempts = 3
"#,
        )
        .unwrap();
        assert_eq!(config.shell.command, "cargo");
        assert_eq!(config.shell.args, vec!["run", "--release"]);
        assert_eq!(config.shell.startup_timeout, Duration::from_secs(90));
        assert_eq!(config.shell.exit_command, "exit");
        let policy = config.retry_policy();
        assert_eq!(policy.max_funds_retries, 5);
        assert_eq!(policy.funds_settle_delay, Duration::from_secs(3));
        assert_eq!(policy.verification.base_delay, Duration::from_millis(500));
        assert_eq!(policy.verification.max_attempts, 3);
        assert_eq!(config.fee_per_transfer.sompi(), 10_000);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("[shell]\ncomand = \"x\"\n").is_err());
    }

    #[test]
    fn test_unknown_network() {
        let err = Config::default().network("devnet").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNetwork(name) if name == "devnet"));
    }

    #[test]
    fn test_custom_patterns_replace_defaults() {
        let config: Config = toml::from_str(
            r#"
[[patterns]]
tag = "password_prompt"
regex = "(?i)passphrase"
"#,
        )
        .unwrap();
        assert_eq!(config.patterns[0].tag, RuleTag::PasswordPrompt);
        let set = config.pattern_set().unwrap();
        assert_eq!(set.classify("Passphrase:"), OutputEvent::PasswordPrompt);
        assert!(matches!(
            set.classify("Enter wallet password:"),
            OutputEvent::Unrecognized(_)
        ));
    }

    #[test]
    fn test_command_templates() {
        let commands = CommandSet::default();
        assert_eq!(commands.open_command(""), "open");
        assert_eq!(commands.open_command("treasury"), "open treasury");
        assert_eq!(
            commands.send_command("kaspa:qq", "1.5"),
            "send kaspa:qq 1.5"
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timeouts]\ntransfer = \"2s\"").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.timeouts.transfer, Duration::from_secs(2));

        let err = Config::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_serialized_defaults_load_back() {
        let text = toml::to_string(&Config::default()).unwrap();
        let config: Config = toml::from_str(&text).unwrap();
        assert_eq!(config, Config::default());
    }
}
