use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;
use kaspa_batch::config::NetworkProfile;
use kaspa_batch::{
    Amount, BatchOptions, CancelToken, Config, Credentials, EventStream, HttpLedger, MatchRules,
    Orchestrator, Outcome, ProtocolSettings, PtySession, RunReport, VerificationClient,
    WalletProtocol, recipients,
};
use std::fs::File;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

type Session = WalletProtocol<PtySession>;

#[derive(Parser, Debug)]
#[command(
    name = "kaspa-batch",
    about = "Send a batch of KAS transfers through kaspa-cli and confirm them on the ledger",
    version
)]
struct Args {
    /// Network profile from the config file (`mainnet`, `testnet`, ...)
    #[arg(short, long, default_value = "mainnet")]
    network: String,

    /// Redistribution report with an `Address,Amount` header
    #[arg(short, long, default_value = "redistribution_report.csv")]
    recipients: PathBuf,

    /// TOML config file; built-in kaspa-cli defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wallet to open; empty opens the shell's default wallet
    #[arg(short, long, default_value = "")]
    wallet: String,

    /// Where to write transfers that went out but could not be confirmed
    #[arg(long, default_value = "pending_transfers.csv")]
    pending_out: PathBuf,

    /// Directory for the JSON log file
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,

    /// Continue even if the balance does not cover every transfer
    #[arg(long)]
    allow_shortfall: bool,

    /// Do not ask for confirmation before sending
    #[arg(short, long)]
    yes: bool,

    /// Skip ledger verification; every sent transfer is reported as pending
    #[arg(long)]
    no_verify: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let log_path = init_logging(&args.log_dir)?;

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let network = config.network(&args.network)?.clone();

    let batch = recipients::parse_file(&args.recipients, &network.address_prefix)?;
    if batch.requests.is_empty() {
        bail!(
            "no valid transfers in {} ({} lines skipped)",
            args.recipients.display(),
            batch.skipped
        );
    }
    let (total, total_with_fees) = recipients::totals(&batch.requests, config.fee_per_transfer)
        .context("transfer total overflows")?;
    info!(
        transfers = batch.requests.len(),
        total = %total,
        total_with_fees = %total_with_fees,
        currency = %network.currency_symbol,
        "transfers to make"
    );

    let credentials = Credentials::from_env(args.wallet.as_str())?;

    let (cancel_handle, cancel) = CancelToken::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            cancel_handle.cancel();
        }
    });

    let shell = PtySession::start(
        &config.shell.command,
        &config.shell.args,
        config.shell.working_dir.as_deref(),
    )
    .context("Failed to start wallet shell")?;
    let stream = EventStream::new(shell, config.pattern_set()?)
        .with_poll_interval(config.timeouts.poll_interval);
    let settings = ProtocolSettings::from_config(&config);
    let mut wallet = WalletProtocol::new(stream, settings, cancel.clone());

    let balance = match prepare(&mut wallet, &network, credentials).await {
        Ok(balance) => balance,
        Err(e) => {
            wallet.shutdown().await;
            return Err(e);
        }
    };

    if !should_proceed(&args, balance, total_with_fees, &network)? {
        info!("operation cancelled by user");
        wallet.shutdown().await;
        return Ok(ExitCode::SUCCESS);
    }

    let verifier = if args.no_verify || !config.verification.enabled {
        None
    } else {
        let ledger = HttpLedger::from_settings(&config.verification)
            .context("Failed to create ledger client")?;
        let rules = MatchRules {
            amount_tolerance: config.verification.amount_tolerance,
            recency_slack: config.verification.recency_slack,
        };
        Some(Arc::new(VerificationClient::new(
            ledger,
            config.verification.backoff(),
            rules,
        )))
    };
    let options = BatchOptions::from_config(&config);
    let orchestrator = Orchestrator::new(options, verifier, cancel.clone());
    let report = orchestrator.run(&mut wallet, batch.requests).await;

    if !cancel.is_cancelled() {
        match wallet.get_balance().await {
            Ok(final_balance) => info!(
                final_balance = %final_balance,
                spent = %balance.saturating_sub(final_balance),
                currency = %network.currency_symbol,
                "final balance"
            ),
            Err(e) => warn!(error = %e, "could not read final balance"),
        }
    }
    wallet.shutdown().await;

    summarize(&report, &network);
    if report.pending() > 0 {
        write_pending(&args.pending_out, &report)?;
        warn!(
            count = report.pending(),
            path = %args.pending_out.display(),
            "unconfirmed transfers written; check them before resending"
        );
    }
    info!(log = %log_path.display(), "finished");

    Ok(if report.failed() > 0 {
        ExitCode::FAILURE
    } else if report.pending() > 0 {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}

/// Bring the session to the point where transfers can be sent. Returns the
/// starting balance.
async fn prepare(
    wallet: &mut Session,
    network: &NetworkProfile,
    credentials: Credentials,
) -> Result<Amount> {
    let wallet_name = credentials.wallet_name().to_string();
    wallet
        .await_ready()
        .await
        .context("Wallet shell did not start")?;
    wallet
        .select_network(network)
        .await
        .context("Failed to select network")?;
    wallet
        .connect(network)
        .await
        .context("Failed to connect to node")?;
    wallet
        .open_wallet(&wallet_name)
        .await
        .context("Failed to open wallet")?;
    wallet
        .unlock(credentials)
        .await
        .context("Failed to unlock wallet")?;
    let balance = wallet
        .get_balance()
        .await
        .context("Unable to retrieve wallet balance")?;
    info!(balance = %balance, currency = %network.currency_symbol, "current balance");
    Ok(balance)
}

/// What to do once the balance is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Proceed {
    Go,
    Stop,
    Ask(&'static str),
}

/// `--yes` skips the question. With a shortfall it only goes ahead when
/// `--allow-shortfall` is also given.
fn proceed_decision(balance: Amount, needed: Amount, yes: bool, allow_shortfall: bool) -> Proceed {
    match (balance < needed, yes) {
        (true, true) if allow_shortfall => Proceed::Go,
        (true, true) => Proceed::Stop,
        (true, false) => {
            Proceed::Ask("Balance is insufficient. Continue with the transfers that fit? (y/n): ")
        }
        (false, true) => Proceed::Go,
        (false, false) => Proceed::Ask("Proceed with the transfers? (y/n): "),
    }
}

fn should_proceed(
    args: &Args,
    balance: Amount,
    needed: Amount,
    network: &NetworkProfile,
) -> Result<bool> {
    if balance < needed {
        warn!(
            shortfall = %needed.saturating_sub(balance),
            currency = %network.currency_symbol,
            "insufficient balance for all transfers"
        );
    } else {
        info!(
            remaining = %balance.saturating_sub(needed),
            currency = %network.currency_symbol,
            "sufficient balance"
        );
    }
    match proceed_decision(balance, needed, args.yes, args.allow_shortfall) {
        Proceed::Go => Ok(true),
        Proceed::Stop => Ok(false),
        Proceed::Ask(question) => ask(question),
    }
}

fn ask(question: &str) -> Result<bool> {
    print!("{question}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn summarize(report: &RunReport, network: &NetworkProfile) {
    info!(
        total = report.total(),
        confirmed = report.confirmed(),
        pending = report.pending(),
        failed = report.failed(),
        sent = %report.sent_amount(),
        currency = %network.currency_symbol,
        "transfer summary"
    );
    for (position, record) in report.records.iter().enumerate() {
        let reason = record.reason.as_deref().unwrap_or("");
        match record.outcome() {
            Outcome::Confirmed(_) => {}
            Outcome::PendingVerification(tx) => warn!(
                position = position + 1,
                address = %record.request.address,
                amount = %record.request.amount,
                tx = %tx,
                reason,
                "pending verification"
            ),
            Outcome::Failed(_) => error!(
                position = position + 1,
                address = %record.request.address,
                amount = %record.request.amount,
                attempts = record.attempts,
                reason,
                "transfer failed"
            ),
        }
    }
}

fn write_pending(path: &Path, report: &RunReport) -> Result<()> {
    std::fs::write(path, pending_csv(report))
        .with_context(|| format!("Failed to write pending list: {}", path.display()))
}

/// `address,amount,txid` lines for every transfer still awaiting
/// confirmation.
fn pending_csv(report: &RunReport) -> String {
    let mut out = String::from("address,amount,txid\n");
    for record in report.pending_records() {
        let tx = record.tx_ref.as_ref().map(|t| t.0.as_str()).unwrap_or("");
        out.push_str(&format!(
            "{},{},{}\n",
            record.request.address, record.request.amount, tx
        ));
    }
    out
}

/// Human-readable log on stderr plus JSON lines in
/// `<log_dir>/kaspa_transfers_<timestamp>.log`.
fn init_logging(log_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    let path = log_dir.join(format!(
        "kaspa_transfers_{}.log",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file: {}", path.display()))?;

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kaspa_batch=info"));
    let file_filter = EnvFilter::new("kaspa_batch=debug,kaspa_batch::shell=trace");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .json()
                .with_writer(Mutex::new(file))
                .with_filter(file_filter),
        )
        .init();
    Ok(path)
}
