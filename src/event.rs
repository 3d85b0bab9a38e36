use crate::amount::Amount;
use std::fmt;

/// Transaction reference reported by the wallet shell after a send.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxRef(pub String);

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category of an error line printed by the wallet shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthFailed,
    InsufficientFunds,
    InvalidAddress,
    Network,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::AuthFailed => "authentication failed",
            ErrorKind::InsufficientFunds => "insufficient funds",
            ErrorKind::InvalidAddress => "invalid address",
            ErrorKind::Network => "network error",
            ErrorKind::Other => "error",
        };
        f.write_str(s)
    }
}

/// Non-error status lines the shell prints once a step completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckKind {
    ShellReady,
    NetworkSet,
    Connected,
    WalletOpened,
    WalletAlreadyOpen,
    Goodbye,
}

/// Typed events classified from the wallet shell's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// The shell asks for the wallet password
    PasswordPrompt,

    /// The shell asks for the separate payment password
    PaymentPasswordPrompt,

    /// A yes/no style question
    ConfirmationPrompt(String),

    BalanceReported(Amount),

    TransferAccepted(TxRef),

    Acknowledged(AckKind),

    /// The shell reported an error; the raw line is kept for the record
    ErrorReported { kind: ErrorKind, raw: String },

    /// Anything no rule matched
    Unrecognized(String),
}

impl OutputEvent {
    /// Whether this event is a password prompt of either kind.
    pub fn is_password_prompt(&self) -> bool {
        matches!(
            self,
            OutputEvent::PasswordPrompt | OutputEvent::PaymentPasswordPrompt
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OutputEvent::ErrorReported { .. })
    }
}
