//! Reader for redistribution reports.
//!
//! The report is a CSV-like text with an `Address,Amount` header, one
//! `address,amount` pair per line and an optional
//! `End of redistribution report` trailer. Anything before the header is
//! ignored. Lines that cannot be paid on the selected network are skipped
//! with a warning rather than failing the whole file.

use crate::amount::{Address, Amount};
use crate::error::RecipientError;
use crate::transfer::TransferRequest;
use std::path::Path;
use tracing::{info, warn};

const HEADER: &str = "Address,Amount";
const TRAILER: &str = "End of redistribution report";

/// Accepted requests in file order, plus how many lines were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    pub requests: Vec<TransferRequest>,
    pub skipped: usize,
}

/// Parse a redistribution report for the network whose addresses start with
/// `address_prefix` (e.g. `kaspa:`).
///
/// Addresses without any prefix get `address_prefix` prepended.
///
/// # Errors
///
/// Returns [`RecipientError::MissingHeader`] if the `Address,Amount` header
/// is absent.
///
/// # Example
///
/// ```
/// use kaspa_batch::recipients::parse_str;
///
/// let parsed = parse_str("Address,Amount\nqqabc,1.5\n", "kaspa:").unwrap();
/// assert_eq!(parsed.requests[0].address.as_str(), "kaspa:qqabc");
/// ```
pub fn parse_str(content: &str, address_prefix: &str) -> Result<Recipients, RecipientError> {
    if !content.contains(HEADER) {
        return Err(RecipientError::MissingHeader);
    }
    if !content.contains(TRAILER) {
        warn!("suspicious redistribution file: `{TRAILER}` trailer missing");
    }

    let mut parsed = Recipients::default();
    let mut reading = false;
    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.contains(HEADER) {
            reading = true;
            continue;
        }
        if line.contains(TRAILER) {
            break;
        }
        if !reading || !line.contains(',') {
            continue;
        }
        match parse_line(line, address_prefix) {
            Ok(request) => parsed.requests.push(request),
            Err(why) => {
                warn!(line = line_num + 1, content = line, "skipping recipient: {why}");
                parsed.skipped += 1;
            }
        }
    }

    info!(
        valid = parsed.requests.len(),
        skipped = parsed.skipped,
        "redistribution file read"
    );
    Ok(parsed)
}

/// Read and parse a redistribution report from a file.
pub fn parse_file(
    path: impl AsRef<Path>,
    address_prefix: &str,
) -> Result<Recipients, RecipientError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| RecipientError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&content, address_prefix)
}

fn parse_line(line: &str, address_prefix: &str) -> Result<TransferRequest, String> {
    let mut parts = line.split(',').map(str::trim);
    let (Some(address), Some(amount)) = (parts.next(), parts.next()) else {
        return Err("expected `address,amount`".to_string());
    };

    let address = match address.find(':') {
        None if !address.is_empty() => format!("{address_prefix}{address}"),
        None => return Err("empty address".to_string()),
        Some(idx) if address[..=idx] == *address_prefix => address.to_string(),
        Some(_) => return Err(format!("address {address} is for another network")),
    };

    let amount: Amount = amount.parse().map_err(|e| format!("{e}"))?;
    if amount.is_zero() {
        return Err("amount must be positive".to_string());
    }
    Ok(TransferRequest::new(Address::new(address), amount))
}

/// Sum of all amounts, and the sum including `fee_per_transfer` for each
/// request. `None` on overflow.
pub fn totals(requests: &[TransferRequest], fee_per_transfer: Amount) -> Option<(Amount, Amount)> {
    let total = requests
        .iter()
        .try_fold(Amount::ZERO, |acc, r| acc.checked_add(r.amount))?;
    let fees = fee_per_transfer.checked_mul(u64::try_from(requests.len()).ok()?)?;
    Some((total, total.checked_add(fees)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const REPORT: &str = "\
Redistribution report generated 2024-05-01
Address,Amount
kaspatest:qq0001,1.5
qq0002, 2
kaspa:qq0003,1
kaspatest:qq0004,0
kaspatest:qq0005,-1
kaspatest:qq0006,abc
kaspatest:qq0007,0.000000001
kaspatest:qq0008

End of redistribution report
kaspatest:qq0009,5
";

    #[test]
    fn test_parse_report() {
        let parsed = parse_str(REPORT, "kaspatest:").unwrap();
        let addresses: Vec<_> = parsed
            .requests
            .iter()
            .map(|r| r.address.as_str())
            .collect();
        assert_eq!(addresses, vec!["kaspatest:qq0001", "kaspatest:qq0002"]);
        assert_eq!(parsed.requests[1].amount, "2".parse().unwrap());
        // qq0003 (mainnet), zero, negative, non-numeric, too precise
        assert_eq!(parsed.skipped, 5);
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            parse_str("kaspa:qq,1\n", "kaspa:"),
            Err(RecipientError::MissingHeader)
        ));
    }

    #[test]
    fn test_missing_trailer_still_parses() {
        let parsed = parse_str("Address,Amount\nkaspa:qq1,3\n", "kaspa:").unwrap();
        assert_eq!(parsed.requests.len(), 1);
    }

    #[test]
    fn test_parse_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{REPORT}").unwrap();
        let parsed = parse_file(file.path(), "kaspatest:").unwrap();
        assert_eq!(parsed.requests.len(), 2);

        assert!(matches!(
            parse_file("/no/such/report.csv", "kaspa:"),
            Err(RecipientError::Read { .. })
        ));
    }

    #[test]
    fn test_totals_with_fee_estimate() {
        let parsed = parse_str(REPORT, "kaspatest:").unwrap();
        let (total, with_fees) = totals(&parsed.requests, "0.00002036".parse().unwrap()).unwrap();
        assert_eq!(total.to_string(), "3.5");
        assert_eq!(with_fees.to_string(), "3.50004072");
        assert_eq!(
            totals(&[], "0.00002036".parse().unwrap()),
            Some((Amount::ZERO, Amount::ZERO))
        );
    }
}
