//! Memory and disk size normalization for exported manifests.

use crate::error::{CoreError, Result};

const MB_PER_GB: u64 = 1024;
const MB_PER_TB: u64 = 1024 * 1024;

/// Parses a size such as `512`, `512M`, `512MB`, `1G`, `2GB` or `1T` into megabytes.
///
/// A bare number is taken as megabytes, which is what the platform reports.
pub fn parse_megabytes(value: &str) -> Result<u64> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let invalid = || CoreError::InvalidSize {
        value: value.to_string(),
    };

    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "M" | "MB" => 1,
        "G" | "GB" => MB_PER_GB,
        "T" | "TB" => MB_PER_TB,
        _ => return Err(invalid()),
    };
    amount.checked_mul(multiplier).ok_or_else(invalid)
}

/// Rewrites a size as `<int>G` when it is a whole number of gigabytes, else `<int>M`.
pub fn normalize_size(value: &str) -> Result<String> {
    let mb = parse_megabytes(value)?;
    if mb != 0 && mb % MB_PER_GB == 0 {
        Ok(format!("{}G", mb / MB_PER_GB))
    } else {
        Ok(format!("{}M", mb))
    }
}
