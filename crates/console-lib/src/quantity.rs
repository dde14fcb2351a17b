//! Resource quantity parsing
//!
//! Converts quantity strings as reported by orchestrators (`350000000n`,
//! `250m`, `2`, `512Mi`, `1e3`) into the common units persisted by the
//! metrics pipeline: nanocores for CPU and bytes for memory.

use crate::error::{ConsoleError, Result};

/// Nanocores per core. Applied to both usage and declared limits.
pub const NANOCORES_PER_CORE: f64 = 1_000_000_000.0;

/// Parse a quantity into its base unit (cores or bytes)
pub fn parse_quantity(raw: &str) -> Result<f64> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(invalid(raw));
    }

    let split_at = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split_at);

    // Exponent form, e.g. "1e3" or "2.5E-3"
    if let Some(exponent) = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))
    {
        if let (Ok(mantissa), Ok(exp)) = (number.parse::<f64>(), exponent.parse::<i32>()) {
            return Ok(mantissa * 10f64.powi(exp));
        }
    }

    let number: f64 = number.parse().map_err(|_| invalid(raw))?;
    let multiplier = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => 1024.0 * 1024.0,
        "Gi" => 1024.0 * 1024.0 * 1024.0,
        "Ti" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "Pi" => 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "Ei" => 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return Err(invalid(raw)),
    };

    Ok(number * multiplier)
}

/// CPU quantity in nanocores
pub fn cpu_nanocores(raw: &str) -> Result<i64> {
    Ok((parse_quantity(raw)? * NANOCORES_PER_CORE).round() as i64)
}

/// Memory quantity in bytes
pub fn memory_bytes(raw: &str) -> Result<i64> {
    Ok(parse_quantity(raw)?.round() as i64)
}

/// Back-convert nanocores into cores for display
pub fn nanocores_to_cores(nanocores: i64) -> f64 {
    nanocores as f64 / NANOCORES_PER_CORE
}

fn invalid(raw: &str) -> ConsoleError {
    ConsoleError::InvalidQuantity(raw.to_string())
}
