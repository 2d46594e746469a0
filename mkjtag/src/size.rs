//! Human readable sizes: `4096`, `0x1000`, `16M`, `16MiB`, `0x10KB`.

use crate::Error;
use std::convert::TryFrom;

const UNITS: [(char, u64); 3] = [('k', 1 << 10), ('m', 1 << 20), ('g', 1 << 30)];

/// Parse a size token into a byte count.
///
/// The number is decimal or `0x` prefixed hex, optionally followed by a
/// `K`, `M` or `G` unit which may itself be followed by `i` and/or `B`.
/// Matching is case-insensitive and every unit step is 1024.
pub fn parse_size(token: &str) -> Result<u64, Error> {
    let invalid = || Error::InvalidSize(token.to_string());
    let lower = token.trim().to_ascii_lowercase();

    let (number, multiplier) = split_unit(&lower);
    let digits_ok = match number.strip_prefix("0x") {
        Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()),
    };
    if !digits_ok {
        return Err(invalid());
    }

    let value: u64 = parse_int::parse(number).map_err(|_| invalid())?;
    value.checked_mul(multiplier).ok_or_else(invalid)
}

/// Like [`parse_size`], limited to what fits in a 32-bit header field.
pub fn parse_size_u32(token: &str) -> Result<u32, Error> {
    let value = parse_size(token)?;
    u32::try_from(value).map_err(|_| Error::InvalidSize(token.to_string()))
}

// k, m and g are not hex digits, so a unit never eats into a hex number.
fn split_unit(token: &str) -> (&str, u64) {
    let mut rest = token;
    rest = rest.strip_suffix('b').unwrap_or(rest);
    rest = rest.strip_suffix('i').unwrap_or(rest);
    for (unit, multiplier) in UNITS.iter() {
        if let Some(number) = rest.strip_suffix(*unit) {
            return (number, *multiplier);
        }
    }
    (token, 1)
}
