//! Registry source integrations: one module per upstream system, each with
//! a fetch client and a payload normalizer.

pub mod ceidg;
pub mod krs;

use crate::error::{EnrichError, Result};

/// Normalize a KRS number to its canonical 10-digit, zero-padded form.
pub fn normalize_krs_number(raw: &str) -> Result<String> {
    let cleaned = raw.trim().replace(['-', ' '], "");

    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(EnrichError::InvalidLookupKey(format!(
            "KRS number '{raw}' must be numeric"
        )));
    }
    if cleaned.len() > 10 {
        return Err(EnrichError::InvalidLookupKey(format!(
            "KRS number '{raw}' is too long"
        )));
    }

    Ok(format!("{cleaned:0>10}"))
}

/// Normalize a NIP (tax id) to its canonical 10-digit form.
pub fn normalize_nip(raw: &str) -> Result<String> {
    let cleaned = raw.trim().replace(['-', ' '], "");

    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(EnrichError::InvalidLookupKey(format!(
            "NIP '{raw}' must be numeric"
        )));
    }
    if cleaned.len() != 10 {
        return Err(EnrichError::InvalidLookupKey(format!(
            "NIP '{raw}' must be 10 digits"
        )));
    }

    Ok(cleaned)
}

/// Normalize a REGON (statistical id); both the 9 and 14 digit forms exist.
pub fn normalize_regon(raw: &str) -> Result<String> {
    let cleaned = raw.trim().replace(['-', ' '], "");

    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(EnrichError::InvalidLookupKey(format!(
            "REGON '{raw}' must be numeric"
        )));
    }
    if cleaned.len() != 9 && cleaned.len() != 14 {
        return Err(EnrichError::InvalidLookupKey(format!(
            "REGON '{raw}' must be 9 or 14 digits"
        )));
    }

    Ok(cleaned)
}
