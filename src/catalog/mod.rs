//! Admin catalog: zones, gateways, compatibility links, methods.
//!
//! Invariants are checked proactively at write time so error bodies name
//! the actual conflict rather than a bare constraint violation.

pub mod gateways;
pub mod links;
pub mod methods;
pub mod zones;

use crate::error::ApiError;

/// Zone and gateway codes are uppercased and must be non-empty.
pub fn normalize_code(raw: &str) -> Result<String, ApiError> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() {
        return Err(ApiError::validation("code must not be empty"));
    }
    Ok(code)
}

pub fn normalize_country(raw: &str) -> Result<String, ApiError> {
    let code = raw.trim().to_uppercase();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ApiError::validation(format!("invalid ISO2 country_code: {raw:?}")));
    }
    Ok(code)
}
