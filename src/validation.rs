//! Validation helpers for message implementations and envelope construction.

use crate::types::{Error, Result};

/// Validate that a string is not empty.
pub fn validate_non_empty(s: &str, field: &str) -> Result<()> {
    if s.is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Validate a logical port name: non-empty, no surrounding whitespace.
pub fn validate_port(port: &str) -> Result<()> {
    validate_non_empty(port, "port")?;
    if port.trim() != port {
        return Err(Error::validation(format!(
            "port '{}' has surrounding whitespace",
            port
        )));
    }
    Ok(())
}
