//! Validation of values embedded into T-SQL text.
//!
//! Values are rejected rather than escaped: anything that could close a
//! bracket or a string literal, start a `sqlcmd` variable, or break the
//! here-document line structure never reaches the rendered script.

use crate::{EngineError, Result};

const MAX_IDENTIFIER_LEN: usize = 128;

/// Render `value` as a bracketed identifier, e.g. `[sales_staging]`.
pub fn ident(value: &str) -> Result<String> {
    let reject = |reason: &'static str| -> Result<String> {
        Err(EngineError::InvalidIdentifier {
            value: value.to_string(),
            reason,
        })
    };

    if value.trim().is_empty() {
        return reject("identifier must not be empty");
    }
    if value.chars().count() > MAX_IDENTIFIER_LEN {
        return reject("identifier longer than 128 characters");
    }
    if value.contains(['[', ']', '\'', '"']) {
        return reject("identifier must not contain brackets or quotes");
    }
    check_common(value)?;
    Ok(format!("[{}]", value))
}

/// Render `value` as a Unicode string literal, e.g. `N'/mnt/db/a.mdf'`.
pub fn literal(value: &str) -> Result<String> {
    if value.contains('\'') {
        return Err(EngineError::InvalidIdentifier {
            value: value.to_string(),
            reason: "value must not contain single quotes",
        });
    }
    check_common(value)?;
    Ok(format!("N'{}'", value))
}

fn check_common(value: &str) -> Result<()> {
    if value.chars().any(char::is_control) {
        return Err(EngineError::InvalidIdentifier {
            value: value.to_string(),
            reason: "value must not contain control characters",
        });
    }
    if value.contains("$(") {
        return Err(EngineError::InvalidIdentifier {
            value: value.to_string(),
            reason: "value must not contain sqlcmd variable syntax",
        });
    }
    Ok(())
}
