//! # Validation Module
//!
//! Input validation for scanned and typed codes.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Decoder / keyboard                                           │
//! │  └── Produces raw text (may carry CR/LF from keyboard-wedge scanners)  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Trim, reject empty                                                │
//! │  └── Length and character checks                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Remote service                                               │
//! │  └── Business rules (unknown code, already checked in, capacity)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use checkin_core::validation::validate_code;
//!
//! assert_eq!(validate_code(" EVT-42\n").unwrap(), "EVT-42");
//! assert!(validate_code("").is_err());
//! ```

use crate::error::ValidationError;
use crate::{MAX_CODE_LENGTH, MAX_IDENTIFIER_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Validators
// =============================================================================

/// Validates a decoded or typed code.
///
/// ## Rules
/// - Surrounding whitespace is trimmed
/// - Must not be empty after trimming
/// - At most [`MAX_CODE_LENGTH`] characters
/// - No control characters inside the code
///
/// ## Returns
/// The trimmed code.
pub fn validate_code(code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.chars().count() > MAX_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: MAX_CODE_LENGTH,
        });
    }

    if code.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }

    Ok(code.to_string())
}

/// Validates a check-in context (event or session) identifier.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most [`MAX_IDENTIFIER_LENGTH`] characters
/// - No whitespace or control characters inside
///
/// ## Example
/// ```rust
/// use checkin_core::validation::validate_context_id;
///
/// assert!(validate_context_id("session-7").is_ok());
/// assert!(validate_context_id("session 7").is_err());
/// ```
pub fn validate_context_id(context_id: &str) -> ValidationResult<String> {
    validate_identifier("context_id", context_id)
}

/// Validates a device identifier.
pub fn validate_device_id(device_id: &str) -> ValidationResult<String> {
    validate_identifier("device_id", device_id)
}

fn validate_identifier(field: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_IDENTIFIER_LENGTH,
        });
    }

    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(value.to_string())
}

// =============================================================================
// Unit Tests
// =============================================================================
