//! # Validation Module
//!
//! Input validation for the user endpoints.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP extractor (axum Query)                                  │
//! │  └── Parameters present, strings decoded                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── userId is a UUID                                                  │
//! │  └── value is positive and fits DECIMAL(20, 8)                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (PostgreSQL)                                        │
//! │  ├── Foreign key constraints                                           │
//! │  └── SERIALIZABLE isolation for purchases                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use market_core::validation::{parse_amount, validate_user_id};
//!
//! let id = validate_user_id("550e8400-e29b-41d4-a716-446655440000").unwrap();
//! let value = parse_amount("12.5").unwrap();
//! ```

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::{AMOUNT_INTEGER_DIGITS, AMOUNT_SCALE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifiers
// =============================================================================

/// Parses a `userId` parameter.
///
/// ## Example
/// ```rust
/// use market_core::validation::validate_user_id;
///
/// assert!(validate_user_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_user_id("not-a-uuid").is_err());
/// assert!(validate_user_id("").is_err());
/// ```
pub fn validate_user_id(raw: &str) -> ValidationResult<Uuid> {
    let raw = raw.trim();

    if raw.is_empty() {
        return Err(ValidationError::Required {
            field: "userId".to_string(),
        });
    }

    Uuid::parse_str(raw).map_err(|_| ValidationError::InvalidFormat {
        field: "userId".to_string(),
        reason: "must be a valid UUID".to_string(),
    })
}

// =============================================================================
// Amounts
// =============================================================================

/// Validates a deposit or purchase amount.
///
/// ## Rules
/// - Must be positive (> 0)
/// - At most 8 decimal places
/// - At most 12 integer digits
///
/// ```text
/// validate_amount(10)            ✓
/// validate_amount(0.00000001)    ✓
/// validate_amount(0)             ✗ MustBePositive
/// validate_amount(0.000000001)   ✗ TooPrecise
/// ```
pub fn validate_amount(value: Decimal) -> ValidationResult<Decimal> {
    if value <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: "value".to_string(),
        });
    }

    let value = value.normalize();
    if value.scale() > AMOUNT_SCALE {
        return Err(ValidationError::TooPrecise {
            field: "value".to_string(),
            max: AMOUNT_SCALE,
        });
    }

    if value.trunc() >= Decimal::from(10_i64.pow(AMOUNT_INTEGER_DIGITS)) {
        return Err(ValidationError::InvalidFormat {
            field: "value".to_string(),
            reason: format!("must have at most {AMOUNT_INTEGER_DIGITS} integer digits"),
        });
    }

    Ok(value)
}

/// Parses and validates an amount given as a query-string value.
pub fn parse_amount(raw: &str) -> ValidationResult<Decimal> {
    let raw = raw.trim();

    if raw.is_empty() {
        return Err(ValidationError::Required {
            field: "value".to_string(),
        });
    }

    let value = raw
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| ValidationError::InvalidFormat {
            field: "value".to_string(),
            reason: "must be a number".to_string(),
        })?;

    validate_amount(value)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_user_id(" 550e8400-e29b-41d4-a716-446655440000 ").is_ok());
        assert_eq!(
            validate_user_id("   "),
            Err(ValidationError::Required {
                field: "userId".to_string()
            })
        );
        assert!(validate_user_id("123").is_err());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(Decimal::from(10)).is_ok());
        assert!(validate_amount(Decimal::from_str("0.00000001").unwrap()).is_ok());
        assert!(validate_amount(Decimal::from_str("1.50000000000").unwrap()).is_ok());

        assert!(matches!(
            validate_amount(Decimal::ZERO),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            validate_amount(Decimal::from(-5)),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            validate_amount(Decimal::from_str("0.000000001").unwrap()),
            Err(ValidationError::TooPrecise { max: 8, .. })
        ));
        assert!(validate_amount(Decimal::from(1_000_000_000_000_i64)).is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("12.5").unwrap(), Decimal::from_str("12.5").unwrap());
        assert_eq!(parse_amount("1e2").unwrap(), Decimal::from(100));
        assert!(parse_amount("").is_err());
        assert!(parse_amount("ten").is_err());
        assert!(parse_amount("-1").is_err());
    }
}
