//! Ledger services.
//!
//! Each mutating operation takes the item locks it needs, opens exactly one
//! transaction, and publishes its events only after that transaction commits.

pub mod batch_store;
pub mod consumption;
pub mod item_registry;
pub mod reconciliation;
pub mod stock_in;
pub mod transfer;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidationError;

use crate::errors::{ServiceError, ServiceResult};

pub const STOCK_IN_PREFIX: &str = "STK-IN";
pub const TRANSFER_PREFIX: &str = "STK-TRN";
pub const ADJUSTMENT_PREFIX: &str = "ADJ";

/// Who is performing an operation, and in which school session and term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationContext {
    pub actor_id: Option<i64>,
    pub session_id: Option<i64>,
    pub term_id: Option<i64>,
}

impl OperationContext {
    pub fn actor(actor_id: i64) -> Self {
        Self {
            actor_id: Some(actor_id),
            ..Default::default()
        }
    }

    /// Context for unattended jobs such as reconciliation.
    pub fn system() -> Self {
        Self::default()
    }

    pub fn with_term(mut self, session_id: i64, term_id: i64) -> Self {
        self.session_id = Some(session_id);
        self.term_id = Some(term_id);
        self
    }
}

/// `PREFIX-YYYYMMDD-XXXXXX`, six upper-case hex characters of randomness.
pub fn receipt_number(prefix: &str, date: NaiveDate) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    format!("{}-{}-{}", prefix, date.format("%Y%m%d"), suffix)
}

/// Every quantity and money column is `NUMERIC(12, 2)`.
pub const DECIMAL_PLACES: u32 = 2;

fn fits_columns(value: Decimal) -> bool {
    value.normalize().scale() <= DECIMAL_PLACES
}

fn too_precise() -> ValidationError {
    let mut err = ValidationError::new("precision");
    err.message = Some(format!("At most {} decimal places are allowed", DECIMAL_PLACES).into());
    err
}

pub(crate) fn validate_positive_quantity(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        let mut err = ValidationError::new("range");
        err.message = Some("Quantity must be greater than 0".into());
        return Err(err);
    }
    if !fits_columns(*value) {
        return Err(too_precise());
    }
    Ok(())
}

pub(crate) fn validate_non_negative_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        let mut err = ValidationError::new("range");
        err.message = Some("Amount cannot be negative".into());
        return Err(err);
    }
    if !fits_columns(*value) {
        return Err(too_precise());
    }
    Ok(())
}

pub(crate) fn ensure_positive(quantity: Decimal, what: &str) -> ServiceResult<()> {
    if quantity <= Decimal::ZERO {
        return Err(ServiceError::InvalidInput(format!(
            "{} must be greater than 0, got {}",
            what, quantity
        )));
    }
    if !fits_columns(quantity) {
        return Err(ServiceError::InvalidInput(format!(
            "{} allows at most {} decimal places, got {}",
            what, DECIMAL_PLACES, quantity
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn receipt_numbers_carry_prefix_date_and_suffix() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let number = receipt_number(TRANSFER_PREFIX, date);
        assert!(number.starts_with("STK-TRN-20240309-"));

        let suffix = number.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 6);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn receipt_numbers_differ_between_calls() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_ne!(
            receipt_number(STOCK_IN_PREFIX, date),
            receipt_number(STOCK_IN_PREFIX, date)
        );
    }

    #[test]
    fn quantity_checks() {
        assert!(ensure_positive(dec!(0.5), "quantity").is_ok());
        assert!(ensure_positive(Decimal::ZERO, "quantity").is_err());
        assert!(validate_positive_quantity(&dec!(-1)).is_err());
        assert!(validate_non_negative_amount(&Decimal::ZERO).is_ok());
    }

    #[test]
    fn precision_is_capped_at_two_places() {
        assert!(validate_positive_quantity(&dec!(0.25)).is_ok());
        // trailing zeros do not count
        assert!(validate_positive_quantity(&dec!(1.500)).is_ok());
        assert!(validate_positive_quantity(&dec!(0.125)).is_err());
        assert!(validate_non_negative_amount(&dec!(3.333)).is_err());
        assert!(ensure_positive(dec!(0.001), "quantity").is_err());
    }

    #[test]
    fn context_builders() {
        let ctx = OperationContext::actor(4).with_term(2024, 1);
        assert_eq!(ctx.actor_id, Some(4));
        assert_eq!(ctx.term_id, Some(1));
        assert_eq!(OperationContext::system().actor_id, None);
    }
}
