//! Gate between a normalized bill and the store.

use thiserror::Error;

use super::draft::{NormalizedBill, clean_amount, keys};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required field: Date")]
    MissingDate,
    #[error("Missing required field: Bill Amount")]
    MissingAmount,
    #[error("Bill Amount must contain a valid number")]
    InvalidAmount,
}

/// Check that a bill has a date and at least one numeric amount.
///
/// The date may come from `Date` or `date` and must not be blank. Amounts are looked up in
/// `Bill Amount`, `Bill Amount (INR)` and `total`, in that order; the first that parses as a number
/// after [`clean_amount`] satisfies the check. Bill type and details are not checked.
pub fn validate(bill: &NormalizedBill) -> Result<(), ValidationError> {
    let has_date = [bill.date.clone(), bill.extra_text(keys::DATE_LOWER)]
        .into_iter()
        .flatten()
        .any(|d| !d.trim().is_empty());
    if !has_date {
        return Err(ValidationError::MissingDate);
    }

    let amounts: Vec<String> = [bill.bill_amount.clone(), bill.bill_amount_inr.clone(), bill.extra_text(keys::TOTAL)]
        .into_iter()
        .flatten()
        .collect();
    if amounts.is_empty() {
        return Err(ValidationError::MissingAmount);
    }

    if amounts.iter().any(|amount| clean_amount(amount).parse::<f64>().is_ok()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidAmount)
    }
}
