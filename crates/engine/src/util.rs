//! Internal helpers for model validation and conversion.
//!
//! These utilities are **not** part of the public API.

use std::str::FromStr;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

pub(crate) const TRANSACTION_PREFIX: &str = "txn";
pub(crate) const CATEGORY_PREFIX: &str = "cat";
pub(crate) const BUDGET_PREFIX: &str = "bud";
pub(crate) const TAG_PREFIX: &str = "tag";

/// Time-ordered public id: `{prefix}_{uuid v7}`.
pub(crate) fn uid(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::now_v7())
}

/// Parse a decimal amount stored as text.
pub(crate) fn parse_amount(value: &str, label: &str) -> ResultEngine<Decimal> {
    Decimal::from_str(value.trim())
        .map_err(|_| EngineError::InvalidAmount(format!("invalid {label}: {value}")))
}

/// Canonical text form of an amount: no trailing zeros, `"200"`, `"12.5"`.
pub(crate) fn amount_text(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Sum of `amounts`, or [`EngineError::InvalidAmount`] when it leaves the
/// range of [`Decimal`].
pub(crate) fn checked_sum<I>(amounts: I, label: &str) -> ResultEngine<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    amounts.into_iter().try_fold(Decimal::ZERO, |total, amount| {
        total
            .checked_add(amount)
            .ok_or_else(|| EngineError::InvalidAmount(format!("{label} overflow")))
    })
}

pub(crate) fn ensure_non_negative(value: Decimal, label: &str) -> ResultEngine<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(EngineError::InvalidAmount(format!(
            "{label} must be >= 0"
        )));
    }
    Ok(())
}

pub(crate) fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidName(format!(
            "{label} name must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}
