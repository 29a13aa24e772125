use queue::ExtractedTransaction;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::{ExtractError, ResultExtract};

const REQUIRED_STRINGS: [&str; 3] = ["name", "type", "transactionDate"];
const NULLABLE_STRINGS: [&str; 5] = ["source", "bankName", "receiver", "category", "notes"];

fn invalid(index: usize, reason: impl std::fmt::Display) -> ExtractError {
    ExtractError::InvalidOutput(format!("transaction {index}: {reason}"))
}

fn check_shape(index: usize, object: &Map<String, Value>) -> ResultExtract<()> {
    match object.get("amount") {
        Some(Value::Number(_)) => {}
        Some(_) => return Err(invalid(index, "amount must be a number")),
        None => return Err(invalid(index, "amount is required")),
    }
    for key in REQUIRED_STRINGS {
        match object.get(key) {
            Some(Value::String(_)) => {}
            Some(_) => return Err(invalid(index, format!("{key} must be a string"))),
            None => return Err(invalid(index, format!("{key} is required"))),
        }
    }
    for key in NULLABLE_STRINGS {
        if let Some(value) = object.get(key)
            && !matches!(value, Value::String(_) | Value::Null)
        {
            return Err(invalid(index, format!("{key} must be a string or null")));
        }
    }
    if let Some(value) = object.get("currency")
        && !value.is_string()
    {
        return Err(invalid(index, "currency must be a string"));
    }
    Ok(())
}

/// Check the raw model output and turn it into transactions.
///
/// The output must be a JSON array of objects. Missing nullable fields read
/// as null and a missing currency defaults to `THB`. Amounts must not be
/// negative and dates must parse.
pub fn parse_output(raw: &str) -> ResultExtract<Vec<ExtractedTransaction>> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|err| ExtractError::InvalidOutput(format!("not JSON: {err}")))?;
    let Value::Array(items) = value else {
        return Err(ExtractError::InvalidOutput(
            "expected an array of transactions".to_string(),
        ));
    };

    let mut transactions = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(object) = &item else {
            return Err(invalid(index, "expected an object"));
        };
        check_shape(index, object)?;

        let transaction: ExtractedTransaction =
            serde_json::from_value(item).map_err(|err| invalid(index, err))?;
        transaction.validate().map_err(|err| invalid(index, err))?;
        if transaction.amount < Decimal::ZERO {
            return Err(invalid(index, "amount must not be negative"));
        }
        transactions.push(transaction);
    }
    Ok(transactions)
}
