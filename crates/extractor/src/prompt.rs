//! Instruction and output schema sent with every extraction request.

use api_types::category::{EXPENSE_CATEGORIES, INCOME_CATEGORIES, slugify};
use queue::DEFAULT_CURRENCY;
use serde_json::{Value, json};

fn slugs(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| slugify(name))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn system_prompt() -> String {
    format!(
        "You are an assistant that extracts structured data from images of receipts, \
invoices, bills, bank transfer slips and other financial documents.
Read every image and return one transaction object per payment you find.
Available expense categories: {expense}.
Available income categories: {income}.
Use exactly one of these identifiers for the category field.
If the transaction type is \"transfer\", set the category to null.
If you cannot determine the category, set it to \"others\".
Write transactionDate in ISO 8601 format.
When no currency is printed, use {currency}.
If an image is not a financial document, return a single transaction named \
\"Invalid transaction\" with amount 0.",
        expense = slugs(&EXPENSE_CATEGORIES),
        income = slugs(&INCOME_CATEGORIES),
        currency = DEFAULT_CURRENCY,
    )
}

fn nullable_string(description: &str) -> Value {
    json!({ "type": "STRING", "nullable": true, "description": description })
}

/// Response schema in the OpenAPI subset the Gemini API accepts.
pub fn response_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "amount": { "type": "NUMBER", "description": "Amount of the transaction" },
                "name": { "type": "STRING", "description": "Name or title of the transaction" },
                "source": nullable_string("Source or origin of the transaction"),
                "bankName": nullable_string("Name of the bank associated with the transaction"),
                "receiver": nullable_string("Receiver's name of the transaction"),
                "currency": { "type": "STRING", "description": "Currency of the transaction" },
                "type": {
                    "type": "STRING",
                    "enum": ["income", "expense", "transfer"],
                    "description": "Type of the transaction"
                },
                "transactionDate": {
                    "type": "STRING",
                    "description": "Date and time when the transaction occurred, ISO 8601"
                },
                "category": nullable_string("Category identifier of the transaction"),
                "notes": nullable_string("Additional notes for the transaction"),
            },
            "required": ["amount", "name", "type", "transactionDate"],
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_category_slugs() {
        let prompt = system_prompt();
        assert!(prompt.contains("food-drink, transportation"));
        assert!(prompt.contains("salary, business-freelance, other-income"));
    }

    #[test]
    fn schema_requires_core_fields() {
        let schema = response_schema();
        assert_eq!(schema["items"]["required"][3], "transactionDate");
        assert_eq!(schema["items"]["properties"]["category"]["nullable"], true);
    }
}
