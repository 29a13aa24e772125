use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a money movement, shared by the HTTP API, the queue contracts and
/// the database (`transactions.type`, `categories.type`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
    Transfer,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Transfer => "transfer",
        }
    }
}

impl TryFrom<&str> for TransactionType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            other => Err(format!("invalid transaction type: {other}")),
        }
    }
}

pub mod category {
    use super::*;
    use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

    /// Categories every user sees, in display order.
    pub const EXPENSE_CATEGORIES: [&str; 11] = [
        "Food & Drink",
        "Transportation",
        "Shopping",
        "Health",
        "Entertainment",
        "Bills & Utilities",
        "Education",
        "Personal Care",
        "Travel",
        "Gifts & Donations",
        "Others",
    ];

    pub const INCOME_CATEGORIES: [&str; 3] = ["Salary", "Business/Freelance", "Other Income"];

    /// Default catalogue as `(name, type)` pairs.
    pub fn default_categories() -> impl Iterator<Item = (&'static str, TransactionType)> {
        EXPENSE_CATEGORIES
            .into_iter()
            .map(|name| (name, TransactionType::Expense))
            .chain(
                INCOME_CATEGORIES
                    .into_iter()
                    .map(|name| (name, TransactionType::Income)),
            )
    }

    /// Derive the lookup slug of a category name.
    ///
    /// Accents are stripped, letters lowercased and every run of
    /// non-alphanumeric characters collapses into a single `-`:
    /// `"Food & Drink"` becomes `"food-drink"`.
    pub fn slugify(name: &str) -> String {
        let mut out = String::with_capacity(name.len());
        let mut pending_dash = false;
        for ch in name.nfkd() {
            if is_combining_mark(ch) {
                continue;
            }
            if ch.is_alphanumeric() {
                if pending_dash && !out.is_empty() {
                    out.push('-');
                }
                pending_dash = false;
                out.extend(ch.to_lowercase());
            } else {
                pending_dash = true;
            }
        }
        out
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CategoryView {
        pub uid: String,
        pub name: String,
        pub slug: String,
        #[serde(rename = "type")]
        pub kind: TransactionType,
        /// `None` for the global defaults.
        pub user_id: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CategoryCreate {
        pub name: String,
        #[serde(rename = "type")]
        pub kind: TransactionType,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct CategoryList {
        #[serde(rename = "type")]
        pub kind: Option<TransactionType>,
    }

}

pub mod tag {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TagView {
        pub uid: String,
        pub name: String,
        pub user_id: String,
        pub created_at: DateTime<Utc>,
    }

    /// Body of `POST /tags`, `PUT /tags/{uid}` and
    /// `POST /transactions/{uid}/tags`.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct TagName {
        pub name: String,
    }
}

pub mod transaction {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TransactionView {
        pub uid: String,
        pub name: String,
        /// Decimal string, e.g. `"12.5"`.
        pub amount: String,
        pub currency: String,
        #[serde(rename = "type")]
        pub kind: TransactionType,
        pub source: Option<String>,
        pub bank_name: Option<String>,
        pub receiver: Option<String>,
        pub notes: Option<String>,
        pub transaction_date: DateTime<Utc>,
        pub user_id: String,
        pub category_id: Option<String>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TransactionListQuery {
        pub page: Option<u64>,
        pub page_size: Option<u64>,
        pub start_date: Option<DateTime<Utc>>,
        pub end_date: Option<DateTime<Utc>>,
        pub category_id: Option<String>,
        /// Oldest first when `false`; newest first otherwise.
        pub descending: Option<bool>,
    }

    /// Month to summarise; the current one when absent.
    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct MonthlyTotalsQuery {
        pub date: Option<DateTime<Utc>>,
    }

    /// Partial edit. Absent fields are kept; an empty `categoryId` clears the
    /// category.
    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TransactionUpdate {
        pub name: Option<String>,
        pub amount: Option<String>,
        pub notes: Option<String>,
        pub transaction_date: Option<DateTime<Utc>>,
        pub category_id: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct UploadImage {
        pub name: String,
        /// Base64 of the raw image bytes.
        pub content: String,
        pub mime_type: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct UploadRequest {
        pub images: Vec<UploadImage>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct UploadAccepted {
        pub message: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MonthlyTotals {
        pub total_income: String,
        pub total_expense: String,
    }
}

pub mod budget {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum BudgetCycle {
        Daily,
        Weekly,
        Monthly,
        Yearly,
        Custom,
    }

    impl BudgetCycle {
        pub fn as_str(self) -> &'static str {
            match self {
                Self::Daily => "daily",
                Self::Weekly => "weekly",
                Self::Monthly => "monthly",
                Self::Yearly => "yearly",
                Self::Custom => "custom",
            }
        }
    }

    impl TryFrom<&str> for BudgetCycle {
        type Error = String;

        fn try_from(value: &str) -> Result<Self, Self::Error> {
            match value {
                "daily" => Ok(Self::Daily),
                "weekly" => Ok(Self::Weekly),
                "monthly" => Ok(Self::Monthly),
                "yearly" => Ok(Self::Yearly),
                "custom" => Ok(Self::Custom),
                other => Err(format!("invalid budget cycle: {other}")),
            }
        }
    }

    /// How `currentAmount` is treated when a budget moves to another category.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum MigrateAmountOption {
        NewCategoryData,
        ResetToZero,
        #[default]
        DoNothing,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BudgetNew {
        pub name: String,
        /// Decimal string.
        pub target: String,
        pub cycle: BudgetCycle,
        pub start_date: DateTime<Utc>,
        pub end_date: Option<DateTime<Utc>>,
        pub category_id: String,
    }

    /// Partial edit; absent fields are kept.
    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BudgetEdit {
        pub name: Option<String>,
        pub target: Option<String>,
        pub cycle: Option<BudgetCycle>,
        pub start_date: Option<DateTime<Utc>>,
        pub end_date: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BudgetView {
        pub uid: String,
        pub name: String,
        pub current_amount: String,
        pub target: String,
        pub cycle: BudgetCycle,
        pub start_date: DateTime<Utc>,
        pub end_date: Option<DateTime<Utc>>,
        pub category_id: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BudgetProgress {
        pub uid: String,
        pub name: String,
        pub current_amount: String,
        pub target: String,
        pub percentage: u32,
        pub start_date: DateTime<Utc>,
        pub end_date: Option<DateTime<Utc>>,
        pub cycle: BudgetCycle,
        pub category_name: Option<String>,
        pub remaining_days: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BudgetCategoryChange {
        pub category_id: String,
        #[serde(default)]
        pub migrate_current_amount_option: MigrateAmountOption,
    }
}
