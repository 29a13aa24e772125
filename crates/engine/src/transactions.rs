//! Transaction records.
//!
//! Amounts are exact decimals in memory and canonical decimal strings in the
//! database. Rows are never removed, only flagged with `is_deleted`.

use api_types::{TransactionType, transaction::TransactionView};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveValue, entity::prelude::*};

use crate::{
    EngineError, ResultEngine,
    util::{amount_text, parse_amount},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub uid: String,
    pub name: String,
    pub amount: Decimal,
    pub currency: String,
    pub kind: TransactionType,
    pub source: Option<String>,
    pub bank_name: Option<String>,
    pub receiver: Option<String>,
    pub notes: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: String,
    pub category_id: Option<String>,
}

impl Transaction {
    /// Expenses tied to a category are the only records budgets track.
    pub fn counts_for_budget(&self) -> bool {
        self.kind == TransactionType::Expense && self.category_id.is_some()
    }
}

impl From<Transaction> for TransactionView {
    fn from(tx: Transaction) -> Self {
        Self {
            uid: tx.uid,
            name: tx.name,
            amount: amount_text(tx.amount),
            currency: tx.currency,
            kind: tx.kind,
            source: tx.source,
            bank_name: tx.bank_name,
            receiver: tx.receiver,
            notes: tx.notes,
            transaction_date: tx.transaction_date,
            user_id: tx.user_id,
            category_id: tx.category_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub uid: String,
    pub amount: String,
    pub name: String,
    pub currency: String,
    #[sea_orm(column_name = "type")]
    pub kind: String,
    pub notes: Option<String>,
    pub source: Option<String>,
    pub bank_name: Option<String>,
    pub receiver: Option<String>,
    pub transaction_date: DateTimeUtc,
    pub is_deleted: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub user_id: String,
    pub category_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::categories::Entity",
        from = "Column::CategoryId",
        to = "super::categories::Column::Uid",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Category,
}

impl Related<super::categories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            uid: ActiveValue::Set(tx.uid.clone()),
            amount: ActiveValue::Set(amount_text(tx.amount)),
            name: ActiveValue::Set(tx.name.clone()),
            currency: ActiveValue::Set(tx.currency.clone()),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            notes: ActiveValue::Set(tx.notes.clone()),
            source: ActiveValue::Set(tx.source.clone()),
            bank_name: ActiveValue::Set(tx.bank_name.clone()),
            receiver: ActiveValue::Set(tx.receiver.clone()),
            transaction_date: ActiveValue::Set(tx.transaction_date),
            is_deleted: ActiveValue::Set(tx.is_deleted),
            created_at: ActiveValue::Set(tx.created_at),
            updated_at: ActiveValue::Set(tx.updated_at),
            user_id: ActiveValue::Set(tx.user_id.clone()),
            category_id: ActiveValue::Set(tx.category_id.clone()),
        }
    }
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            amount: parse_amount(&model.amount, "amount")?,
            kind: TransactionType::try_from(model.kind.as_str())
                .map_err(EngineError::InvalidAmount)?,
            uid: model.uid,
            name: model.name,
            currency: model.currency,
            source: model.source,
            bank_name: model.bank_name,
            receiver: model.receiver,
            notes: model.notes,
            transaction_date: model.transaction_date,
            is_deleted: model.is_deleted,
            created_at: model.created_at,
            updated_at: model.updated_at,
            user_id: model.user_id,
            category_id: model.category_id,
        })
    }
}

pub(crate) fn to_transactions(models: Vec<Model>) -> ResultEngine<Vec<Transaction>> {
    models.into_iter().map(Transaction::try_from).collect()
}
