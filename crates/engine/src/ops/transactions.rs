use api_types::TransactionType;
use chrono::{DateTime, Datelike, Months, TimeZone, Utc};
use queue::{BudgetAction, BudgetUpdate, DEFAULT_CURRENCY, ExtractionResult};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue, ConnectionTrait, DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait, prelude::*,
};
use tracing::{debug, info};

use crate::{
    EngineError, ResultEngine, Transaction, transactions,
    transactions::to_transactions,
    util::{
        TRANSACTION_PREFIX, checked_sum, ensure_non_negative, normalize_optional_text,
        normalize_required_name, uid,
    },
};

use super::{Engine, with_tx};

/// Name the model gives to an image that is not a receipt. Such records are
/// skipped when a result is persisted.
pub const INVALID_TRANSACTION_NAME: &str = "Invalid transaction";

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

/// Input of [`Engine::create_transaction`].
#[derive(Clone, Debug)]
pub struct TransactionNew {
    pub name: String,
    pub amount: Decimal,
    /// Defaults to `THB` when absent.
    pub currency: Option<String>,
    pub kind: TransactionType,
    pub source: Option<String>,
    pub bank_name: Option<String>,
    pub receiver: Option<String>,
    pub notes: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub category_id: Option<String>,
}

/// Partial edit. `None` keeps the stored value; `category_id: Some(None)`
/// clears the category.
#[derive(Clone, Debug, Default)]
pub struct TransactionPatch {
    pub name: Option<String>,
    pub amount: Option<Decimal>,
    pub notes: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub category_id: Option<Option<String>>,
}

#[derive(Clone, Debug, Default)]
pub struct TransactionFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub category_id: Option<String>,
    /// Oldest first when `false`.
    pub ascending: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MonthlyTotals {
    pub income: Decimal,
    pub expense: Decimal,
}

impl Engine {
    /// Insert a transaction. An expense with a category also enqueues a
    /// budget `add` event, committed together with the row.
    pub async fn create_transaction(
        &self,
        user_id: &str,
        new: TransactionNew,
    ) -> ResultEngine<Transaction> {
        with_tx!(self, |db_tx| {
            if let Some(category_id) = new.category_id.as_deref() {
                Self::require_category(&db_tx, user_id, category_id).await?;
            }
            Self::insert_transaction(&db_tx, user_id, new).await
        })
    }

    /// Persist the records of one extraction result.
    ///
    /// Records named [`INVALID_TRANSACTION_NAME`] are skipped. Category slugs
    /// are resolved for the user; an unknown slug leaves the category unset.
    /// Every record is committed on its own, so a failure keeps the records
    /// stored before it.
    pub async fn record_extracted(
        &self,
        result: &ExtractionResult,
    ) -> ResultEngine<Vec<Transaction>> {
        let user_id = result.user_id.as_str();
        let mut created = Vec::with_capacity(result.transactions.len());

        for record in &result.transactions {
            if record.name == INVALID_TRANSACTION_NAME {
                debug!(user_id, batch_id = %result.batch_id, "skipping invalid transaction");
                continue;
            }
            let transaction_date = record.occurred_at()?;

            let transaction = with_tx!(self, |db_tx| {
                let category_id = match record.category.as_deref() {
                    Some(slug) => Self::category_by_slug(&db_tx, user_id, slug)
                        .await?
                        .map(|model| model.uid),
                    None => None,
                };
                Self::insert_transaction(
                    &db_tx,
                    user_id,
                    TransactionNew {
                        name: record.name.clone(),
                        amount: record.amount,
                        currency: Some(record.currency.clone()),
                        kind: record.kind,
                        source: record.source.clone(),
                        bank_name: record.bank_name.clone(),
                        receiver: record.receiver.clone(),
                        notes: record.notes.clone(),
                        transaction_date,
                        category_id,
                    },
                )
                .await
            })?;
            created.push(transaction);
        }

        info!(
            user_id,
            batch_id = %result.batch_id,
            count = created.len(),
            "extracted transactions stored"
        );
        Ok(created)
    }

    /// Return a live transaction of `user_id`.
    pub async fn find_transaction(&self, uid: &str, user_id: &str) -> ResultEngine<Transaction> {
        let model = Self::require_transaction(&self.database, uid, user_id).await?;
        Transaction::try_from(model)
    }

    /// Page through the live transactions of `user_id`, newest first unless
    /// the filter asks otherwise. `page` starts at 1.
    pub async fn list_transactions(
        &self,
        user_id: &str,
        page: Option<u64>,
        page_size: Option<u64>,
        filter: &TransactionFilter,
    ) -> ResultEngine<Vec<Transaction>> {
        let page = page.unwrap_or(1).max(1);
        let page_size = page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let mut query = transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(user_id))
            .filter(transactions::Column::IsDeleted.eq(false));
        if let Some(start) = filter.start {
            query = query.filter(transactions::Column::TransactionDate.gte(start));
        }
        if let Some(end) = filter.end {
            query = query.filter(transactions::Column::TransactionDate.lte(end));
        }
        if let Some(category_id) = filter.category_id.as_deref() {
            query = query.filter(transactions::Column::CategoryId.eq(category_id));
        }
        query = if filter.ascending {
            query
                .order_by_asc(transactions::Column::TransactionDate)
                .order_by_asc(transactions::Column::Uid)
        } else {
            query
                .order_by_desc(transactions::Column::TransactionDate)
                .order_by_desc(transactions::Column::Uid)
        };

        let models = query
            .offset((page - 1) * page_size)
            .limit(page_size)
            .all(&self.database)
            .await?;
        to_transactions(models)
    }

    /// Apply a partial edit.
    ///
    /// For an expense, a change of category or amount enqueues `subtract` on
    /// the old category with the old amount, then `add` on the new category
    /// with the new amount. The two events are handled independently.
    pub async fn update_transaction(
        &self,
        uid: &str,
        user_id: &str,
        patch: TransactionPatch,
    ) -> ResultEngine<Transaction> {
        with_tx!(self, |db_tx| {
            let model = Self::require_transaction(&db_tx, uid, user_id).await?;
            let before = Transaction::try_from(model)?;
            let mut after = before.clone();

            if let Some(name) = patch.name.as_deref() {
                after.name = normalize_required_name(name, "transaction")?;
            }
            if let Some(amount) = patch.amount {
                ensure_non_negative(amount, "amount")?;
                after.amount = amount;
            }
            if let Some(notes) = patch.notes.as_deref() {
                after.notes = normalize_optional_text(Some(notes));
            }
            if let Some(date) = patch.transaction_date {
                after.transaction_date = date;
            }
            if let Some(category_id) = patch.category_id {
                if let Some(category_id) = category_id.as_deref() {
                    Self::require_category(&db_tx, user_id, category_id).await?;
                }
                after.category_id = category_id;
            }
            after.updated_at = Utc::now();

            transactions::ActiveModel::from(&after)
                .update(&db_tx)
                .await?;

            let moved = before.category_id != after.category_id || before.amount != after.amount;
            if after.kind == TransactionType::Expense && moved {
                if let Some(old_category) = before.category_id.as_deref() {
                    Self::emit_budget_update(
                        &db_tx,
                        &before,
                        old_category,
                        before.amount,
                        BudgetAction::Subtract,
                    )
                    .await?;
                }
                if let Some(new_category) = after.category_id.as_deref() {
                    Self::emit_budget_update(
                        &db_tx,
                        &after,
                        new_category,
                        after.amount,
                        BudgetAction::Add,
                    )
                    .await?;
                }
            }

            Ok(after)
        })
    }

    /// Soft-delete a transaction. A budgeted expense enqueues `subtract`.
    pub async fn delete_transaction(&self, uid: &str, user_id: &str) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let model = Self::require_transaction(&db_tx, uid, user_id).await?;
            let transaction = Transaction::try_from(model)?;

            transactions::ActiveModel {
                uid: ActiveValue::Unchanged(transaction.uid.clone()),
                is_deleted: ActiveValue::Set(true),
                updated_at: ActiveValue::Set(Utc::now()),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;

            if transaction.counts_for_budget()
                && let Some(category_id) = transaction.category_id.as_deref()
            {
                Self::emit_budget_update(
                    &db_tx,
                    &transaction,
                    category_id,
                    transaction.amount,
                    BudgetAction::Subtract,
                )
                .await?;
            }
            Ok(())
        })
    }

    /// Income and expense sums for the calendar month (UTC) containing `at`.
    pub async fn monthly_totals(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> ResultEngine<MonthlyTotals> {
        let start = Utc
            .with_ymd_and_hms(at.year(), at.month(), 1, 0, 0, 0)
            .single()
            .ok_or_else(|| EngineError::InvalidAmount(format!("invalid month of {at}")))?;
        let end = start
            .checked_add_months(Months::new(1))
            .ok_or_else(|| EngineError::InvalidAmount(format!("invalid month of {at}")))?;

        let models = transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(user_id))
            .filter(transactions::Column::IsDeleted.eq(false))
            .filter(transactions::Column::TransactionDate.gte(start))
            .filter(transactions::Column::TransactionDate.lt(end))
            .all(&self.database)
            .await?;

        let transactions = to_transactions(models)?;
        let of_kind = |kind: TransactionType| {
            transactions
                .iter()
                .filter(move |transaction| transaction.kind == kind)
                .map(|transaction| transaction.amount)
        };
        Ok(MonthlyTotals {
            income: checked_sum(of_kind(TransactionType::Income), "income")?,
            expense: checked_sum(of_kind(TransactionType::Expense), "expense")?,
        })
    }

    async fn insert_transaction(
        db_tx: &DatabaseTransaction,
        user_id: &str,
        new: TransactionNew,
    ) -> ResultEngine<Transaction> {
        let name = normalize_required_name(&new.name, "transaction")?;
        ensure_non_negative(new.amount, "amount")?;
        let currency = normalize_optional_text(new.currency.as_deref())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        let now = Utc::now();
        let transaction = Transaction {
            uid: uid(TRANSACTION_PREFIX),
            name,
            amount: new.amount,
            currency,
            kind: new.kind,
            source: normalize_optional_text(new.source.as_deref()),
            bank_name: normalize_optional_text(new.bank_name.as_deref()),
            receiver: normalize_optional_text(new.receiver.as_deref()),
            notes: normalize_optional_text(new.notes.as_deref()),
            transaction_date: new.transaction_date,
            is_deleted: false,
            created_at: now,
            updated_at: now,
            user_id: user_id.to_string(),
            category_id: new.category_id,
        };
        transactions::ActiveModel::from(&transaction)
            .insert(db_tx)
            .await?;

        if transaction.counts_for_budget()
            && let Some(category_id) = transaction.category_id.as_deref()
        {
            Self::emit_budget_update(
                db_tx,
                &transaction,
                category_id,
                transaction.amount,
                BudgetAction::Add,
            )
            .await?;
        }
        Ok(transaction)
    }

    async fn emit_budget_update<C: ConnectionTrait>(
        db: &C,
        transaction: &Transaction,
        category_id: &str,
        amount: Decimal,
        action_type: BudgetAction,
    ) -> ResultEngine<()> {
        let event = BudgetUpdate {
            uid: transaction.uid.clone(),
            user_id: transaction.user_id.clone(),
            amount,
            category_id: Some(category_id.to_string()),
            action_type,
        };
        let id = queue::publish(db, &event).await?;
        debug!(uid = %transaction.uid, category_id, ?action_type, id, "budget update enqueued");
        Ok(())
    }

    pub(super) async fn require_transaction<C: ConnectionTrait>(
        db: &C,
        uid: &str,
        user_id: &str,
    ) -> ResultEngine<transactions::Model> {
        let model = transactions::Entity::find_by_id(uid.to_string())
            .filter(transactions::Column::IsDeleted.eq(false))
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(uid.to_string()))?;
        if model.user_id != user_id {
            return Err(EngineError::Forbidden(
                "You do not have permission to access this transaction".to_string(),
            ));
        }
        Ok(model)
    }
}
