//! Budget reconciliation: apply one `budget-update` event.

use chrono::{DateTime, Utc};
use queue::{BudgetAction, BudgetUpdate, Handler};
use sea_orm::{DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*};
use tracing::{debug, info};

use crate::{Budget, EngineError, ResultEngine, budgets, transactions};

use super::{Engine, with_tx};

impl Engine {
    /// Adjust `current_amount` of every live budget of the event's
    /// (user, category) whose cycle contains the transaction date.
    ///
    /// Returns how many budgets changed. An event without category, or whose
    /// transaction no longer exists or belongs to another user, is a no-op.
    /// Soft-deleted transactions still count so their `subtract` events apply.
    pub async fn apply_budget_update(&self, event: &BudgetUpdate) -> ResultEngine<usize> {
        let Some(category_id) = event.category_id.as_deref() else {
            debug!(uid = %event.uid, "budget update without category");
            return Ok(0);
        };
        let Some(transaction) = transactions::Entity::find_by_id(event.uid.clone())
            .one(&self.database)
            .await?
        else {
            debug!(uid = %event.uid, "budget update for unknown transaction");
            return Ok(0);
        };
        if transaction.user_id != event.user_id {
            debug!(
                uid = %event.uid,
                user_id = %event.user_id,
                "budget update for another user's transaction"
            );
            return Ok(0);
        }

        let candidates = budgets::Entity::find()
            .filter(budgets::Column::UserId.eq(event.user_id.as_str()))
            .filter(budgets::Column::CategoryId.eq(category_id))
            .filter(budgets::Column::IsDeleted.eq(false))
            .all(&self.database)
            .await?;

        let mut changed = 0;
        for candidate in candidates {
            let applied = with_tx!(self, |db_tx| {
                Self::adjust_budget(&db_tx, &candidate.uid, transaction.transaction_date, event)
                    .await
            })?;
            if applied {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Read-modify-write of one budget inside `db_tx`.
    async fn adjust_budget(
        db_tx: &DatabaseTransaction,
        budget_uid: &str,
        transaction_date: DateTime<Utc>,
        event: &BudgetUpdate,
    ) -> ResultEngine<bool> {
        let Some(model) = budgets::Entity::find_by_id(budget_uid.to_string())
            .filter(budgets::Column::IsDeleted.eq(false))
            .one(db_tx)
            .await?
        else {
            return Ok(false);
        };
        let mut budget = Budget::try_from(model)?;
        if !budget.contains(transaction_date) {
            debug!(budget = budget_uid, uid = %event.uid, "transaction outside budget cycle");
            return Ok(false);
        }

        budget.current_amount = match event.action_type {
            BudgetAction::Add => budget.current_amount.checked_add(event.amount),
            BudgetAction::Subtract => budget.current_amount.checked_sub(event.amount),
        }
        .ok_or_else(|| {
            EngineError::InvalidAmount(format!("current amount overflow on budget {budget_uid}"))
        })?;
        budget.updated_at = Utc::now();
        budgets::ActiveModel::from(&budget).update(db_tx).await?;

        info!(
            budget = budget_uid,
            uid = %event.uid,
            action = ?event.action_type,
            current_amount = %budget.current_amount.normalize(),
            "budget reconciled"
        );
        Ok(true)
    }
}

#[async_trait::async_trait]
impl Handler<BudgetUpdate> for Engine {
    type Error = EngineError;

    async fn handle(&self, message: BudgetUpdate) -> Result<(), Self::Error> {
        self.apply_budget_update(&message).await.map(|_| ())
    }
}
