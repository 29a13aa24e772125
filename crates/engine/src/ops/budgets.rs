use api_types::{
    TransactionType,
    budget::{BudgetCycle, MigrateAmountOption},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use sea_orm::{ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use tracing::info;

use crate::{
    Budget, EngineError, ResultEngine, budgets,
    budgets::to_budgets,
    categories, transactions,
    transactions::to_transactions,
    util::{BUDGET_PREFIX, checked_sum, normalize_required_name, uid},
};

use super::{Engine, with_tx};

const MAX_NAME_LEN: usize = 100;

/// Input of [`Engine::create_budget`].
#[derive(Clone, Debug)]
pub struct BudgetNew {
    pub name: String,
    pub target: Decimal,
    pub cycle: BudgetCycle,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub category_id: String,
}

/// Partial edit of a budget. The category moves through
/// [`Engine::change_budget_category`] instead.
#[derive(Clone, Debug, Default)]
pub struct BudgetPatch {
    pub name: Option<String>,
    pub target: Option<Decimal>,
    pub cycle: Option<BudgetCycle>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Budget state recomputed from the stored expenses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BudgetProgress {
    pub budget: Budget,
    pub spent: Decimal,
    /// `spent / target` as a rounded percentage, capped at 100.
    pub percentage: u32,
    pub category_name: Option<String>,
    pub remaining_days: i64,
}

impl From<BudgetProgress> for api_types::budget::BudgetProgress {
    fn from(progress: BudgetProgress) -> Self {
        let budget = progress.budget;
        Self {
            uid: budget.uid,
            name: budget.name,
            current_amount: progress.spent.normalize().to_string(),
            target: budget.target.normalize().to_string(),
            percentage: progress.percentage,
            start_date: budget.start_date,
            end_date: budget.end_date,
            cycle: budget.cycle,
            category_name: progress.category_name,
            remaining_days: progress.remaining_days,
        }
    }
}

fn validate_name(name: &str) -> ResultEngine<String> {
    let name = normalize_required_name(name, "budget")?;
    if name.chars().count() > MAX_NAME_LEN {
        return Err(EngineError::InvalidName(format!(
            "budget name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name)
}

fn validate_target(target: Decimal) -> ResultEngine<()> {
    if target <= Decimal::ZERO {
        return Err(EngineError::InvalidAmount(
            "target must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_window(
    cycle: BudgetCycle,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> ResultEngine<()> {
    if cycle == BudgetCycle::Custom && end.is_none() {
        return Err(EngineError::InvalidBudget(
            "End date is required for custom cycle budgets".to_string(),
        ));
    }
    if let Some(end) = end
        && end <= start
    {
        return Err(EngineError::InvalidBudget(
            "End date must be after start date".to_string(),
        ));
    }
    Ok(())
}

/// `min(100, round(spent / target * 100))`, never negative. A ratio too
/// large for [`Decimal`] is far past the target and reads as 100.
fn percentage(spent: Decimal, target: Decimal) -> u32 {
    if target <= Decimal::ZERO || spent <= Decimal::ZERO {
        return 0;
    }
    spent
        .checked_div(target)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map_or(100, |ratio| {
            ratio
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_u32()
                .unwrap_or(u32::MAX)
                .min(100)
        })
}

impl Engine {
    /// Create a budget for one category. A user has at most one live budget
    /// per category. `current_amount` starts at zero.
    pub async fn create_budget(&self, user_id: &str, new: BudgetNew) -> ResultEngine<Budget> {
        let name = validate_name(&new.name)?;
        validate_target(new.target)?;
        validate_window(new.cycle, new.start_date, new.end_date)?;

        with_tx!(self, |db_tx| {
            Self::require_category(&db_tx, user_id, &new.category_id).await?;
            Self::ensure_category_free(&db_tx, user_id, &new.category_id, None).await?;

            let now = Utc::now();
            let budget = Budget {
                uid: uid(BUDGET_PREFIX),
                user_id: user_id.to_string(),
                name,
                current_amount: Decimal::ZERO,
                target: new.target,
                cycle: new.cycle,
                start_date: new.start_date,
                end_date: new.end_date,
                is_deleted: false,
                created_at: now,
                updated_at: now,
                category_id: new.category_id,
            };
            budgets::ActiveModel::from(&budget).insert(&db_tx).await?;
            info!(user_id, uid = %budget.uid, "budget created");
            Ok(budget)
        })
    }

    pub async fn update_budget(
        &self,
        uid: &str,
        user_id: &str,
        patch: BudgetPatch,
    ) -> ResultEngine<Budget> {
        with_tx!(self, |db_tx| {
            let mut budget = Budget::try_from(Self::require_budget(&db_tx, uid, user_id).await?)?;

            if let Some(name) = patch.name.as_deref() {
                budget.name = validate_name(name)?;
            }
            if let Some(target) = patch.target {
                validate_target(target)?;
                budget.target = target;
            }
            if let Some(cycle) = patch.cycle {
                budget.cycle = cycle;
            }
            if let Some(start) = patch.start_date {
                budget.start_date = start;
            }
            if patch.end_date.is_some() {
                budget.end_date = patch.end_date;
            }
            validate_window(budget.cycle, budget.start_date, budget.end_date)?;
            budget.updated_at = Utc::now();

            budgets::ActiveModel::from(&budget).update(&db_tx).await?;
            Ok(budget)
        })
    }

    /// Soft-delete a budget.
    pub async fn delete_budget(&self, uid: &str, user_id: &str) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let mut budget = Budget::try_from(Self::require_budget(&db_tx, uid, user_id).await?)?;
            budget.is_deleted = true;
            budget.updated_at = Utc::now();
            budgets::ActiveModel::from(&budget).update(&db_tx).await?;
            Ok(())
        })
    }

    pub async fn find_budget(&self, uid: &str, user_id: &str) -> ResultEngine<Budget> {
        Budget::try_from(Self::require_budget(&self.database, uid, user_id).await?)
    }

    /// Live budgets of `user_id`, newest first.
    pub async fn list_budgets(&self, user_id: &str) -> ResultEngine<Vec<Budget>> {
        let models = budgets::Entity::find()
            .filter(budgets::Column::UserId.eq(user_id))
            .filter(budgets::Column::IsDeleted.eq(false))
            .order_by_desc(budgets::Column::CreatedAt)
            .order_by_desc(budgets::Column::Uid)
            .all(&self.database)
            .await?;
        to_budgets(models)
    }

    /// Recompute what the budget's category spent from the first day of the
    /// cycle up to `now` (or the cycle end when it is already over).
    pub async fn budget_progress(
        &self,
        uid: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> ResultEngine<BudgetProgress> {
        let budget = self.find_budget(uid, user_id).await?;
        let cycle_end = budget.cycle_end();

        let spent =
            Self::spent_in_window(&self.database, &budget, &budget.category_id, now).await?;
        let category_name = categories::Entity::find_by_id(budget.category_id.clone())
            .one(&self.database)
            .await?
            .map(|model| model.name);
        let remaining_days = if now < cycle_end {
            (cycle_end - now).num_days()
        } else {
            0
        };

        Ok(BudgetProgress {
            percentage: percentage(spent, budget.target),
            spent,
            category_name,
            remaining_days,
            budget,
        })
    }

    /// Move a budget to another category and decide what happens to
    /// `current_amount`.
    pub async fn change_budget_category(
        &self,
        uid: &str,
        user_id: &str,
        category_id: &str,
        option: MigrateAmountOption,
        now: DateTime<Utc>,
    ) -> ResultEngine<Budget> {
        with_tx!(self, |db_tx| {
            let mut budget = Budget::try_from(Self::require_budget(&db_tx, uid, user_id).await?)?;
            Self::require_category(&db_tx, user_id, category_id).await?;
            Self::ensure_category_free(&db_tx, user_id, category_id, Some(uid)).await?;

            match option {
                MigrateAmountOption::DoNothing => {}
                MigrateAmountOption::ResetToZero => budget.current_amount = Decimal::ZERO,
                MigrateAmountOption::NewCategoryData => {
                    budget.current_amount =
                        Self::spent_in_window(&db_tx, &budget, category_id, now).await?;
                }
            }
            budget.category_id = category_id.to_string();
            budget.updated_at = Utc::now();

            budgets::ActiveModel::from(&budget).update(&db_tx).await?;
            info!(uid, category_id, ?option, "budget category changed");
            Ok(budget)
        })
    }

    /// Sum of the live expenses of `category_id` dated in
    /// `[start, min(now, cycle_end)]`.
    async fn spent_in_window<C: ConnectionTrait>(
        db: &C,
        budget: &Budget,
        category_id: &str,
        now: DateTime<Utc>,
    ) -> ResultEngine<Decimal> {
        let upper = now.min(budget.cycle_end());
        let models = transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(budget.user_id.as_str()))
            .filter(transactions::Column::CategoryId.eq(category_id))
            .filter(transactions::Column::IsDeleted.eq(false))
            .filter(transactions::Column::Kind.eq(TransactionType::Expense.as_str()))
            .filter(transactions::Column::TransactionDate.gte(budget.start_date))
            .filter(transactions::Column::TransactionDate.lte(upper))
            .all(db)
            .await?;
        checked_sum(
            to_transactions(models)?
                .iter()
                .map(|transaction| transaction.amount),
            "spent",
        )
    }

    async fn ensure_category_free<C: ConnectionTrait>(
        db: &C,
        user_id: &str,
        category_id: &str,
        except_uid: Option<&str>,
    ) -> ResultEngine<()> {
        let mut query = budgets::Entity::find()
            .filter(budgets::Column::UserId.eq(user_id))
            .filter(budgets::Column::CategoryId.eq(category_id))
            .filter(budgets::Column::IsDeleted.eq(false));
        if let Some(uid) = except_uid {
            query = query.filter(budgets::Column::Uid.ne(uid));
        }
        if query.one(db).await?.is_some() {
            return Err(EngineError::ExistingKey(
                "Budget for this category already exists".to_string(),
            ));
        }
        Ok(())
    }

    async fn require_budget<C: ConnectionTrait>(
        db: &C,
        uid: &str,
        user_id: &str,
    ) -> ResultEngine<budgets::Model> {
        let model = budgets::Entity::find_by_id(uid.to_string())
            .filter(budgets::Column::IsDeleted.eq(false))
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(uid.to_string()))?;
        if model.user_id != user_id {
            return Err(EngineError::Forbidden(
                "You do not have permission to access this budget".to_string(),
            ));
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_rounds_and_caps() {
        assert_eq!(percentage(Decimal::from(200), Decimal::from(1000)), 20);
        assert_eq!(percentage(Decimal::new(1005, 1), Decimal::from(1000)), 10);
        assert_eq!(percentage(Decimal::from(5), Decimal::from(1000)), 1);
        assert_eq!(percentage(Decimal::from(2500), Decimal::from(1000)), 100);
        assert_eq!(percentage(Decimal::from(-10), Decimal::from(1000)), 0);
    }

    #[test]
    fn percentage_of_tiny_target_is_full() {
        let tiny = Decimal::new(1, 10);
        assert_eq!(percentage(Decimal::from_i128_with_scale(100_000_000_000_000_000_000, 0), tiny), 100);
        assert_eq!(percentage(Decimal::MAX, Decimal::new(1, 28)), 100);
    }

    #[test]
    fn custom_cycle_requires_end() {
        let start = Utc::now();
        assert_eq!(
            validate_window(BudgetCycle::Custom, start, None),
            Err(EngineError::InvalidBudget(
                "End date is required for custom cycle budgets".to_string()
            ))
        );
        assert!(validate_window(BudgetCycle::Monthly, start, None).is_ok());
        assert!(validate_window(BudgetCycle::Custom, start, Some(start)).is_err());
    }
}
