//! Budgets: a spending target for one category over a cycle window.

use api_types::budget::{BudgetCycle, BudgetView};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveValue, entity::prelude::*};

use crate::{
    EngineError, ResultEngine, cycle,
    util::{amount_text, parse_amount},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Budget {
    pub uid: String,
    pub user_id: String,
    pub name: String,
    /// Running sum of the in-cycle expenses, maintained by budget-update events.
    pub current_amount: Decimal,
    pub target: Decimal,
    pub cycle: BudgetCycle,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category_id: String,
}

impl Budget {
    pub fn cycle_end(&self) -> DateTime<Utc> {
        cycle::cycle_end(self.cycle, self.start_date, self.end_date)
    }

    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        cycle::is_in_cycle(date, self.cycle, self.start_date, self.end_date)
    }
}

impl From<Budget> for BudgetView {
    fn from(budget: Budget) -> Self {
        Self {
            uid: budget.uid,
            name: budget.name,
            current_amount: amount_text(budget.current_amount),
            target: amount_text(budget.target),
            cycle: budget.cycle,
            start_date: budget.start_date,
            end_date: budget.end_date,
            category_id: budget.category_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "budgets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub uid: String,
    pub user_id: String,
    pub name: String,
    pub current_amount: String,
    pub target: String,
    pub cycle: String,
    pub start_date: DateTimeUtc,
    pub end_date: Option<DateTimeUtc>,
    pub is_deleted: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub category_id: String,
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

impl From<&Budget> for ActiveModel {
    fn from(budget: &Budget) -> Self {
        Self {
            uid: ActiveValue::Set(budget.uid.clone()),
            user_id: ActiveValue::Set(budget.user_id.clone()),
            name: ActiveValue::Set(budget.name.clone()),
            current_amount: ActiveValue::Set(amount_text(budget.current_amount)),
            target: ActiveValue::Set(amount_text(budget.target)),
            cycle: ActiveValue::Set(budget.cycle.as_str().to_string()),
            start_date: ActiveValue::Set(budget.start_date),
            end_date: ActiveValue::Set(budget.end_date),
            is_deleted: ActiveValue::Set(budget.is_deleted),
            created_at: ActiveValue::Set(budget.created_at),
            updated_at: ActiveValue::Set(budget.updated_at),
            category_id: ActiveValue::Set(budget.category_id.clone()),
        }
    }
}

impl TryFrom<Model> for Budget {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            current_amount: parse_amount(&model.current_amount, "current amount")?,
            target: parse_amount(&model.target, "target")?,
            cycle: BudgetCycle::try_from(model.cycle.as_str()).map_err(EngineError::InvalidBudget)?,
            uid: model.uid,
            user_id: model.user_id,
            name: model.name,
            start_date: model.start_date,
            end_date: model.end_date,
            is_deleted: model.is_deleted,
            created_at: model.created_at,
            updated_at: model.updated_at,
            category_id: model.category_id,
        })
    }
}

pub(crate) fn to_budgets(models: Vec<Model>) -> ResultEngine<Vec<Budget>> {
    models.into_iter().map(Budget::try_from).collect()
}
