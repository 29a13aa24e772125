//! Category registry: global defaults (`user_id` is null) plus the categories
//! each user adds.

use api_types::{TransactionType, category::CategoryView};
use sea_orm::{ActiveValue, entity::prelude::*};

use crate::{EngineError, ResultEngine};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Category {
    pub uid: String,
    pub name: String,
    pub slug: String,
    pub kind: TransactionType,
    pub user_id: Option<String>,
}

impl Category {
    pub fn is_global(&self) -> bool {
        self.user_id.is_none()
    }

    /// Whether `user_id` may see and use this category.
    pub fn visible_to(&self, user_id: &str) -> bool {
        self.user_id.as_deref().is_none_or(|owner| owner == user_id)
    }
}

impl From<Category> for CategoryView {
    fn from(category: Category) -> Self {
        Self {
            uid: category.uid,
            name: category.name,
            slug: category.slug,
            kind: category.kind,
            user_id: category.user_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub uid: String,
    pub name: String,
    pub slug: String,
    #[sea_orm(column_name = "type")]
    pub kind: String,
    pub user_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
    #[sea_orm(has_many = "super::budgets::Entity")]
    Budgets,
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl Related<super::budgets::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Budgets.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Category> for ActiveModel {
    fn from(category: &Category) -> Self {
        Self {
            uid: ActiveValue::Set(category.uid.clone()),
            name: ActiveValue::Set(category.name.clone()),
            slug: ActiveValue::Set(category.slug.clone()),
            kind: ActiveValue::Set(category.kind.as_str().to_string()),
            user_id: ActiveValue::Set(category.user_id.clone()),
        }
    }
}

impl TryFrom<Model> for Category {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: TransactionType::try_from(model.kind.as_str())
                .map_err(EngineError::InvalidName)?,
            uid: model.uid,
            name: model.name,
            slug: model.slug,
            user_id: model.user_id,
        })
    }
}

pub(crate) fn to_categories(models: Vec<Model>) -> ResultEngine<Vec<Category>> {
    models.into_iter().map(Category::try_from).collect()
}
