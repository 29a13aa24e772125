use api_types::{TransactionType, category::slugify};
use sea_orm::{
    Condition, ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
};
use tracing::info;

use crate::{
    Category, EngineError, ResultEngine, categories,
    categories::to_categories,
    util::{CATEGORY_PREFIX, normalize_required_name, uid},
};

use super::{Engine, with_tx};

/// Categories owned by `user_id` or shared by everyone.
fn visible_to(user_id: &str) -> Condition {
    Condition::any()
        .add(categories::Column::UserId.eq(user_id))
        .add(categories::Column::UserId.is_null())
}

impl Engine {
    /// Add a category for `user_id`. The slug must not clash with one the
    /// user can already see.
    pub async fn create_category(
        &self,
        user_id: &str,
        name: &str,
        kind: TransactionType,
    ) -> ResultEngine<Category> {
        let name = normalize_required_name(name, "category")?;
        let slug = slugify(&name);
        if slug.is_empty() {
            return Err(EngineError::InvalidName(format!(
                "category name '{name}' has no letters or digits"
            )));
        }

        with_tx!(self, |db_tx| {
            if Self::category_by_slug(&db_tx, user_id, &slug)
                .await?
                .is_some()
            {
                return Err(EngineError::ExistingKey(
                    "Category already exists".to_string(),
                ));
            }

            let category = Category {
                uid: uid(CATEGORY_PREFIX),
                name,
                slug,
                kind,
                user_id: Some(user_id.to_string()),
            };
            categories::ActiveModel::from(&category)
                .insert(&db_tx)
                .await?;
            info!(user_id, slug = %category.slug, "category created");
            Ok(category)
        })
    }

    /// The user's categories followed by the global defaults, optionally
    /// restricted to one type.
    pub async fn list_categories(
        &self,
        user_id: &str,
        kind: Option<TransactionType>,
    ) -> ResultEngine<Vec<Category>> {
        let mut query = categories::Entity::find().filter(visible_to(user_id));
        if let Some(kind) = kind {
            query = query.filter(categories::Column::Kind.eq(kind.as_str()));
        }
        let models = query
            .order_by_desc(categories::Column::UserId)
            .order_by_asc(categories::Column::Name)
            .all(&self.database)
            .await?;
        to_categories(models)
    }

    /// Resolve a slug for `user_id`: the user's own category wins over the
    /// global one with the same slug.
    pub async fn find_category_by_slug(
        &self,
        user_id: &str,
        slug: &str,
    ) -> ResultEngine<Option<Category>> {
        Self::category_by_slug(&self.database, user_id, slug)
            .await?
            .map(Category::try_from)
            .transpose()
    }

    pub(super) async fn category_by_slug<C: ConnectionTrait>(
        db: &C,
        user_id: &str,
        slug: &str,
    ) -> ResultEngine<Option<categories::Model>> {
        let mut candidates = categories::Entity::find()
            .filter(categories::Column::Slug.eq(slug))
            .filter(visible_to(user_id))
            .all(db)
            .await?;
        candidates.sort_by_key(|model| model.user_id.is_none());
        Ok(candidates.into_iter().next())
    }

    /// Load a category `user_id` may attach to its records.
    pub(super) async fn require_category<C: ConnectionTrait>(
        db: &C,
        user_id: &str,
        category_id: &str,
    ) -> ResultEngine<categories::Model> {
        let model = categories::Entity::find_by_id(category_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(category_id.to_string()))?;
        if model
            .user_id
            .as_deref()
            .is_some_and(|owner| owner != user_id)
        {
            return Err(EngineError::Forbidden(
                "category belongs to another user".to_string(),
            ));
        }
        Ok(model)
    }
}
