use chrono::Utc;
use sea_orm::{ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use tracing::{debug, info};

use crate::{
    EngineError, ResultEngine, Tag, tags, transaction_tags,
    util::{TAG_PREFIX, normalize_required_name, uid},
};

use super::{Engine, with_tx};

const MAX_NAME_LEN: usize = 50;

fn validate_name(name: &str) -> ResultEngine<String> {
    let name = normalize_required_name(name, "tag")?;
    if name.chars().count() > MAX_NAME_LEN {
        return Err(EngineError::InvalidName(format!(
            "tag name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name)
}

impl Engine {
    /// Create a tag. Names are unique among the user's live tags.
    pub async fn create_tag(&self, user_id: &str, name: &str) -> ResultEngine<Tag> {
        let name = validate_name(name)?;
        with_tx!(self, |db_tx| {
            if Self::tag_by_name(&db_tx, user_id, &name).await?.is_some() {
                return Err(EngineError::ExistingKey(
                    "Tag with this name already exists".to_string(),
                ));
            }
            Self::insert_tag(&db_tx, user_id, name).await
        })
    }

    /// Live tags of `user_id` sorted by name.
    pub async fn list_tags(&self, user_id: &str) -> ResultEngine<Vec<Tag>> {
        let models = tags::Entity::find()
            .filter(tags::Column::UserId.eq(user_id))
            .filter(tags::Column::IsDeleted.eq(false))
            .order_by_asc(tags::Column::Name)
            .all(&self.database)
            .await?;
        Ok(models.into_iter().map(Tag::from).collect())
    }

    pub async fn find_tag(&self, uid: &str, user_id: &str) -> ResultEngine<Tag> {
        Ok(Self::require_tag(&self.database, uid, user_id).await?.into())
    }

    pub async fn rename_tag(&self, uid: &str, user_id: &str, name: &str) -> ResultEngine<Tag> {
        let name = validate_name(name)?;
        with_tx!(self, |db_tx| {
            let mut tag = Tag::from(Self::require_tag(&db_tx, uid, user_id).await?);
            if Self::tag_by_name(&db_tx, user_id, &name)
                .await?
                .is_some_and(|other| other.uid != tag.uid)
            {
                return Err(EngineError::ExistingKey(
                    "Tag with this name already exists".to_string(),
                ));
            }
            tag.name = name;
            tag.updated_at = Utc::now();
            tags::ActiveModel::from(&tag).update(&db_tx).await?;
            Ok(tag)
        })
    }

    /// Soft-delete a tag and unlink it from every transaction.
    pub async fn delete_tag(&self, uid: &str, user_id: &str) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let mut tag = Tag::from(Self::require_tag(&db_tx, uid, user_id).await?);
            tag.is_deleted = true;
            tag.updated_at = Utc::now();
            tags::ActiveModel::from(&tag).update(&db_tx).await?;

            let unlinked = transaction_tags::Entity::delete_many()
                .filter(transaction_tags::Column::TagId.eq(uid))
                .exec(&db_tx)
                .await?
                .rows_affected;
            info!(user_id, uid, unlinked, "tag deleted");
            Ok(())
        })
    }

    /// Attach the tag called `name` to a transaction, creating the tag when
    /// the user has none by that name. Attaching twice is a no-op.
    pub async fn tag_transaction(
        &self,
        transaction_uid: &str,
        user_id: &str,
        name: &str,
    ) -> ResultEngine<Tag> {
        let name = validate_name(name)?;
        with_tx!(self, |db_tx| {
            Self::require_transaction(&db_tx, transaction_uid, user_id).await?;
            let tag = match Self::tag_by_name(&db_tx, user_id, &name).await? {
                Some(model) => Tag::from(model),
                None => Self::insert_tag(&db_tx, user_id, name).await?,
            };

            let linked = transaction_tags::Entity::find_by_id((
                transaction_uid.to_string(),
                tag.uid.clone(),
            ))
            .one(&db_tx)
            .await?;
            if linked.is_none() {
                transaction_tags::Entity::insert(transaction_tags::ActiveModel {
                    transaction_id: ActiveValue::Set(transaction_uid.to_string()),
                    tag_id: ActiveValue::Set(tag.uid.clone()),
                })
                .exec_without_returning(&db_tx)
                .await?;
                debug!(transaction_uid, tag = %tag.uid, "tag attached");
            }
            Ok(tag)
        })
    }

    /// Remove one tag from a transaction. Removing a tag that is not attached
    /// is a no-op.
    pub async fn untag_transaction(
        &self,
        transaction_uid: &str,
        tag_uid: &str,
        user_id: &str,
    ) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            Self::require_transaction(&db_tx, transaction_uid, user_id).await?;
            Self::require_tag(&db_tx, tag_uid, user_id).await?;
            transaction_tags::Entity::delete_many()
                .filter(transaction_tags::Column::TransactionId.eq(transaction_uid))
                .filter(transaction_tags::Column::TagId.eq(tag_uid))
                .exec(&db_tx)
                .await?;
            Ok(())
        })
    }

    /// Live tags attached to a transaction, sorted by name.
    pub async fn transaction_tags(
        &self,
        transaction_uid: &str,
        user_id: &str,
    ) -> ResultEngine<Vec<Tag>> {
        Self::require_transaction(&self.database, transaction_uid, user_id).await?;
        let tag_ids: Vec<String> = transaction_tags::Entity::find()
            .filter(transaction_tags::Column::TransactionId.eq(transaction_uid))
            .all(&self.database)
            .await?
            .into_iter()
            .map(|link| link.tag_id)
            .collect();
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }

        let models = tags::Entity::find()
            .filter(tags::Column::Uid.is_in(tag_ids))
            .filter(tags::Column::IsDeleted.eq(false))
            .order_by_asc(tags::Column::Name)
            .all(&self.database)
            .await?;
        Ok(models.into_iter().map(Tag::from).collect())
    }

    async fn insert_tag<C: ConnectionTrait>(
        db: &C,
        user_id: &str,
        name: String,
    ) -> ResultEngine<Tag> {
        let now = Utc::now();
        let tag = Tag {
            uid: uid(TAG_PREFIX),
            user_id: user_id.to_string(),
            name,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        tags::ActiveModel::from(&tag).insert(db).await?;
        info!(user_id, uid = %tag.uid, "tag created");
        Ok(tag)
    }

    async fn tag_by_name<C: ConnectionTrait>(
        db: &C,
        user_id: &str,
        name: &str,
    ) -> ResultEngine<Option<tags::Model>> {
        Ok(tags::Entity::find()
            .filter(tags::Column::UserId.eq(user_id))
            .filter(tags::Column::Name.eq(name))
            .filter(tags::Column::IsDeleted.eq(false))
            .one(db)
            .await?)
    }

    async fn require_tag<C: ConnectionTrait>(
        db: &C,
        uid: &str,
        user_id: &str,
    ) -> ResultEngine<tags::Model> {
        let model = tags::Entity::find_by_id(uid.to_string())
            .filter(tags::Column::IsDeleted.eq(false))
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(uid.to_string()))?;
        if model.user_id != user_id {
            return Err(EngineError::Forbidden(
                "You do not have permission to access this tag".to_string(),
            ));
        }
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_are_trimmed_and_bounded() {
        assert_eq!(validate_name("  groceries ").unwrap(), "groceries");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN)).is_ok());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }
}
