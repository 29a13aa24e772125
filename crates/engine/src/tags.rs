//! Tags: user-owned labels, linked to transactions through `transaction_tags`.

use api_types::tag::TagView;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub uid: String,
    pub user_id: String,
    pub name: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Tag> for TagView {
    fn from(tag: Tag) -> Self {
        Self {
            uid: tag.uid,
            name: tag.name,
            user_id: tag.user_id,
            created_at: tag.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tags")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub uid: String,
    pub user_id: String,
    pub name: String,
    pub is_deleted: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transaction_tags::Entity")]
    TransactionTags,
}

impl Related<super::transaction_tags::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TransactionTags.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Tag> for ActiveModel {
    fn from(tag: &Tag) -> Self {
        Self {
            uid: ActiveValue::Set(tag.uid.clone()),
            user_id: ActiveValue::Set(tag.user_id.clone()),
            name: ActiveValue::Set(tag.name.clone()),
            is_deleted: ActiveValue::Set(tag.is_deleted),
            created_at: ActiveValue::Set(tag.created_at),
            updated_at: ActiveValue::Set(tag.updated_at),
        }
    }
}

impl From<Model> for Tag {
    fn from(model: Model) -> Self {
        Self {
            uid: model.uid,
            user_id: model.user_id,
            name: model.name,
            is_deleted: model.is_deleted,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
