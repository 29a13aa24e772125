use api_types::category::{default_categories, slugify};
use sea_orm::ConnectionTrait;
use sea_orm_migration::prelude::*;
use uuid::Uuid;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Categories {
    Table,
    Uid,
    Name,
    Slug,
    Type,
    UserId,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        let backend = db.get_database_backend();

        for (name, kind) in default_categories() {
            let stmt = Query::insert()
                .into_table(Categories::Table)
                .columns([
                    Categories::Uid,
                    Categories::Name,
                    Categories::Slug,
                    Categories::Type,
                    Categories::UserId,
                ])
                .values([
                    format!("cat_{}", Uuid::now_v7()).into(),
                    name.into(),
                    slugify(name).into(),
                    kind.as_str().into(),
                    Option::<String>::None.into(),
                ])
                .map_err(|err| DbErr::Custom(err.to_string()))?
                .to_owned();
            db.execute(backend.build(&stmt)).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        let backend = db.get_database_backend();

        let stmt = Query::delete()
            .from_table(Categories::Table)
            .and_where(Expr::col(Categories::UserId).is_null())
            .to_owned();
        db.execute(backend.build(&stmt)).await?;
        Ok(())
    }
}
