use api_types::TransactionType;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, Database, Statement};

use engine::{Engine, EngineError, Transaction, TransactionNew};
use migration::MigratorTrait;

async fn engine() -> Engine {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let backend = db.get_database_backend();
    for user in ["alice", "bob"] {
        db.execute(Statement::from_sql_and_values(
            backend,
            "INSERT INTO users (username, password) VALUES (?, ?)",
            vec![user.into(), "password".into()],
        ))
        .await
        .unwrap();
    }
    Engine::builder().database(db).build().await.unwrap()
}

async fn lunch(engine: &Engine, user_id: &str) -> Transaction {
    engine
        .create_transaction(
            user_id,
            TransactionNew {
                name: "Lunch".to_string(),
                amount: Decimal::from(120),
                currency: None,
                kind: TransactionType::Expense,
                source: None,
                bank_name: None,
                receiver: None,
                notes: None,
                transaction_date: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
                category_id: None,
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn names_are_unique_per_user() {
    let engine = engine().await;
    let work = engine.create_tag("alice", "  work ").await.unwrap();
    assert!(work.uid.starts_with("tag_"));
    assert_eq!(work.name, "work");

    assert_eq!(
        engine.create_tag("alice", "work").await,
        Err(EngineError::ExistingKey(
            "Tag with this name already exists".to_string()
        ))
    );
    // another user may reuse the name
    engine.create_tag("bob", "work").await.unwrap();
    engine.create_tag("alice", "family").await.unwrap();

    let names: Vec<_> = engine
        .list_tags("alice")
        .await
        .unwrap()
        .into_iter()
        .map(|tag| tag.name)
        .collect();
    assert_eq!(names, vec!["family", "work"]);
}

#[tokio::test]
async fn rename_and_delete() {
    let engine = engine().await;
    let work = engine.create_tag("alice", "work").await.unwrap();
    engine.create_tag("alice", "trip").await.unwrap();

    assert_eq!(
        engine.rename_tag(&work.uid, "alice", "trip").await,
        Err(EngineError::ExistingKey(
            "Tag with this name already exists".to_string()
        ))
    );
    // keeping its own name is not a clash
    engine.rename_tag(&work.uid, "alice", "work").await.unwrap();
    let renamed = engine.rename_tag(&work.uid, "alice", "office").await.unwrap();
    assert_eq!(renamed.name, "office");
    assert_eq!(engine.find_tag(&work.uid, "alice").await.unwrap().name, "office");

    assert_eq!(
        engine.find_tag(&work.uid, "bob").await,
        Err(EngineError::Forbidden(
            "You do not have permission to access this tag".to_string()
        ))
    );
    assert!(matches!(
        engine.delete_tag(&work.uid, "bob").await,
        Err(EngineError::Forbidden(_))
    ));

    engine.delete_tag(&work.uid, "alice").await.unwrap();
    assert_eq!(
        engine.find_tag(&work.uid, "alice").await,
        Err(EngineError::KeyNotFound(work.uid.clone()))
    );
    assert_eq!(engine.list_tags("alice").await.unwrap().len(), 1);
    // the name is free again once the tag is gone
    engine.create_tag("alice", "office").await.unwrap();
}

#[tokio::test]
async fn attach_and_detach() {
    let engine = engine().await;
    let meal = lunch(&engine, "alice").await;
    let family = engine.create_tag("alice", "family").await.unwrap();

    let attached = engine
        .tag_transaction(&meal.uid, "alice", "family")
        .await
        .unwrap();
    assert_eq!(attached.uid, family.uid);
    // twice is a no-op, an unknown name creates the tag
    engine
        .tag_transaction(&meal.uid, "alice", "family")
        .await
        .unwrap();
    let weekend = engine
        .tag_transaction(&meal.uid, "alice", "weekend")
        .await
        .unwrap();
    assert_eq!(engine.list_tags("alice").await.unwrap().len(), 2);

    let tags = engine.transaction_tags(&meal.uid, "alice").await.unwrap();
    let names: Vec<_> = tags.iter().map(|tag| tag.name.as_str()).collect();
    assert_eq!(names, vec!["family", "weekend"]);

    engine
        .untag_transaction(&meal.uid, &family.uid, "alice")
        .await
        .unwrap();
    engine
        .untag_transaction(&meal.uid, &family.uid, "alice")
        .await
        .unwrap();
    let tags = engine.transaction_tags(&meal.uid, "alice").await.unwrap();
    let uids: Vec<_> = tags.iter().map(|tag| tag.uid.as_str()).collect();
    assert_eq!(uids, vec![weekend.uid.as_str()]);

    engine.delete_tag(&weekend.uid, "alice").await.unwrap();
    assert!(
        engine
            .transaction_tags(&meal.uid, "alice")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn tags_stay_with_their_owner() {
    let engine = engine().await;
    let meal = lunch(&engine, "alice").await;
    let bobs = engine.create_tag("bob", "shared").await.unwrap();

    assert!(matches!(
        engine.tag_transaction(&meal.uid, "bob", "shared").await,
        Err(EngineError::Forbidden(_))
    ));
    assert!(matches!(
        engine.transaction_tags(&meal.uid, "bob").await,
        Err(EngineError::Forbidden(_))
    ));

    // alice gets her own tag, never bob's
    let hers = engine
        .tag_transaction(&meal.uid, "alice", "shared")
        .await
        .unwrap();
    assert_ne!(hers.uid, bobs.uid);
    assert!(matches!(
        engine.untag_transaction(&meal.uid, &bobs.uid, "alice").await,
        Err(EngineError::Forbidden(_))
    ));

    engine.delete_transaction(&meal.uid, "alice").await.unwrap();
    assert_eq!(
        engine.transaction_tags(&meal.uid, "alice").await,
        Err(EngineError::KeyNotFound(meal.uid.clone()))
    );
}
