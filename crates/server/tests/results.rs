use std::sync::Arc;

use api_types::TransactionType;
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{Engine, TransactionFilter};
use migration::MigratorTrait;
use queue::{Consumer, Delivery, ExtractedTransaction, ExtractionResult};
use server::ResultRecorder;
use storage::{MemoryStore, ObjectStore};

async fn setup() -> (Arc<Engine>, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db.execute(Statement::from_sql_and_values(
        db.get_database_backend(),
        "INSERT INTO users (username, password) VALUES (?, ?)",
        vec!["alice".into(), "pw".into()],
    ))
    .await
    .unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (Arc::new(engine), db)
}

async fn staged_store(batch_id: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for image in ["1.png", "2.png"] {
        store
            .put(
                &format!("transactions/alice/{batch_id}/{image}"),
                vec![1, 2, 3],
                "image/png",
            )
            .await
            .unwrap();
    }
    store
        .put("transactions/alice/other/1.png", vec![1], "image/png")
        .await
        .unwrap();
    store
}

fn coffee() -> ExtractedTransaction {
    ExtractedTransaction {
        amount: Decimal::from(65),
        name: "Coffee".to_string(),
        source: None,
        bank_name: None,
        receiver: Some("Cafe".to_string()),
        currency: "THB".to_string(),
        kind: TransactionType::Expense,
        notes: None,
        transaction_date: "2024-01-15T08:00:00Z".to_string(),
        category: Some("food-drink".to_string()),
    }
}

#[tokio::test]
async fn result_cleans_batch_and_stores_transactions() {
    let (engine, db) = setup().await;
    let store = staged_store("b1").await;
    let recorder = Arc::new(ResultRecorder::new(engine.clone(), store.clone()));

    let id = queue::publish(
        &db,
        &ExtractionResult {
            user_id: "alice".to_string(),
            batch_id: "b1".to_string(),
            transactions: vec![coffee()],
        },
    )
    .await
    .unwrap();
    let consumer: Consumer<ExtractionResult, _> = Consumer::new(db.clone(), recorder);
    assert_eq!(consumer.process_next().await.unwrap(), Delivery::Acked(id));

    assert_eq!(
        store.list("transactions/alice").await.unwrap(),
        vec!["transactions/alice/other/1.png"]
    );
    let stored = engine
        .list_transactions("alice", None, None, &TransactionFilter::default())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "Coffee");
    assert!(stored[0].category_id.is_some());
}

#[tokio::test]
async fn empty_result_still_cleans_batch() {
    let (engine, db) = setup().await;
    let store = staged_store("b2").await;
    let recorder = Arc::new(ResultRecorder::new(engine.clone(), store.clone()));

    queue::publish(
        &db,
        &ExtractionResult {
            user_id: "alice".to_string(),
            batch_id: "b2".to_string(),
            transactions: Vec::new(),
        },
    )
    .await
    .unwrap();
    Consumer::<ExtractionResult, _>::new(db.clone(), recorder)
        .process_next()
        .await
        .unwrap();

    assert_eq!(store.len().await, 1);
    assert!(
        engine
            .list_transactions("alice", None, None, &TransactionFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
}
