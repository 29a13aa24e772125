use std::sync::Arc;

use api_types::TransactionType;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, QueryFilter, QueryOrder, Statement, prelude::*,
};

use engine::{
    Engine, EngineError, INVALID_TRANSACTION_NAME, TransactionFilter, TransactionNew,
    TransactionPatch,
};
use migration::MigratorTrait;
use queue::{
    BUDGET_UPDATE_QUEUE, BudgetAction, BudgetUpdate, ExtractedTransaction, ExtractionResult,
    entity,
};

async fn engine_with_db() -> (Arc<Engine>, DatabaseConnection) {
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
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (Arc::new(engine), db)
}

async fn budget_events(db: &DatabaseConnection) -> Vec<BudgetUpdate> {
    entity::Entity::find()
        .filter(entity::Column::Queue.eq(BUDGET_UPDATE_QUEUE))
        .order_by_asc(entity::Column::Id)
        .all(db)
        .await
        .unwrap()
        .into_iter()
        .map(|model| serde_json::from_str(&model.payload).unwrap())
        .collect()
}

async fn global_category(engine: &Engine, slug: &str) -> String {
    engine
        .find_category_by_slug("alice", slug)
        .await
        .unwrap()
        .unwrap()
        .uid
}

fn record(name: &str, amount: i64, category: Option<&str>) -> ExtractedTransaction {
    ExtractedTransaction {
        amount: Decimal::from(amount),
        name: name.to_string(),
        source: None,
        bank_name: None,
        receiver: Some("Shop".to_string()),
        currency: "THB".to_string(),
        kind: TransactionType::Expense,
        notes: None,
        transaction_date: "2024-01-15T09:00:00Z".to_string(),
        category: category.map(ToString::to_string),
    }
}

fn expense(name: &str, amount: i64, category_id: Option<String>) -> TransactionNew {
    TransactionNew {
        name: name.to_string(),
        amount: Decimal::from(amount),
        currency: None,
        kind: TransactionType::Expense,
        source: None,
        bank_name: None,
        receiver: None,
        notes: None,
        transaction_date: Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
        category_id,
    }
}

#[tokio::test]
async fn extracted_records_resolve_slugs_and_emit_budget_events() {
    let (engine, db) = engine_with_db().await;
    let food = global_category(&engine, "food-drink").await;

    let result = ExtractionResult {
        user_id: "alice".to_string(),
        batch_id: "batch-1".to_string(),
        transactions: vec![
            record("Noodles", 120, Some("food-drink")),
            record("Mystery", 50, Some("not-a-category")),
            record(INVALID_TRANSACTION_NAME, 0, None),
        ],
    };
    let created = engine.record_extracted(&result).await.unwrap();

    assert_eq!(created.len(), 2);
    assert_eq!(created[0].category_id.as_deref(), Some(food.as_str()));
    assert_eq!(created[0].currency, "THB");
    assert_eq!(created[1].category_id, None);
    assert!(created.iter().all(|tx| tx.uid.starts_with("txn_")));

    let events = budget_events(&db).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].uid, created[0].uid);
    assert_eq!(events[0].category_id.as_deref(), Some(food.as_str()));
    assert_eq!(events[0].action_type, BudgetAction::Add);
    assert_eq!(events[0].amount, Decimal::from(120));
}

#[tokio::test]
async fn user_category_wins_over_global_slug() {
    let (engine, _db) = engine_with_db().await;
    let own = engine
        .create_category("bob", "Café", TransactionType::Expense)
        .await
        .unwrap();

    let result = ExtractionResult {
        user_id: "bob".to_string(),
        batch_id: "b".to_string(),
        transactions: vec![record("Latte", 90, Some("cafe"))],
    };
    let created = engine.record_extracted(&result).await.unwrap();
    assert_eq!(created[0].category_id.as_deref(), Some(own.uid.as_str()));

    // alice cannot see bob's category
    let result = ExtractionResult {
        user_id: "alice".to_string(),
        ..result
    };
    let created = engine.record_extracted(&result).await.unwrap();
    assert_eq!(created[0].category_id, None);
}

#[tokio::test]
async fn empty_result_stores_nothing() {
    let (engine, db) = engine_with_db().await;
    let result = ExtractionResult {
        user_id: "alice".to_string(),
        batch_id: "b".to_string(),
        transactions: Vec::new(),
    };
    assert!(engine.record_extracted(&result).await.unwrap().is_empty());
    assert!(budget_events(&db).await.is_empty());
}

#[tokio::test]
async fn income_and_uncategorized_expenses_emit_nothing() {
    let (engine, db) = engine_with_db().await;
    let salary = global_category(&engine, "salary").await;

    let mut income = expense("Payroll", 30000, Some(salary));
    income.kind = TransactionType::Income;
    engine.create_transaction("alice", income).await.unwrap();
    engine
        .create_transaction("alice", expense("Cash", 10, None))
        .await
        .unwrap();

    assert!(budget_events(&db).await.is_empty());
}

#[tokio::test]
async fn find_checks_owner() {
    let (engine, _db) = engine_with_db().await;
    let tx = engine
        .create_transaction("alice", expense("Taxi", 80, None))
        .await
        .unwrap();

    let found = engine.find_transaction(&tx.uid, "alice").await.unwrap();
    assert_eq!(found.uid, tx.uid);
    assert_eq!(found.amount, Decimal::from(80));
    assert!(matches!(
        engine.find_transaction(&tx.uid, "bob").await,
        Err(EngineError::Forbidden(_))
    ));
    assert_eq!(
        engine.find_transaction("txn_missing", "alice").await,
        Err(EngineError::KeyNotFound("txn_missing".to_string()))
    );
}

#[tokio::test]
async fn reassigning_category_emits_subtract_then_add() {
    let (engine, db) = engine_with_db().await;
    let food = global_category(&engine, "food-drink").await;
    let shopping = global_category(&engine, "shopping").await;

    let tx = engine
        .create_transaction("alice", expense("Snacks", 200, Some(food.clone())))
        .await
        .unwrap();
    let updated = engine
        .update_transaction(
            &tx.uid,
            "alice",
            TransactionPatch {
                category_id: Some(Some(shopping.clone())),
                amount: Some(Decimal::from(250)),
                ..TransactionPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.category_id.as_deref(), Some(shopping.as_str()));

    let events = budget_events(&db).await;
    assert_eq!(events.len(), 3);
    assert_eq!(events[1].action_type, BudgetAction::Subtract);
    assert_eq!(events[1].category_id.as_deref(), Some(food.as_str()));
    assert_eq!(events[1].amount, Decimal::from(200));
    assert_eq!(events[2].action_type, BudgetAction::Add);
    assert_eq!(events[2].category_id.as_deref(), Some(shopping.as_str()));
    assert_eq!(events[2].amount, Decimal::from(250));
}

#[tokio::test]
async fn notes_only_edit_emits_nothing() {
    let (engine, db) = engine_with_db().await;
    let food = global_category(&engine, "food-drink").await;
    let tx = engine
        .create_transaction("alice", expense("Snacks", 200, Some(food)))
        .await
        .unwrap();

    engine
        .update_transaction(
            &tx.uid,
            "alice",
            TransactionPatch {
                notes: Some("with friends".to_string()),
                ..TransactionPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(budget_events(&db).await.len(), 1);
}

#[tokio::test]
async fn soft_delete_hides_and_subtracts() {
    let (engine, db) = engine_with_db().await;
    let food = global_category(&engine, "food-drink").await;
    let tx = engine
        .create_transaction("alice", expense("Lunch", 150, Some(food)))
        .await
        .unwrap();

    engine.delete_transaction(&tx.uid, "alice").await.unwrap();

    assert!(matches!(
        engine.find_transaction(&tx.uid, "alice").await,
        Err(EngineError::KeyNotFound(_))
    ));
    let events = budget_events(&db).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].action_type, BudgetAction::Subtract);
    assert!(
        engine
            .list_transactions("alice", None, None, &TransactionFilter::default())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn list_is_paged_newest_first() {
    let (engine, _db) = engine_with_db().await;
    for day in 1..=5 {
        let mut new = expense(&format!("day {day}"), day, None);
        new.transaction_date = Utc.with_ymd_and_hms(2024, 3, day as u32, 12, 0, 0).unwrap();
        engine.create_transaction("alice", new).await.unwrap();
    }
    engine
        .create_transaction("bob", expense("other user", 1, None))
        .await
        .unwrap();

    let filter = TransactionFilter::default();
    let first = engine
        .list_transactions("alice", Some(1), Some(2), &filter)
        .await
        .unwrap();
    let names: Vec<_> = first.iter().map(|tx| tx.name.as_str()).collect();
    assert_eq!(names, vec!["day 5", "day 4"]);

    let last = engine
        .list_transactions("alice", Some(3), Some(2), &filter)
        .await
        .unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].name, "day 1");

    let ranged = engine
        .list_transactions(
            "alice",
            None,
            None,
            &TransactionFilter {
                start: Some(Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()),
                end: Some(Utc.with_ymd_and_hms(2024, 3, 3, 23, 0, 0).unwrap()),
                ascending: true,
                ..TransactionFilter::default()
            },
        )
        .await
        .unwrap();
    let names: Vec<_> = ranged.iter().map(|tx| tx.name.as_str()).collect();
    assert_eq!(names, vec!["day 2", "day 3"]);
}

#[tokio::test]
async fn monthly_totals_split_by_type() {
    let (engine, _db) = engine_with_db().await;
    let mut salary = expense("Salary", 1000, None);
    salary.kind = TransactionType::Income;
    engine.create_transaction("alice", salary).await.unwrap();

    let mut coffee = expense("Coffee", 0, None);
    coffee.amount = Decimal::new(455, 1);
    engine.create_transaction("alice", coffee).await.unwrap();

    let mut february = expense("Later", 999, None);
    february.transaction_date = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    engine.create_transaction("alice", february).await.unwrap();

    let totals = engine
        .monthly_totals("alice", Utc.with_ymd_and_hms(2024, 1, 31, 23, 0, 0).unwrap())
        .await
        .unwrap();
    assert_eq!(totals.income, Decimal::from(1000));
    assert_eq!(totals.expense, Decimal::new(455, 1));
}

#[tokio::test]
async fn validation_errors() {
    let (engine, _db) = engine_with_db().await;
    assert!(matches!(
        engine
            .create_transaction("alice", expense("  ", 1, None))
            .await,
        Err(EngineError::InvalidName(_))
    ));
    assert!(matches!(
        engine
            .create_transaction("alice", expense("Refund?", -5, None))
            .await,
        Err(EngineError::InvalidAmount(_))
    ));
    assert!(matches!(
        engine
            .create_transaction("alice", expense("Ghost", 5, Some("cat_missing".to_string())))
            .await,
        Err(EngineError::KeyNotFound(_))
    ));
}
