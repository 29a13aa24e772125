//! Durable named queues stored in the `queue_messages` table.
//!
//! A message moves `pending -> processing -> acked | dropped`. Consumers claim
//! one message at a time with a conditional update, so two loops on the same
//! queue never handle the same row. A nacked message is never redelivered by
//! the pipeline; operators can move it back with [`requeue`].

use std::{marker::PhantomData, sync::Arc, time::Duration};

use chrono::Utc;
use sea_orm::{
    ActiveValue, ConnectionTrait, DatabaseConnection, QueryFilter, QueryOrder, prelude::*,
    sea_query::Expr,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use contracts::{
    BUDGET_UPDATE_QUEUE, BudgetAction, BudgetUpdate, DEFAULT_CURRENCY, EXTRACTION_QUEUE,
    ExtractedTransaction, ExtractionJob, ExtractionResult, JobImage, Message, RESULT_QUEUE,
    parse_transaction_date,
};
pub use error::QueueError;

mod contracts;
pub mod entity;
mod error;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageStatus {
    Pending,
    Processing,
    Acked,
    Dropped,
}

impl MessageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Acked => "acked",
            Self::Dropped => "dropped",
        }
    }
}

impl TryFrom<&str> for MessageStatus {
    type Error = QueueError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "acked" => Ok(Self::Acked),
            "dropped" => Ok(Self::Dropped),
            other => Err(QueueError::Validation(format!(
                "invalid message status: {other}"
            ))),
        }
    }
}

/// Validate and enqueue `message` on its queue.
///
/// Generic over the connection so callers can publish from inside an open
/// database transaction; the row becomes visible to consumers on commit.
pub async fn publish<C, M>(db: &C, message: &M) -> Result<i64, QueueError>
where
    C: ConnectionTrait,
    M: Message,
{
    message.validate()?;
    let payload = serde_json::to_string(message)?;
    let now = Utc::now();
    let active = entity::ActiveModel {
        id: ActiveValue::NotSet,
        queue: ActiveValue::Set(M::QUEUE.to_string()),
        payload: ActiveValue::Set(payload),
        status: ActiveValue::Set(MessageStatus::Pending.as_str().to_string()),
        error: ActiveValue::Set(None),
        attempts: ActiveValue::Set(0),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
    };
    let id = entity::Entity::insert(active).exec(db).await?.last_insert_id;
    debug!(queue = M::QUEUE, id, "message published");
    Ok(id)
}

/// Return every `processing` message of `queue` to `pending`.
///
/// Called when a consumer starts: a message claimed by a loop that died before
/// acknowledging is delivered again.
pub async fn recover_in_flight<C: ConnectionTrait>(db: &C, queue: &str) -> Result<u64, QueueError> {
    let result = entity::Entity::update_many()
        .col_expr(
            entity::Column::Status,
            Expr::value(MessageStatus::Pending.as_str()),
        )
        .col_expr(entity::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(entity::Column::Queue.eq(queue))
        .filter(entity::Column::Status.eq(MessageStatus::Processing.as_str()))
        .exec(db)
        .await?;
    if result.rows_affected > 0 {
        warn!(queue, count = result.rows_affected, "redelivering unacknowledged messages");
    }
    Ok(result.rows_affected)
}

/// Dropped messages of `queue`, oldest first.
pub async fn dropped<C: ConnectionTrait>(
    db: &C,
    queue: &str,
) -> Result<Vec<entity::Model>, QueueError> {
    let models = entity::Entity::find()
        .filter(entity::Column::Queue.eq(queue))
        .filter(entity::Column::Status.eq(MessageStatus::Dropped.as_str()))
        .order_by_asc(entity::Column::Id)
        .all(db)
        .await?;
    Ok(models)
}

/// Move a dropped message back to `pending`.
pub async fn requeue<C: ConnectionTrait>(db: &C, id: i64) -> Result<(), QueueError> {
    let result = entity::Entity::update_many()
        .col_expr(
            entity::Column::Status,
            Expr::value(MessageStatus::Pending.as_str()),
        )
        .col_expr(entity::Column::Error, Expr::value(Option::<String>::None))
        .col_expr(entity::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(entity::Column::Id.eq(id))
        .filter(entity::Column::Status.eq(MessageStatus::Dropped.as_str()))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(QueueError::NotFound(id));
    }
    info!(id, "message requeued");
    Ok(())
}

/// Processes the messages of one queue.
#[async_trait::async_trait]
pub trait Handler<M: Message>: Send + Sync {
    type Error: std::fmt::Display + Send;

    async fn handle(&self, message: M) -> Result<(), Self::Error>;
}

/// Outcome of one claim attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Empty,
    Acked(i64),
    Dropped(i64),
}

/// Serial consumer of the queue named by `M::QUEUE` (prefetch of one).
pub struct Consumer<M, H> {
    db: DatabaseConnection,
    handler: Arc<H>,
    poll_interval: Duration,
    _message: PhantomData<fn() -> M>,
}

impl<M, H> Consumer<M, H>
where
    M: Message,
    H: Handler<M>,
{
    pub fn new(db: DatabaseConnection, handler: Arc<H>) -> Self {
        Self {
            db,
            handler,
            poll_interval: DEFAULT_POLL_INTERVAL,
            _message: PhantomData,
        }
    }

    /// How long an idle consumer waits before polling an empty queue again.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Consume until `shutdown` is cancelled. Cancellation is observed between
    /// messages, never while one is being handled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), QueueError> {
        recover_in_flight(&self.db, M::QUEUE).await?;
        info!(queue = M::QUEUE, "consumer started");

        while !shutdown.is_cancelled() {
            let idle = match self.process_next().await {
                Ok(Delivery::Empty) => true,
                Ok(_) => false,
                Err(err) => {
                    error!(queue = M::QUEUE, "queue unavailable: {err}");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        info!(queue = M::QUEUE, "consumer stopped");
        Ok(())
    }

    /// Claim and handle the oldest pending message, if any.
    ///
    /// Decoding, validation and handler failures nack the message without
    /// requeue; only failures of the queue table itself are returned.
    pub async fn process_next(&self) -> Result<Delivery, QueueError> {
        let Some(claimed) = self.claim().await? else {
            return Ok(Delivery::Empty);
        };
        debug!(queue = M::QUEUE, id = claimed.id, "message claimed");

        let message = match decode::<M>(&claimed.payload) {
            Ok(message) => message,
            Err(err) => {
                self.nack(claimed.id, &err.to_string()).await?;
                return Ok(Delivery::Dropped(claimed.id));
            }
        };

        match self.handler.handle(message).await {
            Ok(()) => {
                self.ack(claimed.id).await?;
                Ok(Delivery::Acked(claimed.id))
            }
            Err(err) => {
                self.nack(claimed.id, &err.to_string()).await?;
                Ok(Delivery::Dropped(claimed.id))
            }
        }
    }

    async fn claim(&self) -> Result<Option<entity::Model>, QueueError> {
        loop {
            let Some(candidate) = entity::Entity::find()
                .filter(entity::Column::Queue.eq(M::QUEUE))
                .filter(entity::Column::Status.eq(MessageStatus::Pending.as_str()))
                .order_by_asc(entity::Column::Id)
                .one(&self.db)
                .await?
            else {
                return Ok(None);
            };

            let result = entity::Entity::update_many()
                .col_expr(
                    entity::Column::Status,
                    Expr::value(MessageStatus::Processing.as_str()),
                )
                .col_expr(
                    entity::Column::Attempts,
                    Expr::col(entity::Column::Attempts).add(1),
                )
                .col_expr(entity::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(entity::Column::Id.eq(candidate.id))
                .filter(entity::Column::Status.eq(MessageStatus::Pending.as_str()))
                .exec(&self.db)
                .await?;

            // Another consumer won the race; look for the next one.
            if result.rows_affected == 1 {
                return Ok(Some(candidate));
            }
        }
    }

    async fn ack(&self, id: i64) -> Result<(), QueueError> {
        self.settle(id, MessageStatus::Acked, None).await?;
        debug!(queue = M::QUEUE, id, "message acked");
        Ok(())
    }

    async fn nack(&self, id: i64, reason: &str) -> Result<(), QueueError> {
        self.settle(id, MessageStatus::Dropped, Some(reason.to_string()))
            .await?;
        error!(queue = M::QUEUE, id, "message dropped: {reason}");
        Ok(())
    }

    async fn settle(
        &self,
        id: i64,
        status: MessageStatus,
        reason: Option<String>,
    ) -> Result<(), QueueError> {
        entity::Entity::update_many()
            .col_expr(entity::Column::Status, Expr::value(status.as_str()))
            .col_expr(entity::Column::Error, Expr::value(reason))
            .col_expr(entity::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(entity::Column::Id.eq(id))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

fn decode<M: Message>(payload: &str) -> Result<M, QueueError> {
    let message: M = serde_json::from_str(payload)?;
    message.validate()?;
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration::{Migrator, MigratorTrait};
    use rust_decimal::Decimal;
    use sea_orm::Database;
    use tokio::sync::Mutex;

    async fn setup() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    fn event(uid: &str) -> BudgetUpdate {
        BudgetUpdate {
            uid: uid.to_string(),
            user_id: "alice".to_string(),
            amount: Decimal::from(10),
            category_id: Some("cat_1".to_string()),
            action_type: BudgetAction::Add,
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait::async_trait]
    impl Handler<BudgetUpdate> for Recorder {
        type Error = String;

        async fn handle(&self, message: BudgetUpdate) -> Result<(), Self::Error> {
            if self.fail_on.as_deref() == Some(message.uid.as_str()) {
                return Err(format!("cannot handle {}", message.uid));
            }
            self.seen.lock().await.push(message.uid);
            Ok(())
        }
    }

    async fn status_of(db: &DatabaseConnection, id: i64) -> entity::Model {
        entity::Entity::find_by_id(id)
            .one(db)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn delivers_in_publish_order_and_acks() {
        let db = setup().await;
        let first = publish(&db, &event("txn_1")).await.unwrap();
        let second = publish(&db, &event("txn_2")).await.unwrap();

        let recorder = Arc::new(Recorder::default());
        let consumer = Consumer::<BudgetUpdate, _>::new(db.clone(), recorder.clone());

        assert_eq!(consumer.process_next().await.unwrap(), Delivery::Acked(first));
        assert_eq!(consumer.process_next().await.unwrap(), Delivery::Acked(second));
        assert_eq!(consumer.process_next().await.unwrap(), Delivery::Empty);

        assert_eq!(*recorder.seen.lock().await, vec!["txn_1", "txn_2"]);
        let model = status_of(&db, first).await;
        assert_eq!(model.status, "acked");
        assert_eq!(model.attempts, 1);
    }

    #[tokio::test]
    async fn handler_error_drops_without_requeue() {
        let db = setup().await;
        let id = publish(&db, &event("txn_bad")).await.unwrap();

        let recorder = Arc::new(Recorder {
            fail_on: Some("txn_bad".to_string()),
            ..Recorder::default()
        });
        let consumer = Consumer::<BudgetUpdate, _>::new(db.clone(), recorder);

        assert_eq!(consumer.process_next().await.unwrap(), Delivery::Dropped(id));
        assert_eq!(consumer.process_next().await.unwrap(), Delivery::Empty);

        let model = status_of(&db, id).await;
        assert_eq!(model.status, "dropped");
        assert_eq!(model.error.as_deref(), Some("cannot handle txn_bad"));

        let listed = dropped(&db, BUDGET_UPDATE_QUEUE).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_dropped_at_consume() {
        let db = setup().await;
        let now = Utc::now();
        let id = entity::Entity::insert(entity::ActiveModel {
            id: ActiveValue::NotSet,
            queue: ActiveValue::Set(BUDGET_UPDATE_QUEUE.to_string()),
            payload: ActiveValue::Set(r#"{"uid":"","userId":"alice","amount":1}"#.to_string()),
            status: ActiveValue::Set("pending".to_string()),
            error: ActiveValue::Set(None),
            attempts: ActiveValue::Set(0),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        })
        .exec(&db)
        .await
        .unwrap()
        .last_insert_id;

        let recorder = Arc::new(Recorder::default());
        let consumer = Consumer::<BudgetUpdate, _>::new(db.clone(), recorder.clone());
        assert_eq!(consumer.process_next().await.unwrap(), Delivery::Dropped(id));
        assert!(recorder.seen.lock().await.is_empty());
        assert_eq!(
            status_of(&db, id).await.error.as_deref(),
            Some("Invalid message: uid must not be empty")
        );
    }

    #[tokio::test]
    async fn publish_rejects_invalid_message() {
        let db = setup().await;
        let err = publish(&db, &event("")).await.unwrap_err();
        assert_eq!(
            err,
            QueueError::Validation("uid must not be empty".to_string())
        );
        assert!(entity::Entity::find().all(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_rejects_non_base64_image() {
        let db = setup().await;
        let job = ExtractionJob {
            images: vec![JobImage {
                content: "not base64!".to_string(),
                mime_type: "image/png".to_string(),
                name: "r.png".to_string(),
                ext: "png".to_string(),
            }],
            user_id: "alice".to_string(),
        };
        let err = publish(&db, &job).await.unwrap_err();
        let QueueError::Validation(msg) = &err else {
            panic!("unexpected error: {err}");
        };
        assert!(msg.starts_with("image r.png is not base64"), "{msg}");
        assert!(entity::Entity::find().all(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn requeue_and_recover() {
        let db = setup().await;
        let id = publish(&db, &event("txn_1")).await.unwrap();

        let failing = Arc::new(Recorder {
            fail_on: Some("txn_1".to_string()),
            ..Recorder::default()
        });
        Consumer::<BudgetUpdate, _>::new(db.clone(), failing).process_next().await.unwrap();

        requeue(&db, id).await.unwrap();
        assert_eq!(requeue(&db, id).await, Err(QueueError::NotFound(id)));

        // simulate a consumer that died after claiming
        entity::Entity::update_many()
            .col_expr(entity::Column::Status, Expr::value("processing"))
            .filter(entity::Column::Id.eq(id))
            .exec(&db)
            .await
            .unwrap();
        assert_eq!(recover_in_flight(&db, BUDGET_UPDATE_QUEUE).await.unwrap(), 1);

        let recorder = Arc::new(Recorder::default());
        let consumer = Consumer::<BudgetUpdate, _>::new(db.clone(), recorder.clone());
        assert_eq!(consumer.process_next().await.unwrap(), Delivery::Acked(id));
        let model = status_of(&db, id).await;
        assert_eq!(model.attempts, 2);
        assert_eq!(model.error, None);
    }

    #[tokio::test]
    async fn queues_are_isolated() {
        let db = setup().await;
        let job = ExtractionJob {
            images: vec![JobImage {
                content: "aGVsbG8=".to_string(),
                mime_type: "image/png".to_string(),
                name: "r.png".to_string(),
                ext: "png".to_string(),
            }],
            user_id: "alice".to_string(),
        };
        publish(&db, &job).await.unwrap();

        let consumer = Consumer::<BudgetUpdate, _>::new(db.clone(), Arc::new(Recorder::default()));
        assert_eq!(consumer.process_next().await.unwrap(), Delivery::Empty);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let db = setup().await;
        publish(&db, &event("txn_1")).await.unwrap();

        let recorder = Arc::new(Recorder::default());
        let shutdown = CancellationToken::new();
        let consumer = Consumer::<BudgetUpdate, _>::new(db.clone(), recorder.clone())
            .poll_interval(Duration::from_millis(10));
        let handle = tokio::spawn(consumer.run(shutdown.clone()));

        for _ in 0..100 {
            if !recorder.seen.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(*recorder.seen.lock().await, vec!["txn_1"]);
    }
}
