//! Transactions API endpoints

use std::str::FromStr;

use api_types::transaction::{
    MonthlyTotals, MonthlyTotalsQuery, TransactionListQuery, TransactionUpdate, TransactionView,
    UploadAccepted, UploadRequest,
};
use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Utc;
use engine::{TransactionFilter, TransactionPatch, users};
use extractor::{Upload, build_job};
use rust_decimal::Decimal;

use crate::{ServerError, server::ServerState};

const IMAGES_FIELD: &str = "images";
const IN_PROGRESS: &str = "Transaction creation in progress";

async fn submit(
    state: &ServerState,
    user: &users::Model,
    uploads: Vec<Upload>,
) -> Result<(StatusCode, Json<UploadAccepted>), ServerError> {
    let count = uploads.len();
    let job = build_job(&user.username, uploads)?;
    let id = queue::publish(&state.db, &job).await?;
    tracing::info!(user_id = %user.username, images = count, id, "extraction job queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAccepted {
            message: IN_PROGRESS.to_string(),
        }),
    ))
}

/// `multipart/form-data` upload; every `images` part is one receipt.
pub async fn upload_multipart(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadAccepted>), ServerError> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ServerError::Generic(err.body_text()))?
    {
        if field.name() != Some(IMAGES_FIELD) {
            continue;
        }
        let name = field.file_name().map(ToString::to_string);
        let mime_type = field.content_type().map(ToString::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ServerError::Generic(err.body_text()))?;
        uploads.push(Upload {
            bytes: bytes.to_vec(),
            name,
            mime_type,
        });
    }

    submit(&state, &user, uploads).await
}

/// JSON upload with base64 image content.
pub async fn upload_base64(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<UploadRequest>,
) -> Result<(StatusCode, Json<UploadAccepted>), ServerError> {
    let mut uploads = Vec::with_capacity(payload.images.len());
    for image in payload.images {
        let bytes = STANDARD
            .decode(image.content.trim())
            .map_err(|err| ServerError::Generic(format!("invalid base64 in {}: {err}", image.name)))?;
        uploads.push(Upload {
            bytes,
            name: Some(image.name),
            mime_type: image.mime_type,
        });
    }

    submit(&state, &user, uploads).await
}

pub async fn list(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Query(query): Query<TransactionListQuery>,
) -> Result<Json<Vec<TransactionView>>, ServerError> {
    let filter = TransactionFilter {
        start: query.start_date,
        end: query.end_date,
        category_id: query.category_id,
        ascending: query.descending == Some(false),
    };
    let transactions = state
        .engine
        .list_transactions(&user.username, query.page, query.page_size, &filter)
        .await?;

    Ok(Json(transactions.into_iter().map(Into::into).collect()))
}

pub async fn get_one(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(uid): Path<String>,
) -> Result<Json<TransactionView>, ServerError> {
    let transaction = state.engine.find_transaction(&uid, &user.username).await?;
    Ok(Json(transaction.into()))
}

pub async fn update(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(uid): Path<String>,
    Json(payload): Json<TransactionUpdate>,
) -> Result<Json<TransactionView>, ServerError> {
    let amount = payload
        .amount
        .as_deref()
        .map(|raw| {
            Decimal::from_str(raw.trim())
                .map_err(|_| ServerError::Generic(format!("invalid amount: {raw}")))
        })
        .transpose()?;
    let category_id = payload
        .category_id
        .map(|id| if id.trim().is_empty() { None } else { Some(id) });

    let patch = TransactionPatch {
        name: payload.name,
        amount,
        notes: payload.notes,
        transaction_date: payload.transaction_date,
        category_id,
    };
    let transaction = state
        .engine
        .update_transaction(&uid, &user.username, patch)
        .await?;
    Ok(Json(transaction.into()))
}

pub async fn delete(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(uid): Path<String>,
) -> Result<StatusCode, ServerError> {
    state.engine.delete_transaction(&uid, &user.username).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Income and expense totals of one month.
pub async fn summary(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Query(query): Query<MonthlyTotalsQuery>,
) -> Result<Json<MonthlyTotals>, ServerError> {
    let at = query.date.unwrap_or_else(Utc::now);
    let totals = state.engine.monthly_totals(&user.username, at).await?;
    Ok(Json(MonthlyTotals {
        total_income: totals.income.normalize().to_string(),
        total_expense: totals.expense.normalize().to_string(),
    }))
}
