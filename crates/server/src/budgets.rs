//! Budgets API endpoints

use std::str::FromStr;

use api_types::budget::{BudgetCategoryChange, BudgetEdit, BudgetNew, BudgetProgress, BudgetView};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use engine::{BudgetPatch, users};
use rust_decimal::Decimal;

use crate::{ServerError, server::ServerState};

fn parse_target(raw: &str) -> Result<Decimal, ServerError> {
    Decimal::from_str(raw.trim()).map_err(|_| ServerError::Generic(format!("invalid target: {raw}")))
}

pub async fn create(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<BudgetNew>,
) -> Result<(StatusCode, Json<BudgetView>), ServerError> {
    let new = engine::BudgetNew {
        target: parse_target(&payload.target)?,
        name: payload.name,
        cycle: payload.cycle,
        start_date: payload.start_date,
        end_date: payload.end_date,
        category_id: payload.category_id,
    };
    let budget = state.engine.create_budget(&user.username, new).await?;
    Ok((StatusCode::CREATED, Json(budget.into())))
}

/// Live budgets, newest first.
pub async fn list(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
) -> Result<Json<Vec<BudgetView>>, ServerError> {
    let budgets = state.engine.list_budgets(&user.username).await?;
    Ok(Json(budgets.into_iter().map(Into::into).collect()))
}

pub async fn get_one(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(uid): Path<String>,
) -> Result<Json<BudgetView>, ServerError> {
    let budget = state.engine.find_budget(&uid, &user.username).await?;
    Ok(Json(budget.into()))
}

pub async fn update(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(uid): Path<String>,
    Json(payload): Json<BudgetEdit>,
) -> Result<Json<BudgetView>, ServerError> {
    let patch = BudgetPatch {
        name: payload.name,
        target: payload.target.as_deref().map(parse_target).transpose()?,
        cycle: payload.cycle,
        start_date: payload.start_date,
        end_date: payload.end_date,
    };
    let budget = state
        .engine
        .update_budget(&uid, &user.username, patch)
        .await?;
    Ok(Json(budget.into()))
}

pub async fn delete(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(uid): Path<String>,
) -> Result<StatusCode, ServerError> {
    state.engine.delete_budget(&uid, &user.username).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn progress(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(uid): Path<String>,
) -> Result<Json<BudgetProgress>, ServerError> {
    let progress = state
        .engine
        .budget_progress(&uid, &user.username, Utc::now())
        .await?;
    Ok(Json(progress.into()))
}

pub async fn change_category(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(uid): Path<String>,
    Json(payload): Json<BudgetCategoryChange>,
) -> Result<Json<BudgetView>, ServerError> {
    let budget = state
        .engine
        .change_budget_category(
            &uid,
            &user.username,
            &payload.category_id,
            payload.migrate_current_amount_option,
            Utc::now(),
        )
        .await?;
    Ok(Json(budget.into()))
}
