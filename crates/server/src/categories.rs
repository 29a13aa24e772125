//! Categories API endpoints

use api_types::category::{CategoryCreate, CategoryList, CategoryView};
use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
};
use engine::users;

use crate::{ServerError, server::ServerState};

/// The user's categories followed by the global ones.
pub async fn list(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Query(query): Query<CategoryList>,
) -> Result<Json<Vec<CategoryView>>, ServerError> {
    let categories = state
        .engine
        .list_categories(&user.username, query.kind)
        .await?;
    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

pub async fn create(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<CategoryCreate>,
) -> Result<(StatusCode, Json<CategoryView>), ServerError> {
    let category = state
        .engine
        .create_category(&user.username, &payload.name, payload.kind)
        .await?;
    Ok((StatusCode::CREATED, Json(category.into())))
}
