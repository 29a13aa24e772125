//! Tags API endpoints

use api_types::tag::{TagName, TagView};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use engine::users;

use crate::{ServerError, server::ServerState};

/// Live tags sorted by name.
pub async fn list(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
) -> Result<Json<Vec<TagView>>, ServerError> {
    let tags = state.engine.list_tags(&user.username).await?;
    Ok(Json(tags.into_iter().map(Into::into).collect()))
}

pub async fn create(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<TagName>,
) -> Result<(StatusCode, Json<TagView>), ServerError> {
    let tag = state.engine.create_tag(&user.username, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(tag.into())))
}

pub async fn get_one(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(uid): Path<String>,
) -> Result<Json<TagView>, ServerError> {
    let tag = state.engine.find_tag(&uid, &user.username).await?;
    Ok(Json(tag.into()))
}

pub async fn rename(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(uid): Path<String>,
    Json(payload): Json<TagName>,
) -> Result<Json<TagView>, ServerError> {
    let tag = state
        .engine
        .rename_tag(&uid, &user.username, &payload.name)
        .await?;
    Ok(Json(tag.into()))
}

pub async fn delete(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(uid): Path<String>,
) -> Result<StatusCode, ServerError> {
    state.engine.delete_tag(&uid, &user.username).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn of_transaction(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(uid): Path<String>,
) -> Result<Json<Vec<TagView>>, ServerError> {
    let tags = state.engine.transaction_tags(&uid, &user.username).await?;
    Ok(Json(tags.into_iter().map(Into::into).collect()))
}

/// Attach a tag by name, creating it when needed.
pub async fn attach(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(uid): Path<String>,
    Json(payload): Json<TagName>,
) -> Result<Json<TagView>, ServerError> {
    let tag = state
        .engine
        .tag_transaction(&uid, &user.username, &payload.name)
        .await?;
    Ok(Json(tag.into()))
}

pub async fn detach(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path((uid, tag_uid)): Path<(String, String)>,
) -> Result<StatusCode, ServerError> {
    state
        .engine
        .untag_transaction(&uid, &tag_uid, &user.username)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
