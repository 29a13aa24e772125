use axum::{
    Router,
    extract::{DefaultBodyLimit, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, patch, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tokio_util::sync::CancellationToken;

use std::sync::Arc;

use crate::{budgets, categories, tags, transactions};
use engine::{Engine, users};

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    pub db: DatabaseConnection,
    /// Largest request body accepted, uploads included.
    pub body_limit: usize,
}

impl ServerState {
    pub fn new(engine: Arc<Engine>, db: DatabaseConnection) -> Self {
        Self {
            engine,
            db,
            body_limit: 20 * 1024 * 1024,
        }
    }
}

/// Basic auth against the `users` table. The matched user is stored in the
/// request extensions for the handlers.
async fn auth(
    auth_header: Option<TypedHeader<Authorization<Basic>>>,
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(TypedHeader(auth_header)) = auth_header else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    if auth_header.username().is_empty() || auth_header.password().is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let user = users::Entity::find()
        .filter(users::Column::Username.eq(auth_header.username()))
        .filter(users::Column::Password.eq(auth_header.password()))
        .one(&state.db)
        .await
        .map_err(|err| {
            tracing::error!("user lookup failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn healthz() -> &'static str {
    "OK"
}

pub fn router(state: ServerState) -> Router {
    let api = Router::new()
        .route(
            "/transactions",
            post(transactions::upload_multipart).get(transactions::list),
        )
        .route("/transactions/base64", post(transactions::upload_base64))
        .route("/transactions/summary", get(transactions::summary))
        .route(
            "/transactions/{uid}",
            get(transactions::get_one)
                .patch(transactions::update)
                .delete(transactions::delete),
        )
        .route(
            "/transactions/{uid}/tags",
            get(tags::of_transaction).post(tags::attach),
        )
        .route(
            "/transactions/{uid}/tags/{tag_uid}",
            delete(tags::detach),
        )
        .route(
            "/categories",
            get(categories::list).post(categories::create),
        )
        .route("/tags", get(tags::list).post(tags::create))
        .route(
            "/tags/{uid}",
            get(tags::get_one).put(tags::rename).delete(tags::delete),
        )
        .route("/budgets", post(budgets::create).get(budgets::list))
        .route(
            "/budgets/{uid}",
            get(budgets::get_one)
                .patch(budgets::update)
                .delete(budgets::delete),
        )
        .route("/budgets/{uid}/progress", get(budgets::progress))
        .route("/budgets/{uid}/category", patch(budgets::change_category))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(api)
        .layer(DefaultBodyLimit::max(state.body_limit))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` is cancelled.
pub async fn run(
    state: ServerState,
    addr: &str,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    run_with_listener(state, listener, shutdown).await
}

pub async fn run_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}
