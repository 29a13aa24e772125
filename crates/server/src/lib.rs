use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::EngineError;
use extractor::ExtractError;
use queue::QueueError;

use serde::Serialize;
pub use results::{RecordError, ResultRecorder};
pub use server::{ServerState, router, run, run_with_listener};

mod budgets;
mod categories;
mod results;
mod server;
mod tags;
mod transactions;

pub enum ServerError {
    Engine(EngineError),
    Extract(ExtractError),
    Queue(QueueError),
    Generic(String),
}

#[derive(Serialize)]
struct Error {
    error: String,
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::KeyNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::ExistingKey(_) => StatusCode::CONFLICT,
        EngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        EngineError::Queue(err) => status_for_queue_error(err),
        EngineError::InvalidAmount(_)
        | EngineError::InvalidName(_)
        | EngineError::InvalidBudget(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn status_for_queue_error(err: &QueueError) -> StatusCode {
    match err {
        QueueError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn hidden(err: impl std::fmt::Display) -> String {
    tracing::error!("internal error: {err}");
    "internal server error".to_string()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            ServerError::Engine(err) => {
                let status = status_for_engine_error(&err);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    (status, hidden(err))
                } else {
                    (status, err.to_string())
                }
            }
            ServerError::Queue(err) => {
                let status = status_for_queue_error(&err);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    (status, hidden(err))
                } else {
                    (status, err.to_string())
                }
            }
            ServerError::Extract(ExtractError::InvalidInput(msg)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg)
            }
            ServerError::Extract(ExtractError::Decode(err)) => {
                (StatusCode::BAD_REQUEST, format!("invalid base64 content: {err}"))
            }
            ServerError::Extract(err) => (StatusCode::INTERNAL_SERVER_ERROR, hidden(err)),
            ServerError::Generic(err) => (StatusCode::BAD_REQUEST, err),
        };

        (status, Json(Error { error })).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<ExtractError> for ServerError {
    fn from(value: ExtractError) -> Self {
        Self::Extract(value)
    }
}

impl From<QueueError> for ServerError {
    fn from(value: QueueError) -> Self {
        Self::Queue(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_forbidden_maps_to_403() {
        let res = ServerError::from(EngineError::Forbidden("forbidden".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn engine_not_found_maps_to_404() {
        let res = ServerError::from(EngineError::KeyNotFound("x".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn engine_conflict_maps_to_409() {
        let res = ServerError::from(EngineError::ExistingKey("x".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn business_rules_map_to_422() {
        for err in [
            EngineError::InvalidAmount("x".to_string()),
            EngineError::InvalidBudget("x".to_string()),
            EngineError::Queue(QueueError::Validation("x".to_string())),
        ] {
            let res = ServerError::from(err).into_response();
            assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }
        let res = ServerError::from(ExtractError::InvalidInput("x".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn database_errors_are_hidden() {
        let err = EngineError::Database(sea_orm::DbErr::Custom("secret".to_string()));
        let res = ServerError::from(err).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn generic_maps_to_400() {
        let res = ServerError::Generic("bad".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
