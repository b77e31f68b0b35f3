//! Categories is a small REST service for managing spending categories.
//!
//! Each category has a name, a quantity and a limit and is stored in a single
//! SQLite table. The service can list, create and delete categories and
//! reports the health of its connection pool.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde::{Deserialize, Serialize};
use tokio::signal;

mod app_state;
mod category;
mod config;
mod db;
mod deadline;
mod endpoints;
mod health;
mod logging;
mod routing;

pub use app_state::AppState;
pub use category::{
    Category, CategoryId, CategoryStore, NewCategory, RowsChanged, create_category_table,
};
pub use config::{DatabaseConfig, Schema};
pub use db::{Database, OPERATION_TIMEOUT, PoolStats};
pub use deadline::{DEFAULT_REQUEST_TIMEOUT, Deadline, deadline_middleware};
pub use health::{HealthReport, HealthStatus, check_health};
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use routing::build_router;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to install signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The request body could not be decoded into a category.
    ///
    /// The client should check that the body is JSON with the fields `nome`,
    /// `quantidade` and `limite`.
    #[error("invalid category: {0}")]
    InvalidPayload(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// A connection could not be taken from the pool, or the pool could not
    /// be built.
    #[error("could not get a database connection: {0}")]
    Pool(String),

    /// A storage operation did not finish within its time budget.
    #[error("the database operation timed out")]
    Timeout,

    /// The request took longer than the server allows.
    #[error("request timed out")]
    RequestTimeout,

    /// The connection pool has been closed.
    #[error("the database connection is closed")]
    DatabaseClosed,

    /// Could not acquire the lock guarding the connection pool.
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// The blocking task running a storage operation panicked or was cancelled.
    #[error("the database task failed: {0}")]
    TaskFailed(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(sql_error, _)
                if sql_error.code == rusqlite::ErrorCode::OperationInterrupted =>
            {
                Error::Timeout
            }
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<r2d2::Error> for Error {
    fn from(value: r2d2::Error) -> Self {
        Error::Pool(value.to_string())
    }
}

/// The JSON body sent to clients when a request fails.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    /// A description of what went wrong.
    pub error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("An unexpected error occurred: {}", self);
        }

        let body = ErrorBody {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
