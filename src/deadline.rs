//! Request deadlines and the middleware that enforces them.
//!
//! Every request is given a [Deadline] when it arrives. Storage operations
//! derive their own time budget from it, so a request that is nearly out of
//! time does not start a query it cannot wait for.

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::time::Instant;

use crate::{AppState, Error};

/// How long a request may take when the server has not been told otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The point in time by which a request must be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    /// The instant the deadline expires.
    pub fn instant(&self) -> Instant {
        self.0
    }

    /// The time left before the deadline expires, zero if it already has.
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// The time an operation capped at `limit` may take under this deadline.
    ///
    /// # Errors
    /// Returns [Error::Timeout] if the deadline has already expired.
    pub fn budget(&self, limit: Duration) -> Result<Duration, Error> {
        let remaining = self.remaining();

        if remaining.is_zero() {
            return Err(Error::Timeout);
        }

        Ok(remaining.min(limit))
    }
}

impl<S> FromRequestParts<S> for Deadline
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Deadline>()
            .copied()
            .unwrap_or_else(|| Deadline::after(DEFAULT_REQUEST_TIMEOUT)))
    }
}

/// Stamp each request with a [Deadline] and fail it once the deadline passes.
pub async fn deadline_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let deadline = Deadline::after(state.request_timeout);
    request.extensions_mut().insert(deadline);

    match tokio::time::timeout_at(deadline.instant(), next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!("request exceeded its {:?} deadline", state.request_timeout);
            Error::RequestTimeout.into_response()
        }
    }
}
