//! Category creation endpoint.

use axum::{Json, body::Bytes, extract::State};

use crate::{
    Deadline, Error,
    category::{CategoryStore, NewCategory, RowsChanged},
};

/// Decode a category from the JSON body and insert it.
///
/// The body is decoded whatever its `Content-Type`. A body that is not JSON,
/// or is missing one of `nome`, `quantidade` and `limite`, is rejected with
/// a 400 before the database is touched.
pub async fn create_category_endpoint(
    State(store): State<CategoryStore>,
    deadline: Deadline,
    body: Bytes,
) -> Result<Json<RowsChanged>, Error> {
    let new_category: NewCategory = serde_json::from_slice(&body)
        .map_err(|error| Error::InvalidPayload(error.to_string()))?;

    let rows_affected = store
        .insert(new_category, deadline)
        .await
        .inspect_err(|error| {
            tracing::error!("An unexpected error occurred while creating a category: {error}");
        })?;

    Ok(Json(RowsChanged::new(rows_affected)))
}
