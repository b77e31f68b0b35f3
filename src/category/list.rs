//! Category listing endpoint.

use axum::{Json, extract::State};

use crate::{
    Deadline, Error,
    category::{Category, CategoryStore},
};

/// Return every category as a JSON array.
pub async fn get_categories_endpoint(
    State(store): State<CategoryStore>,
    deadline: Deadline,
) -> Result<Json<Vec<Category>>, Error> {
    let categories = store.get_all(deadline).await.inspect_err(|error| {
        tracing::error!("An unexpected error occurred while listing categories: {error}");
    })?;

    Ok(Json(categories))
}
