//! Category deletion endpoint.

use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    Deadline, Error,
    category::{CategoryStore, RowsChanged},
};

/// Delete the category named in the path.
///
/// The ID is forwarded as text without parsing. An ID that matches no
/// category reports zero changed rows.
pub async fn delete_category_endpoint(
    Path(category_id): Path<String>,
    State(store): State<CategoryStore>,
    deadline: Deadline,
) -> Result<Json<RowsChanged>, Error> {
    let rows_affected = store
        .delete(category_id.clone(), deadline)
        .await
        .inspect_err(|error| {
            tracing::error!(
                "An unexpected error occurred while deleting category {category_id}: {error}"
            );
        })?;

    Ok(Json(RowsChanged::new(rows_affected)))
}
