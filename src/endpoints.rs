//! The API endpoints URIs.

/// The route for checking the health of the service and its database.
pub const HEALTH: &str = "/health";
/// The route for listing and creating categories.
pub const CATEGORIES: &str = "/categories";
/// The route for deleting a single category.
pub const CATEGORY: &str = "/categories/{category_id}";

// These tests are here so that we know when we call `Uri::from_shared` it will not panic.
#[cfg(test)]
mod endpoints_tests {
    use axum::http::Uri;

    use crate::endpoints;

    fn assert_endpoint_is_valid_uri(uri: &str) {
        assert!(uri.parse::<Uri>().is_ok());
    }

    #[test]
    fn endpoints_are_valid_uris() {
        assert_endpoint_is_valid_uri(endpoints::HEALTH);
        assert_endpoint_is_valid_uri(endpoints::CATEGORIES);
        assert_endpoint_is_valid_uri(endpoints::CATEGORY);
    }
}
