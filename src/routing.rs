//! Application router configuration.

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get},
};

use crate::{
    AppState, ErrorBody,
    category::{create_category_endpoint, delete_category_endpoint, get_categories_endpoint},
    deadline::deadline_middleware,
    endpoints,
    health::get_health,
    logging::logging_middleware,
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(get_health))
        .route(
            endpoints::CATEGORIES,
            get(get_categories_endpoint).post(create_category_endpoint),
        )
        .route(endpoints::CATEGORY, delete(delete_category_endpoint))
        .fallback(get_404_not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            deadline_middleware,
        ))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}

async fn get_404_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "the requested resource could not be found".to_owned(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod router_tests {
    use std::time::Duration;

    use axum::{body::Bytes, http::StatusCode};
    use axum_test::TestServer;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::{
        AppState, Category, Database, DatabaseConfig, Deadline, ErrorBody, HealthStatus,
        RowsChanged, Schema, category::create_category_table, endpoints,
    };

    use super::build_router;

    /// A server whose database holds one category, "Item A" with ID 1.
    async fn get_test_server(dir: &TempDir) -> (TestServer, Database) {
        let database = Database::open(&DatabaseConfig::new(dir.path().join("router.db")))
            .expect("Could not open test database");

        database
            .with_connection(Deadline::after(Duration::from_secs(5)), |connection| {
                create_category_table(connection, &Schema::default())?;
                connection.execute(
                    "INSERT INTO category (nome, quantidade, limite) VALUES ('Item A', 15.75, 200);",
                    (),
                )?;
                Ok(())
            })
            .await
            .expect("Could not seed test database");

        let app = build_router(AppState::new(database.clone()));
        let server = TestServer::new(app);

        (server, database)
    }

    #[tokio::test]
    async fn lists_seeded_category() {
        let dir = TempDir::new().unwrap();
        let (server, _database) = get_test_server(&dir).await;

        let response = server.get(endpoints::CATEGORIES).await;

        response.assert_status_ok();
        response.assert_text(r#"[{"id":1,"nome":"Item A","quantidade":15.75,"limite":200}]"#);
    }

    #[tokio::test]
    async fn empty_table_lists_empty_array() {
        let dir = TempDir::new().unwrap();
        let (server, _database) = get_test_server(&dir).await;
        server.delete("/categories/1").await.assert_status_ok();

        let response = server.get(endpoints::CATEGORIES).await;

        response.assert_status_ok();
        response.assert_text("[]");
    }

    #[tokio::test]
    async fn create_category_then_list_includes_it() {
        let dir = TempDir::new().unwrap();
        let (server, _database) = get_test_server(&dir).await;

        let response = server
            .post(endpoints::CATEGORIES)
            .json(&json!({"nome": "Teste", "quantidade": 15.35, "limite": 300}))
            .await;

        response.assert_status_ok();
        response.assert_json(&RowsChanged::new(1));
        response.assert_text(r#"{"message":"1 row(s) changed"}"#);

        let categories: Vec<Category> = server.get(endpoints::CATEGORIES).await.json();
        assert_eq!(categories.len(), 2);
        assert_eq!(
            categories[1],
            Category {
                id: 2,
                name: "Teste".to_owned(),
                quantity: 15.35,
                limit: 300,
            }
        );
    }

    #[tokio::test]
    async fn create_category_accepts_body_without_content_type() {
        let dir = TempDir::new().unwrap();
        let (server, _database) = get_test_server(&dir).await;

        let response = server
            .post(endpoints::CATEGORIES)
            .bytes(Bytes::from_static(
                br#"{"nome":"Teste","quantidade":15.35,"limite":300}"#,
            ))
            .await;

        response.assert_status_ok();
        response.assert_json(&RowsChanged::new(1));
        let categories: Vec<Category> = server.get(endpoints::CATEGORIES).await.json();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[1].name, "Teste");
    }

    #[tokio::test]
    async fn create_category_accepts_plain_text_content_type() {
        let dir = TempDir::new().unwrap();
        let (server, _database) = get_test_server(&dir).await;

        let response = server
            .post(endpoints::CATEGORIES)
            .text(r#"{"nome":"Teste","quantidade":15.35,"limite":300}"#)
            .await;

        response.assert_status_ok();
        response.assert_text(r#"{"message":"1 row(s) changed"}"#);
    }

    #[tokio::test]
    async fn create_category_rejects_missing_fields() {
        let dir = TempDir::new().unwrap();
        let (server, _database) = get_test_server(&dir).await;

        let response = server
            .post(endpoints::CATEGORIES)
            .json(&json!({"nome": "Teste"}))
            .expect_failure()
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorBody = response.json();
        assert!(!body.error.is_empty());

        let categories: Vec<Category> = server.get(endpoints::CATEGORIES).await.json();
        assert_eq!(categories.len(), 1);
    }

    #[tokio::test]
    async fn create_category_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        let (server, _database) = get_test_server(&dir).await;

        let response = server
            .post(endpoints::CATEGORIES)
            .text("{\"nome\": ")
            .content_type("application/json")
            .expect_failure()
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert!(body.get("error").is_some());
        assert!(body.get("message").is_none());
    }

    #[tokio::test]
    async fn delete_category_then_list_excludes_it() {
        let dir = TempDir::new().unwrap();
        let (server, _database) = get_test_server(&dir).await;

        let response = server.delete("/categories/1").await;

        response.assert_status_ok();
        response.assert_text(r#"{"message":"1 row(s) changed"}"#);
        let categories: Vec<Category> = server.get(endpoints::CATEGORIES).await.json();
        assert!(categories.iter().all(|category| category.id != 1));
    }

    #[tokio::test]
    async fn delete_twice_reports_one_then_zero() {
        let dir = TempDir::new().unwrap();
        let (server, _database) = get_test_server(&dir).await;

        server
            .delete("/categories/1")
            .await
            .assert_json(&RowsChanged::new(1));
        server
            .delete("/categories/1")
            .await
            .assert_json(&RowsChanged::new(0));
    }

    #[tokio::test]
    async fn delete_missing_category_reports_zero_rows() {
        let dir = TempDir::new().unwrap();
        let (server, _database) = get_test_server(&dir).await;

        let response = server.delete("/categories/999").await;

        response.assert_status_ok();
        response.assert_text(r#"{"message":"0 row(s) changed"}"#);
        let categories: Vec<Category> = server.get(endpoints::CATEGORIES).await.json();
        assert_eq!(categories.len(), 1);
    }

    #[tokio::test]
    async fn health_is_up_with_pool_statistics() {
        let dir = TempDir::new().unwrap();
        let (server, _database) = get_test_server(&dir).await;

        let response = server.get(endpoints::HEALTH).await;

        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], json!(HealthStatus::Up));
        assert!(body.get("open_connections").is_some());
        assert!(body.get("wait_duration").is_some());
    }

    #[tokio::test]
    async fn health_is_down_after_close() {
        let dir = TempDir::new().unwrap();
        let (server, database) = get_test_server(&dir).await;
        database.close().unwrap();

        let response = server.get(endpoints::HEALTH).expect_failure().await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "down");
        assert!(body["error"].as_str().is_some_and(|error| !error.is_empty()));
    }

    #[tokio::test]
    async fn storage_failure_is_internal_server_error() {
        let dir = TempDir::new().unwrap();
        let (server, database) = get_test_server(&dir).await;
        database.close().unwrap();

        let response = server.get(endpoints::CATEGORIES).expect_failure().await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&ErrorBody {
            error: "the database connection is closed".to_owned(),
        });
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (server, _database) = get_test_server(&dir).await;

        let response = server.get("/nope").expect_failure().await;

        response.assert_status_not_found();
    }
}
