//! Category management: storage, queries and the HTTP endpoints.

mod create;
mod db;
mod delete;
mod domain;
mod list;
mod store;

pub use create::create_category_endpoint;
pub use db::create_category_table;
pub use delete::delete_category_endpoint;
pub use domain::{Category, CategoryId, NewCategory, RowsChanged};
pub use list::get_categories_endpoint;
pub use store::CategoryStore;
