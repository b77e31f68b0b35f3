//! Implements a category store backed by the pooled SQLite database.

use crate::{
    Database, Deadline, Error,
    category::{
        Category, NewCategory,
        db::{delete_category, get_all_categories, insert_category},
    },
};

/// Lists, creates and deletes categories.
///
/// Every operation borrows its own connection from the pool and is bounded
/// by the caller's [Deadline].
#[derive(Debug, Clone)]
pub struct CategoryStore {
    database: Database,
}

impl CategoryStore {
    /// Create a category store on top of `database`.
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Retrieve all categories.
    ///
    /// # Errors
    /// This function will return an error if there is an SQL error or the deadline passes.
    pub async fn get_all(&self, deadline: Deadline) -> Result<Vec<Category>, Error> {
        self.database
            .with_connection(deadline, get_all_categories)
            .await
    }

    /// Insert `category` and return the number of rows inserted.
    ///
    /// # Errors
    /// This function will return an error if there is an SQL error or the deadline passes.
    pub async fn insert(&self, category: NewCategory, deadline: Deadline) -> Result<usize, Error> {
        let rows_affected = self
            .database
            .with_connection(deadline, move |connection| {
                insert_category(&category, connection)
            })
            .await?;

        tracing::debug!("Inserted {rows_affected} category row(s)");

        Ok(rows_affected)
    }

    /// Delete the category with `id` and return the number of rows deleted.
    ///
    /// An `id` that matches no category deletes nothing and is not an error.
    ///
    /// # Errors
    /// This function will return an error if there is an SQL error or the deadline passes.
    pub async fn delete(&self, id: String, deadline: Deadline) -> Result<usize, Error> {
        let rows_affected = self
            .database
            .with_connection(deadline, move |connection| delete_category(&id, connection))
            .await?;

        tracing::debug!("Deleted {rows_affected} category row(s)");

        Ok(rows_affected)
    }
}
