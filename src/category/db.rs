//! Database operations for categories.
//!
//! Queries name the table without a schema so that SQLite finds it in
//! whichever schema the connection has it in.

use rusqlite::{Connection, Row};

use crate::{
    Error, Schema,
    category::{Category, NewCategory},
};

/// Retrieve every category in the order the database returns them.
pub fn get_all_categories(connection: &Connection) -> Result<Vec<Category>, Error> {
    connection
        .prepare("SELECT id, nome, quantidade, limite FROM category;")?
        .query_map([], map_row)?
        .map(|maybe_category| maybe_category.map_err(|error| error.into()))
        .collect()
}

/// Insert a category and return the number of rows inserted.
pub fn insert_category(category: &NewCategory, connection: &Connection) -> Result<usize, Error> {
    let rows_affected = connection.execute(
        "INSERT INTO category (nome, quantidade, limite) VALUES (?1, ?2, ?3);",
        (&category.name, category.quantity, category.limit),
    )?;

    Ok(rows_affected)
}

/// Delete the category with `id` and return the number of rows deleted.
///
/// `id` is passed to SQLite as given. The `id` column's integer affinity
/// converts numeric text, so "7" matches the category with ID 7 while text
/// that is not a number matches nothing.
pub fn delete_category(id: &str, connection: &Connection) -> Result<usize, Error> {
    let rows_affected = connection.execute("DELETE FROM category WHERE id = ?1;", [id])?;

    Ok(rows_affected)
}

/// Create the category table in `schema` if it does not exist.
///
/// `AUTOINCREMENT` stops SQLite from handing out the ID of a deleted
/// category again.
pub fn create_category_table(connection: &Connection, schema: &Schema) -> Result<(), Error> {
    connection.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {}.category (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nome VARCHAR(100),
            quantidade REAL,
            limite INTEGER
        );",
        schema.quoted()
    ))?;

    Ok(())
}

fn map_row(row: &Row) -> Result<Category, rusqlite::Error> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        quantity: row.get(2)?,
        limit: row.get(3)?,
    })
}
