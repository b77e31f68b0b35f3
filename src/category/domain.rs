//! Core category domain types.

use serde::{Deserialize, Serialize};

/// Database identifier for a category.
pub type CategoryId = i64;

/// A spending category, e.g. 'Groceries' with a quantity and a limit.
///
/// Field names on the wire are the Portuguese labels existing clients send
/// and expect: `nome`, `quantidade` and `limite`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// The ID assigned by the database.
    pub id: CategoryId,
    /// The label shown to users.
    #[serde(rename = "nome")]
    pub name: String,
    /// The amount recorded against the category.
    #[serde(rename = "quantidade")]
    pub quantity: f64,
    /// The threshold for the category.
    #[serde(rename = "limite")]
    pub limit: i64,
}

/// The fields needed to create a category.
///
/// All three fields must be present, any other fields (such as `id`) are
/// ignored. No range or length checks are made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCategory {
    /// The label shown to users.
    #[serde(rename = "nome")]
    pub name: String,
    /// The amount recorded against the category.
    #[serde(rename = "quantidade")]
    pub quantity: f64,
    /// The threshold for the category.
    #[serde(rename = "limite")]
    pub limit: i64,
}

/// The body returned after inserting or deleting categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowsChanged {
    /// How many rows changed, e.g. "1 row(s) changed".
    pub message: String,
}

impl RowsChanged {
    /// A message reporting `count` changed rows.
    pub fn new(count: usize) -> Self {
        Self {
            message: format!("{count} row(s) changed"),
        }
    }
}
