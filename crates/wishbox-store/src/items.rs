use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use wishbox_core::ids::{ItemId, Username};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A wishlist entry. `reserved_by` marks a gift claim by another user;
/// `bought` marks it as purchased.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemRow {
    pub id: ItemId,
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub image: Option<String>,
    pub price_lower: Option<f64>,
    pub price_upper: Option<f64>,
    pub listed_by: Username,
    pub reserved_by: Option<Username>,
    pub bought: bool,
    pub created_at: String,
}

#[derive(Clone, Debug)]
pub struct NewItem {
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub image: Option<String>,
    pub price_lower: Option<f64>,
    pub price_upper: Option<f64>,
    pub listed_by: Username,
}

/// Partial update for an item. `Some` overwrites, `None` leaves the column
/// alone. Clearing a reservation is a distinct flag because `reserved_by:
/// None` already means "unchanged".
#[derive(Clone, Debug, Default)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub image: Option<String>,
    pub price_lower: Option<f64>,
    pub price_upper: Option<f64>,
    pub reserved_by: Option<Username>,
    pub clear_reservation: bool,
    pub bought: Option<bool>,
}

pub struct ItemRepo {
    db: Database,
}

impl ItemRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert an item. An id collision is silently ignored.
    #[instrument(skip(self, item), fields(listed_by = %item.listed_by, name = %item.name))]
    pub fn insert(&self, item: &NewItem) -> Result<ItemId, StoreError> {
        let id = ItemId::new();
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO items
                     (id, name, description, url, image, price_lower, price_upper,
                      listed_by, reserved_by, bought, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, 0, ?9)",
                rusqlite::params![
                    id.as_str(),
                    item.name,
                    item.description,
                    item.url,
                    item.image,
                    item.price_lower,
                    item.price_upper,
                    item.listed_by.as_str(),
                    now,
                ],
            )?;
            Ok(id)
        })
    }

    /// Get an item by id.
    #[instrument(skip(self), fields(item_id = %id))]
    pub fn get(&self, id: &ItemId) -> Result<ItemRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"
            ))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_item(row),
                None => Err(StoreError::NotFound(format!("item {id}"))),
            }
        })
    }

    /// A user's wishlist, oldest entry first.
    #[instrument(skip(self), fields(owner = %owner))]
    pub fn items_of_user(&self, owner: &Username) -> Result<Vec<ItemRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM items WHERE listed_by = ?1 ORDER BY id"
            ))?;
            let mut rows = stmt.query([owner.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_item(row)?);
            }
            Ok(results)
        })
    }

    /// Apply a partial update. Unset fields keep their current value;
    /// a missing id matches zero rows and is not an error.
    #[instrument(skip(self, patch), fields(item_id = %id))]
    pub fn update(&self, id: &ItemId, patch: &ItemPatch) -> Result<(), StoreError> {
        let mut sets: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(name) = &patch.name {
            sets.push(format!("name = ?{}", params.len() + 1));
            params.push(Box::new(name.clone()));
        }
        if let Some(description) = &patch.description {
            sets.push(format!("description = ?{}", params.len() + 1));
            params.push(Box::new(description.clone()));
        }
        if let Some(url) = &patch.url {
            sets.push(format!("url = ?{}", params.len() + 1));
            params.push(Box::new(url.clone()));
        }
        if let Some(image) = &patch.image {
            sets.push(format!("image = ?{}", params.len() + 1));
            params.push(Box::new(image.clone()));
        }
        if let Some(price) = patch.price_lower {
            sets.push(format!("price_lower = ?{}", params.len() + 1));
            params.push(Box::new(price));
        }
        if let Some(price) = patch.price_upper {
            sets.push(format!("price_upper = ?{}", params.len() + 1));
            params.push(Box::new(price));
        }
        if patch.clear_reservation {
            sets.push("reserved_by = NULL".to_string());
        } else if let Some(reserved_by) = &patch.reserved_by {
            sets.push(format!("reserved_by = ?{}", params.len() + 1));
            params.push(Box::new(reserved_by.as_str().to_owned()));
        }
        if let Some(bought) = patch.bought {
            sets.push(format!("bought = ?{}", params.len() + 1));
            params.push(Box::new(bought));
        }

        if sets.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE items SET {} WHERE id = ?{}",
            sets.join(", "),
            params.len() + 1
        );
        params.push(Box::new(id.as_str().to_owned()));

        self.db.with_conn(|conn| {
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            conn.execute(&sql, param_refs.as_slice())?;
            Ok(())
        })
    }

    /// Remove an item by id. No error on a missing id.
    #[instrument(skip(self), fields(item_id = %id))]
    pub fn delete(&self, id: &ItemId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM items WHERE id = ?1", [id.as_str()])?;
            Ok(())
        })
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?)
        })
    }
}

const ITEM_COLUMNS: &str = "id, name, description, url, image, price_lower, price_upper, \
     listed_by, reserved_by, bought, created_at";

fn row_to_item(row: &rusqlite::Row<'_>) -> Result<ItemRow, StoreError> {
    Ok(ItemRow {
        id: ItemId::from_raw(row_helpers::get::<String>(row, 0, "items", "id")?),
        name: row_helpers::get(row, 1, "items", "name")?,
        description: row_helpers::get_opt(row, 2, "items", "description")?,
        url: row_helpers::get_opt(row, 3, "items", "url")?,
        image: row_helpers::get_opt(row, 4, "items", "image")?,
        price_lower: row_helpers::get_opt(row, 5, "items", "price_lower")?,
        price_upper: row_helpers::get_opt(row, 6, "items", "price_upper")?,
        listed_by: Username::new(row_helpers::get::<String>(row, 7, "items", "listed_by")?),
        reserved_by: row_helpers::get_opt::<String>(row, 8, "items", "reserved_by")?
            .map(Username::new),
        bought: row_helpers::get(row, 9, "items", "bought")?,
        created_at: row_helpers::get(row, 10, "items", "created_at")?,
    })
}
