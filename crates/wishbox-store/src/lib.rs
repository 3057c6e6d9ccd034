pub mod database;
pub mod error;
pub mod events;
pub mod items;
pub mod relationships;
pub mod row_helpers;
pub mod schema;
pub mod users;

pub use database::Database;
pub use error::StoreError;
