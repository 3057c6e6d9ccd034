pub mod ids;
pub mod relationship;

pub use ids::{EventId, ItemId, Username};
pub use relationship::RelationshipType;
