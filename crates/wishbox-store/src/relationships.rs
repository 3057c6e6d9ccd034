use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use wishbox_core::ids::Username;
use wishbox_core::RelationshipType;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Directional follow edge. The `followed` side is the viewer; the
/// `follower` side is the one whose events the viewer may see (this mirrors
/// the join in `EventRepo::potential_events_for`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipRow {
    pub follower: Username,
    pub followed: Username,
    pub rel_type: RelationshipType,
    pub created_at: String,
}

pub struct RelationshipRepo {
    db: Database,
}

impl RelationshipRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Add a relationship. At most one type per ordered pair: a second
    /// insert for the same (follower, followed) is silently ignored.
    #[instrument(skip(self), fields(follower = %follower, followed = %followed, rel_type = %rel_type))]
    pub fn insert(
        &self,
        follower: &Username,
        followed: &Username,
        rel_type: RelationshipType,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO relationships (follower, followed, type, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![follower.as_str(), followed.as_str(), rel_type.to_string(), now],
            )?;
            Ok(())
        })
    }

    /// Remove a relationship. No error if the pair does not exist.
    #[instrument(skip(self), fields(follower = %follower, followed = %followed))]
    pub fn delete(&self, follower: &Username, followed: &Username) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM relationships WHERE follower = ?1 AND followed = ?2",
                [follower.as_str(), followed.as_str()],
            )?;
            Ok(())
        })
    }

    /// Everyone the given viewer follows (rows where they appear as `followed`).
    #[instrument(skip(self), fields(viewer = %viewer))]
    pub fn followed_by(&self, viewer: &Username) -> Result<Vec<RelationshipRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT follower, followed, type, created_at FROM relationships
                 WHERE followed = ?1 ORDER BY follower",
            )?;
            let mut rows = stmt.query([viewer.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_relationship(row)?);
            }
            Ok(results)
        })
    }

    /// Relationship type for an ordered pair, if any.
    pub fn type_between(
        &self,
        follower: &Username,
        followed: &Username,
    ) -> Result<Option<RelationshipType>, StoreError> {
        self.db.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT type FROM relationships WHERE follower = ?1 AND followed = ?2",
                    [follower.as_str(), followed.as_str()],
                    |row| row.get(0),
                )
                .ok();
            raw.map(|s| row_helpers::parse_enum(&s, "relationships", "type"))
                .transpose()
        })
    }
}

fn row_to_relationship(row: &rusqlite::Row<'_>) -> Result<RelationshipRow, StoreError> {
    let raw_type: String = row_helpers::get(row, 2, "relationships", "type")?;
    Ok(RelationshipRow {
        follower: Username::new(row_helpers::get::<String>(row, 0, "relationships", "follower")?),
        followed: Username::new(row_helpers::get::<String>(row, 1, "relationships", "followed")?),
        rel_type: row_helpers::parse_enum(&raw_type, "relationships", "type")?,
        created_at: row_helpers::get(row, 3, "relationships", "created_at")?,
    })
}
