use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use wishbox_core::ids::{EventId, Username};
use wishbox_core::RelationshipType;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub id: EventId,
    pub name: String,
    pub date: NaiveDate,
    pub location: Option<String>,
    pub organizer: Username,
    pub dress_code: Option<String>,
    pub friends_allowed: bool,
    pub family_allowed: bool,
    pub partners_allowed: bool,
    pub colleagues_allowed: bool,
    pub created_at: String,
}

impl EventRow {
    /// Whether a viewer connected through the given relationship category
    /// is allowed to see this event. Exhaustive on purpose: a new
    /// relationship variant must pick its flag here before this compiles.
    pub fn allows(&self, rel_type: RelationshipType) -> bool {
        match rel_type {
            RelationshipType::Friend => self.friends_allowed,
            RelationshipType::Family => self.family_allowed,
            RelationshipType::Partner => self.partners_allowed,
            RelationshipType::Colleague => self.colleagues_allowed,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewEvent {
    pub name: String,
    pub date: NaiveDate,
    pub location: Option<String>,
    pub organizer: Username,
    pub dress_code: Option<String>,
    pub friends_allowed: bool,
    pub family_allowed: bool,
    pub partners_allowed: bool,
    pub colleagues_allowed: bool,
}

/// Partial update for an event. `Some` overwrites, `None` leaves the column
/// alone. Same contract as `ItemPatch`.
#[derive(Clone, Debug, Default)]
pub struct EventPatch {
    pub name: Option<String>,
    pub date: Option<NaiveDate>,
    pub location: Option<String>,
    pub dress_code: Option<String>,
    pub friends_allowed: Option<bool>,
    pub family_allowed: Option<bool>,
    pub partners_allowed: Option<bool>,
    pub colleagues_allowed: Option<bool>,
}

pub struct EventRepo {
    db: Database,
}

impl EventRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert an event. An id collision is silently ignored; the existing
    /// record wins.
    #[instrument(skip(self, event), fields(organizer = %event.organizer, name = %event.name))]
    pub fn insert(&self, event: &NewEvent) -> Result<EventId, StoreError> {
        let id = EventId::new();
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO events
                     (id, name, date, location, organizer, dress_code,
                      friends_allowed, family_allowed, partners_allowed, colleagues_allowed,
                      created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    id.as_str(),
                    event.name,
                    event.date.to_string(),
                    event.location,
                    event.organizer.as_str(),
                    event.dress_code,
                    event.friends_allowed,
                    event.family_allowed,
                    event.partners_allowed,
                    event.colleagues_allowed,
                    now,
                ],
            )?;
            Ok(id)
        })
    }

    /// Get an event by id.
    #[instrument(skip(self), fields(event_id = %id))]
    pub fn get(&self, id: &EventId) -> Result<EventRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"
            ))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_event(row),
                None => Err(StoreError::NotFound(format!("event {id}"))),
            }
        })
    }

    /// Events organized by a user, soonest first.
    #[instrument(skip(self), fields(organizer = %organizer))]
    pub fn list_by_organizer(&self, organizer: &Username) -> Result<Vec<EventRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE organizer = ?1 ORDER BY date, id"
            ))?;
            let mut rows = stmt.query([organizer.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_event(row)?);
            }
            Ok(results)
        })
    }

    /// All events a viewer could see if every allow flag were true, paired
    /// with the relationship type connecting them to the organizer. Three-way
    /// join: the viewer sits on the `followed` side of the relationship, the
    /// organizer on the `follower` side. Flag filtering happens in the
    /// resolver, not here.
    #[instrument(skip(self), fields(viewer = %viewer))]
    pub fn potential_events_for(
        &self,
        viewer: &Username,
    ) -> Result<Vec<(EventRow, RelationshipType)>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS_QUALIFIED}, relationships.type
                 FROM users
                 JOIN relationships ON users.username = relationships.followed
                 JOIN events ON relationships.follower = events.organizer
                 WHERE users.username = ?1
                 ORDER BY events.id"
            ))?;
            let mut rows = stmt.query([viewer.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                let event = row_to_event(row)?;
                let raw_type: String = row_helpers::get(row, 11, "relationships", "type")?;
                let rel_type = row_helpers::parse_enum(&raw_type, "relationships", "type")?;
                results.push((event, rel_type));
            }
            Ok(results)
        })
    }

    /// Apply a partial update. Unset fields keep their current value;
    /// a missing id matches zero rows and is not an error.
    #[instrument(skip(self, patch), fields(event_id = %id))]
    pub fn update(&self, id: &EventId, patch: &EventPatch) -> Result<(), StoreError> {
        let mut sets: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(name) = &patch.name {
            sets.push(format!("name = ?{}", params.len() + 1));
            params.push(Box::new(name.clone()));
        }
        if let Some(date) = &patch.date {
            sets.push(format!("date = ?{}", params.len() + 1));
            params.push(Box::new(date.to_string()));
        }
        if let Some(location) = &patch.location {
            sets.push(format!("location = ?{}", params.len() + 1));
            params.push(Box::new(location.clone()));
        }
        if let Some(dress_code) = &patch.dress_code {
            sets.push(format!("dress_code = ?{}", params.len() + 1));
            params.push(Box::new(dress_code.clone()));
        }
        if let Some(allowed) = patch.friends_allowed {
            sets.push(format!("friends_allowed = ?{}", params.len() + 1));
            params.push(Box::new(allowed));
        }
        if let Some(allowed) = patch.family_allowed {
            sets.push(format!("family_allowed = ?{}", params.len() + 1));
            params.push(Box::new(allowed));
        }
        if let Some(allowed) = patch.partners_allowed {
            sets.push(format!("partners_allowed = ?{}", params.len() + 1));
            params.push(Box::new(allowed));
        }
        if let Some(allowed) = patch.colleagues_allowed {
            sets.push(format!("colleagues_allowed = ?{}", params.len() + 1));
            params.push(Box::new(allowed));
        }

        if sets.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE events SET {} WHERE id = ?{}",
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

    /// Remove an event by id. No error on a missing id.
    #[instrument(skip(self), fields(event_id = %id))]
    pub fn delete(&self, id: &EventId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM events WHERE id = ?1", [id.as_str()])?;
            Ok(())
        })
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?)
        })
    }
}

const EVENT_COLUMNS: &str = "id, name, date, location, organizer, dress_code, \
     friends_allowed, family_allowed, partners_allowed, colleagues_allowed, created_at";

const EVENT_COLUMNS_QUALIFIED: &str = "events.id, events.name, events.date, events.location, \
     events.organizer, events.dress_code, events.friends_allowed, events.family_allowed, \
     events.partners_allowed, events.colleagues_allowed, events.created_at";

fn row_to_event(row: &rusqlite::Row<'_>) -> Result<EventRow, StoreError> {
    let date: String = row_helpers::get(row, 2, "events", "date")?;
    Ok(EventRow {
        id: EventId::from_raw(row_helpers::get::<String>(row, 0, "events", "id")?),
        name: row_helpers::get(row, 1, "events", "name")?,
        date: row_helpers::parse_date(&date, "events", "date")?,
        location: row_helpers::get_opt(row, 3, "events", "location")?,
        organizer: Username::new(row_helpers::get::<String>(row, 4, "events", "organizer")?),
        dress_code: row_helpers::get_opt(row, 5, "events", "dress_code")?,
        friends_allowed: row_helpers::get(row, 6, "events", "friends_allowed")?,
        family_allowed: row_helpers::get(row, 7, "events", "family_allowed")?,
        partners_allowed: row_helpers::get(row, 8, "events", "partners_allowed")?,
        colleagues_allowed: row_helpers::get(row, 9, "events", "colleagues_allowed")?,
        created_at: row_helpers::get(row, 10, "events", "created_at")?,
    })
}
