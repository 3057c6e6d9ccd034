use std::collections::BTreeMap;

use wishbox_core::ids::EventId;
use wishbox_core::RelationshipType;
use wishbox_store::events::EventRow;

/// Filter the potential events of a viewer down to the ones they are
/// entitled to see: an event survives iff the allow flag matching the
/// relationship type is set.
///
/// Set semantics: an event reached through two relationship categories
/// appears once. Pure and deterministic — callers re-run it in full on
/// every upstream change. Output is ordered by event id.
pub fn resolve(
    pairs: impl IntoIterator<Item = (EventRow, RelationshipType)>,
) -> Vec<EventRow> {
    let mut visible: BTreeMap<EventId, EventRow> = BTreeMap::new();
    for (event, rel_type) in pairs {
        if event.allows(rel_type) {
            visible.entry(event.id.clone()).or_insert(event);
        }
    }
    visible.into_values().collect()
}
