use tracing::{instrument, Instrument};

use wishbox_core::ids::{EventId, ItemId, Username};
use wishbox_core::RelationshipType;
use wishbox_store::events::{EventPatch, EventRepo, EventRow, NewEvent};
use wishbox_store::items::{ItemPatch, ItemRepo, ItemRow, NewItem};
use wishbox_store::relationships::RelationshipRepo;
use wishbox_store::users::{NewUser, UserRepo};
use wishbox_store::{Database, StoreError};

use crate::changes::{ChangeBus, Table};
use crate::error::EngineError;
use crate::live::LiveQuery;
use crate::resolver;
use crate::scope::TaskScope;

/// The repository façade the UI talks to. Context is explicit: every call
/// names the acting or viewing user, there is no ambient current-user
/// state. Mutations are dispatched onto the owned task scope and are
/// fire-and-forget; reads come back as live queries that re-emit on every
/// relevant commit.
pub struct App {
    db: Database,
    bus: ChangeBus,
    scope: TaskScope,
}

impl App {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            bus: ChangeBus::default(),
            scope: TaskScope::new(),
        }
    }

    /// Wait for all dispatched mutations to settle. Shutdown/test aid.
    pub async fn settle(&self) {
        self.scope.drain().await;
    }

    /// Dispatch a mutation as an independent unit of work. On success the
    /// touched table is announced on the bus; on failure the state change
    /// simply does not happen and a warning is logged. No retries.
    fn dispatch<F>(&self, table: Table, op: &'static str, f: F)
    where
        F: FnOnce(&Database) -> Result<(), StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        let bus = self.bus.clone();
        // Carry the caller's span into the task so a failure warn still
        // sits under the span that names the acting user.
        let span = tracing::Span::current();
        self.scope.spawn(
            async move {
                match f(&db) {
                    Ok(()) => bus.publish(table),
                    Err(e) => tracing::warn!(error = %e, op, "mutation failed"),
                }
            }
            .instrument(span),
        );
    }

    // ----- users -----

    #[instrument(skip(self, user), fields(username = %user.username))]
    pub fn register_user(&self, user: NewUser) {
        self.dispatch(Table::Users, "register_user", move |db| {
            UserRepo::new(db.clone()).register(&user)
        });
    }

    /// Credential check. Awaited by the caller; bad credentials are a
    /// plain false, never an error.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn login(&self, username: &Username, password: &str) -> Result<bool, EngineError> {
        Ok(UserRepo::new(self.db.clone()).authenticate(username, password)?)
    }

    #[instrument(skip(self), fields(username = %username))]
    pub fn unregister_user(&self, username: Username) {
        self.dispatch(Table::Users, "unregister_user", move |db| {
            UserRepo::new(db.clone()).delete(&username)
        });
    }

    // ----- relationships -----

    #[instrument(skip(self), fields(follower = %follower, followed = %followed, rel_type = %rel_type))]
    pub fn add_relationship(
        &self,
        follower: Username,
        followed: Username,
        rel_type: RelationshipType,
    ) {
        self.dispatch(Table::Relationships, "add_relationship", move |db| {
            RelationshipRepo::new(db.clone()).insert(&follower, &followed, rel_type)
        });
    }

    #[instrument(skip(self), fields(follower = %follower, followed = %followed))]
    pub fn remove_relationship(&self, follower: Username, followed: Username) {
        self.dispatch(Table::Relationships, "remove_relationship", move |db| {
            RelationshipRepo::new(db.clone()).delete(&follower, &followed)
        });
    }

    // ----- events -----

    #[instrument(skip(self, event), fields(organizer = %event.organizer, name = %event.name))]
    pub fn add_event(&self, event: NewEvent) {
        self.dispatch(Table::Events, "add_event", move |db| {
            EventRepo::new(db.clone()).insert(&event).map(|_| ())
        });
    }

    #[instrument(skip(self), fields(event_id = %id))]
    pub fn remove_event(&self, id: EventId) {
        self.dispatch(Table::Events, "remove_event", move |db| {
            EventRepo::new(db.clone()).delete(&id)
        });
    }

    #[instrument(skip(self, patch), fields(event_id = %id))]
    pub fn update_event(&self, id: EventId, patch: EventPatch) {
        self.dispatch(Table::Events, "update_event", move |db| {
            EventRepo::new(db.clone()).update(&id, &patch)
        });
    }

    /// The events a viewer is entitled to see, as a live set: three-way
    /// join for the potential events, then the visibility filter,
    /// recomputed in full whenever users, relationships or events change.
    pub fn events_of_user(
        &self,
        viewer: &Username,
    ) -> Result<LiveQuery<Vec<EventRow>>, EngineError> {
        let db = self.db.clone();
        let viewer = viewer.clone();
        LiveQuery::spawn(
            &self.bus,
            vec![Table::Users, Table::Relationships, Table::Events],
            move || {
                let pairs = EventRepo::new(db.clone()).potential_events_for(&viewer)?;
                Ok(resolver::resolve(pairs))
            },
        )
    }

    /// Events a user organizes themselves, as a live list.
    pub fn events_organized_by(
        &self,
        organizer: &Username,
    ) -> Result<LiveQuery<Vec<EventRow>>, EngineError> {
        let db = self.db.clone();
        let organizer = organizer.clone();
        LiveQuery::spawn(&self.bus, vec![Table::Users, Table::Events], move || {
            EventRepo::new(db.clone()).list_by_organizer(&organizer)
        })
    }

    // ----- items -----

    #[instrument(skip(self, item), fields(listed_by = %item.listed_by, name = %item.name))]
    pub fn add_item(&self, item: NewItem) {
        self.dispatch(Table::Items, "add_item", move |db| {
            ItemRepo::new(db.clone()).insert(&item).map(|_| ())
        });
    }

    #[instrument(skip(self), fields(item_id = %id))]
    pub fn delete_item(&self, id: ItemId) {
        self.dispatch(Table::Items, "delete_item", move |db| {
            ItemRepo::new(db.clone()).delete(&id)
        });
    }

    /// Partial item update: reserve, mark bought, edit details.
    #[instrument(skip(self, patch), fields(item_id = %id))]
    pub fn update_item(&self, id: ItemId, patch: ItemPatch) {
        self.dispatch(Table::Items, "update_item", move |db| {
            ItemRepo::new(db.clone()).update(&id, &patch)
        });
    }

    /// A user's wishlist as a live list.
    pub fn items_of_user(&self, owner: &Username) -> Result<LiveQuery<Vec<ItemRow>>, EngineError> {
        let db = self.db.clone();
        let owner = owner.clone();
        LiveQuery::spawn(&self.bus, vec![Table::Users, Table::Items], move || {
            ItemRepo::new(db.clone()).items_of_user(&owner)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::NaiveDate;
    use parking_lot::Mutex;

    fn app() -> App {
        App::new(Database::in_memory().unwrap())
    }

    fn user(name: &str) -> NewUser {
        NewUser {
            username: Username::new(name),
            password: format!("{name}-pw"),
            name: name.into(),
            surname: "Test".into(),
            avatar: None,
            birthdate: NaiveDate::from_ymd_opt(1992, 7, 4).unwrap(),
        }
    }

    fn event_by(organizer: &str, name: &str, friends: bool, colleagues: bool) -> NewEvent {
        NewEvent {
            name: name.into(),
            date: NaiveDate::from_ymd_opt(2026, 11, 20).unwrap(),
            location: None,
            organizer: Username::new(organizer),
            dress_code: None,
            friends_allowed: friends,
            family_allowed: false,
            partners_allowed: false,
            colleagues_allowed: colleagues,
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let app = app();
        app.register_user(user("alice"));
        app.settle().await;

        assert!(app.login(&Username::new("alice"), "alice-pw").await.unwrap());
        assert!(!app.login(&Username::new("alice"), "wrong").await.unwrap());
        assert!(!app.login(&Username::new("nobody"), "pw").await.unwrap());
    }

    #[tokio::test]
    async fn friend_visibility_end_to_end() {
        let app = app();
        app.register_user(user("alice"));
        app.register_user(user("bob"));
        // alice follows bob as a friend (viewer on the followed side)
        app.add_relationship(Username::new("bob"), Username::new("alice"), RelationshipType::Friend);
        app.add_event(event_by("bob", "open party", true, false));
        app.add_event(event_by("bob", "family dinner", false, false));
        app.settle().await;

        let feed = app.events_of_user(&Username::new("alice")).unwrap();
        let visible = feed.get();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "open party");
    }

    #[tokio::test]
    async fn feed_re_emits_after_new_event() {
        let app = app();
        app.register_user(user("alice"));
        app.register_user(user("bob"));
        app.add_relationship(Username::new("bob"), Username::new("alice"), RelationshipType::Friend);
        app.settle().await;

        let mut feed = app.events_of_user(&Username::new("alice")).unwrap();
        assert!(feed.get().is_empty());

        app.add_event(event_by("bob", "housewarming", true, false));
        let visible = feed.next().await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "housewarming");
    }

    #[tokio::test]
    async fn feed_re_emits_after_relationship_removed() {
        let app = app();
        app.register_user(user("alice"));
        app.register_user(user("bob"));
        app.add_relationship(Username::new("bob"), Username::new("alice"), RelationshipType::Friend);
        app.add_event(event_by("bob", "open party", true, false));
        app.settle().await;

        let mut feed = app.events_of_user(&Username::new("alice")).unwrap();
        assert_eq!(feed.get().len(), 1);

        app.remove_relationship(Username::new("bob"), Username::new("alice"));
        let visible = feed.next().await.unwrap();
        assert!(visible.is_empty());
    }

    #[tokio::test]
    async fn wishlist_updates_flow_to_live_query() {
        let app = app();
        app.register_user(user("alice"));
        app.register_user(user("bob"));
        app.add_item(NewItem {
            name: "record player".into(),
            description: None,
            url: None,
            image: None,
            price_lower: Some(80.0),
            price_upper: None,
            listed_by: Username::new("alice"),
        });
        app.settle().await;

        let mut wishlist = app.items_of_user(&Username::new("alice")).unwrap();
        let items = wishlist.get();
        assert_eq!(items.len(), 1);
        let id = items[0].id.clone();

        // bob reserves it
        app.update_item(
            id.clone(),
            ItemPatch { reserved_by: Some(Username::new("bob")), ..Default::default() },
        );
        let items = wishlist.next().await.unwrap();
        assert_eq!(items[0].reserved_by, Some(Username::new("bob")));

        // then marks it bought; everything else stays put
        app.update_item(id, ItemPatch { bought: Some(true), ..Default::default() });
        let items = wishlist.next().await.unwrap();
        assert!(items[0].bought);
        assert_eq!(items[0].name, "record player");
        assert_eq!(items[0].price_lower, Some(80.0));
    }

    #[tokio::test]
    async fn organized_events_live_query() {
        let app = app();
        app.register_user(user("bob"));
        app.add_event(event_by("bob", "birthday", false, false));
        app.settle().await;

        let organized = app.events_organized_by(&Username::new("bob")).unwrap();
        assert_eq!(organized.get().len(), 1);
    }

    #[tokio::test]
    async fn update_event_patch_applies() {
        let app = app();
        app.register_user(user("bob"));
        app.add_event(event_by("bob", "birthday", false, false));
        app.settle().await;

        let mut organized = app.events_organized_by(&Username::new("bob")).unwrap();
        let id = organized.get()[0].id.clone();

        app.update_event(
            id,
            EventPatch { friends_allowed: Some(true), location: Some("rooftop".into()), ..Default::default() },
        );
        let events = organized.next().await.unwrap();
        assert!(events[0].friends_allowed);
        assert_eq!(events[0].location.as_deref(), Some("rooftop"));
        assert_eq!(events[0].name, "birthday");
    }

    #[tokio::test]
    async fn unregistering_organizer_empties_follower_feed() {
        let app = app();
        app.register_user(user("alice"));
        app.register_user(user("bob"));
        app.add_relationship(Username::new("bob"), Username::new("alice"), RelationshipType::Friend);
        app.add_event(event_by("bob", "open party", true, false));
        app.settle().await;

        let mut feed = app.events_of_user(&Username::new("alice")).unwrap();
        assert_eq!(feed.get().len(), 1);

        app.unregister_user(Username::new("bob"));
        let visible = feed.next().await.unwrap();
        assert!(visible.is_empty());
    }

    #[tokio::test]
    async fn mutation_failure_leaves_state_unchanged() {
        let app = app();
        // No users registered: the event insert violates the organizer FK
        app.add_event(event_by("ghost", "phantom party", true, false));
        app.settle().await;

        let organized = app.events_organized_by(&Username::new("ghost")).unwrap();
        assert!(organized.get().is_empty());
    }

    /// Records the names of spans enclosing each warn+ event.
    struct WarnScopeCapture {
        spans: Arc<Mutex<Vec<String>>>,
    }

    impl<S> tracing_subscriber::Layer<S> for WarnScopeCapture
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() > tracing::Level::WARN {
                return;
            }
            if let Some(scope) = ctx.event_scope(event) {
                let mut spans = self.spans.lock();
                for span in scope {
                    spans.push(span.name().to_string());
                }
            }
        }
    }

    #[tokio::test]
    async fn failed_mutation_warns_inside_caller_span() {
        use tracing_subscriber::layer::SubscriberExt;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscriber =
            tracing_subscriber::registry().with(WarnScopeCapture { spans: seen.clone() });
        let _guard = tracing::subscriber::set_default(subscriber);

        let app = app();
        // Organizer FK violation: no users registered
        app.add_event(event_by("ghost", "phantom party", true, false));
        app.settle().await;

        assert!(seen.lock().iter().any(|name| name == "add_event"));
    }
}
