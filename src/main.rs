use std::path::PathBuf;

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use wishbox_core::ids::{EventId, ItemId, Username};
use wishbox_core::RelationshipType;
use wishbox_engine::App;
use wishbox_store::events::NewEvent;
use wishbox_store::items::{ItemPatch, NewItem};
use wishbox_store::users::NewUser;
use wishbox_store::Database;
use wishbox_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser)]
#[command(name = "wishbox", about = "Social gifting: events, wishlists, reservations")]
struct Cli {
    /// Database file. Defaults to ~/.wishbox/database/wishbox.db
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account
    Register {
        username: String,
        password: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        surname: String,
        /// Birthdate, YYYY-MM-DD
        #[arg(long)]
        birthdate: String,
    },
    /// Check credentials
    Login { username: String, password: String },
    /// Let a viewer follow an organizer under a relationship category
    Follow {
        /// The organizer whose events become potentially visible
        organizer: String,
        /// The viewer
        viewer: String,
        /// friend | family | partner | colleague
        rel_type: String,
    },
    /// Create an event
    AddEvent {
        organizer: String,
        name: String,
        /// Event date, YYYY-MM-DD
        date: String,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        dress_code: Option<String>,
        #[arg(long)]
        friends: bool,
        #[arg(long)]
        family: bool,
        #[arg(long)]
        partners: bool,
        #[arg(long)]
        colleagues: bool,
    },
    /// Delete an event
    RemoveEvent { event_id: String },
    /// Add a wishlist item
    AddItem {
        owner: String,
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        price_lower: Option<f64>,
        #[arg(long)]
        price_upper: Option<f64>,
    },
    /// Reserve an item for gifting
    Reserve { item_id: String, by: String },
    /// Mark an item as bought
    Bought { item_id: String },
    /// Events visible to a viewer
    Feed { viewer: String },
    /// A user's wishlist
    Wishlist { user: String },
    /// Events organized by a user
    Events { organizer: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = home_dir().join(".wishbox").join("database");
    let _guard = init_telemetry(TelemetryConfig {
        log_db_path: data_dir.join("logs.db"),
        ..Default::default()
    });

    let db_path = cli.db.unwrap_or_else(|| data_dir.join("wishbox.db"));
    let db = Database::open(&db_path).context("open database")?;
    tracing::debug!(path = %db_path.display(), "wishbox ready");
    let app = App::new(db);

    match cli.command {
        Command::Register { username, password, name, surname, birthdate } => {
            let birthdate: NaiveDate = birthdate.parse().context("birthdate must be YYYY-MM-DD")?;
            app.register_user(NewUser {
                username: Username::new(username),
                password,
                name,
                surname,
                avatar: None,
                birthdate,
            });
        }
        Command::Login { username, password } => {
            let ok = app.login(&Username::new(username), &password).await?;
            println!("{}", if ok { "ok" } else { "invalid credentials" });
        }
        Command::Follow { organizer, viewer, rel_type } => {
            let rel_type: RelationshipType = rel_type.parse().map_err(|e: String| anyhow!(e))?;
            app.add_relationship(Username::new(organizer), Username::new(viewer), rel_type);
        }
        Command::AddEvent {
            organizer, name, date, location, dress_code,
            friends, family, partners, colleagues,
        } => {
            let date: NaiveDate = date.parse().context("date must be YYYY-MM-DD")?;
            app.add_event(NewEvent {
                name,
                date,
                location,
                organizer: Username::new(organizer),
                dress_code,
                friends_allowed: friends,
                family_allowed: family,
                partners_allowed: partners,
                colleagues_allowed: colleagues,
            });
        }
        Command::RemoveEvent { event_id } => {
            app.remove_event(EventId::from_raw(event_id));
        }
        Command::AddItem { owner, name, description, url, price_lower, price_upper } => {
            app.add_item(NewItem {
                name,
                description,
                url,
                image: None,
                price_lower,
                price_upper,
                listed_by: Username::new(owner),
            });
        }
        Command::Reserve { item_id, by } => {
            app.update_item(
                ItemId::from_raw(item_id),
                ItemPatch { reserved_by: Some(Username::new(by)), ..Default::default() },
            );
        }
        Command::Bought { item_id } => {
            app.update_item(
                ItemId::from_raw(item_id),
                ItemPatch { bought: Some(true), ..Default::default() },
            );
        }
        Command::Feed { viewer } => {
            let feed = app.events_of_user(&Username::new(viewer))?;
            for event in feed.get() {
                println!(
                    "{}  {}  {}  by {}{}",
                    event.id,
                    event.date,
                    event.name,
                    event.organizer,
                    event.location.map(|l| format!("  @ {l}")).unwrap_or_default(),
                );
            }
        }
        Command::Wishlist { user } => {
            let wishlist = app.items_of_user(&Username::new(user))?;
            for item in wishlist.get() {
                let status = if item.bought {
                    "bought".to_string()
                } else if let Some(by) = &item.reserved_by {
                    format!("reserved by {by}")
                } else {
                    "open".to_string()
                };
                println!("{}  {}  [{status}]", item.id, item.name);
            }
        }
        Command::Events { organizer } => {
            let organized = app.events_organized_by(&Username::new(organizer))?;
            for event in organized.get() {
                println!("{}  {}  {}", event.id, event.date, event.name);
            }
        }
    }

    // Let dispatched mutations land before the process exits.
    app.settle().await;
    Ok(())
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
