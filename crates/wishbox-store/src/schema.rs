/// SQL DDL for the wishbox database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    username TEXT PRIMARY KEY,
    password_digest TEXT NOT NULL,
    password_salt TEXT NOT NULL,
    name TEXT NOT NULL,
    surname TEXT NOT NULL,
    avatar TEXT,
    birthdate TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS relationships (
    follower TEXT NOT NULL REFERENCES users(username) ON DELETE CASCADE,
    followed TEXT NOT NULL REFERENCES users(username) ON DELETE CASCADE,
    type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (follower, followed)
);

CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    date TEXT NOT NULL,
    location TEXT,
    organizer TEXT NOT NULL REFERENCES users(username) ON DELETE CASCADE,
    dress_code TEXT,
    friends_allowed INTEGER NOT NULL DEFAULT 0,
    family_allowed INTEGER NOT NULL DEFAULT 0,
    partners_allowed INTEGER NOT NULL DEFAULT 0,
    colleagues_allowed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    url TEXT,
    image TEXT,
    price_lower REAL,
    price_upper REAL,
    listed_by TEXT NOT NULL REFERENCES users(username) ON DELETE CASCADE,
    reserved_by TEXT,
    bought INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_relationships_followed ON relationships(followed);
CREATE INDEX IF NOT EXISTS idx_events_organizer ON events(organizer);
CREATE INDEX IF NOT EXISTS idx_events_date ON events(date);
CREATE INDEX IF NOT EXISTS idx_items_listed_by ON items(listed_by);
CREATE INDEX IF NOT EXISTS idx_items_reserved_by ON items(reserved_by);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
