use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{NaiveDate, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;

use wishbox_core::ids::Username;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRow {
    pub username: Username,
    pub name: String,
    pub surname: String,
    pub avatar: Option<String>,
    pub birthdate: NaiveDate,
    pub created_at: String,
}

/// Registration input. The password is digested before it touches the
/// database; the plaintext never leaves this call.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: Username,
    pub password: String,
    pub name: String,
    pub surname: String,
    pub avatar: Option<String>,
    pub birthdate: NaiveDate,
}

pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a user. If the username is already taken the insert is
    /// silently dropped (INSERT OR IGNORE) and the existing record wins.
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub fn register(&self, user: &NewUser) -> Result<(), StoreError> {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let digest = password_digest(&salt, &user.password);
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users
                     (username, password_digest, password_salt, name, surname, avatar, birthdate, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    user.username.as_str(),
                    digest,
                    B64.encode(salt),
                    user.name,
                    user.surname,
                    user.avatar,
                    user.birthdate.to_string(),
                    now,
                ],
            )?;
            Ok(())
        })
    }

    /// Get a user by username.
    #[instrument(skip(self), fields(username = %username))]
    pub fn get(&self, username: &Username) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, name, surname, avatar, birthdate, created_at
                 FROM users WHERE username = ?1",
            )?;
            let mut rows = stmt.query([username.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_user(row),
                None => Err(StoreError::NotFound(format!("user {username}"))),
            }
        })
    }

    pub fn exists(&self, username: &Username) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE username = ?1",
                [username.as_str()],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Check credentials. Wrong password and unknown user both come back
    /// as false; callers must check the boolean.
    #[instrument(skip(self, password), fields(username = %username))]
    pub fn authenticate(&self, username: &Username, password: &str) -> Result<bool, StoreError> {
        let stored: Option<(String, String)> = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT password_digest, password_salt FROM users WHERE username = ?1",
                    [username.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .ok())
        })?;

        let Some((digest, salt_b64)) = stored else {
            return Ok(false);
        };
        let salt = B64
            .decode(&salt_b64)
            .map_err(|e| StoreError::CorruptRow {
                table: "users",
                column: "password_salt",
                detail: e.to_string(),
            })?;
        Ok(password_digest(&salt, password) == digest)
    }

    /// Remove a user. No error if the username does not exist.
    #[instrument(skip(self), fields(username = %username))]
    pub fn delete(&self, username: &Username) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM users WHERE username = ?1", [username.as_str()])?;
            Ok(())
        })
    }
}

fn password_digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    B64.encode(hasher.finalize())
}

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<UserRow, StoreError> {
    let birthdate: String = row_helpers::get(row, 4, "users", "birthdate")?;
    Ok(UserRow {
        username: Username::new(row_helpers::get::<String>(row, 0, "users", "username")?),
        name: row_helpers::get(row, 1, "users", "name")?,
        surname: row_helpers::get(row, 2, "users", "surname")?,
        avatar: row_helpers::get_opt(row, 3, "users", "avatar")?,
        birthdate: row_helpers::parse_date(&birthdate, "users", "birthdate")?,
        created_at: row_helpers::get(row, 5, "users", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::in_memory().unwrap()
    }

    fn alice() -> NewUser {
        NewUser {
            username: Username::new("alice"),
            password: "hunter2".into(),
            name: "Alice".into(),
            surname: "Rossi".into(),
            avatar: None,
            birthdate: NaiveDate::from_ymd_opt(1994, 3, 21).unwrap(),
        }
    }

    #[test]
    fn register_and_get() {
        let repo = UserRepo::new(test_db());
        repo.register(&alice()).unwrap();
        let user = repo.get(&Username::new("alice")).unwrap();
        assert_eq!(user.name, "Alice");
        assert_eq!(user.birthdate, NaiveDate::from_ymd_opt(1994, 3, 21).unwrap());
    }

    #[test]
    fn duplicate_register_keeps_first_record() {
        let repo = UserRepo::new(test_db());
        repo.register(&alice()).unwrap();

        let mut imposter = alice();
        imposter.name = "Mallory".into();
        imposter.password = "other".into();
        repo.register(&imposter).unwrap();

        let user = repo.get(&Username::new("alice")).unwrap();
        assert_eq!(user.name, "Alice");
        // Original credentials still valid
        assert!(repo.authenticate(&Username::new("alice"), "hunter2").unwrap());
    }

    #[test]
    fn authenticate_good_and_bad_password() {
        let repo = UserRepo::new(test_db());
        repo.register(&alice()).unwrap();
        assert!(repo.authenticate(&Username::new("alice"), "hunter2").unwrap());
        assert!(!repo.authenticate(&Username::new("alice"), "wrong").unwrap());
    }

    #[test]
    fn authenticate_unknown_user_is_false_not_error() {
        let repo = UserRepo::new(test_db());
        assert!(!repo.authenticate(&Username::new("nobody"), "pw").unwrap());
    }

    #[test]
    fn password_not_stored_in_plaintext() {
        let db = test_db();
        let repo = UserRepo::new(db.clone());
        repo.register(&alice()).unwrap();
        let digest: String = db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT password_digest FROM users WHERE username = 'alice'",
                    [],
                    |row| row.get(0),
                )
                .map_err(StoreError::from)
            })
            .unwrap();
        assert_ne!(digest, "hunter2");
    }

    #[test]
    fn delete_is_idempotent() {
        let repo = UserRepo::new(test_db());
        repo.register(&alice()).unwrap();
        repo.delete(&Username::new("alice")).unwrap();
        // Second delete of a missing row is a no-op
        repo.delete(&Username::new("alice")).unwrap();
        assert!(!repo.exists(&Username::new("alice")).unwrap());
    }

    #[test]
    fn get_missing_user_is_not_found() {
        let repo = UserRepo::new(test_db());
        let result = repo.get(&Username::new("ghost"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
