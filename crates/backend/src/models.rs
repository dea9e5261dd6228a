// Database models for Diesel
use std::fmt;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared_types::{Role, UnknownRole, UserResponse};
use uuid::Uuid;

/// Database representation of users
#[derive(Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub name: String,
    pub google_id: Option<String>,
    pub role: String, // stored as VARCHAR: "user", "admin"
    pub last_login_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = UnknownRole;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            google_id: row.google_id,
            role: row.role.parse()?,
            last_login_at: row.last_login_at,
            refresh_token: row.refresh_token,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Insertable struct for new users
#[derive(Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUserRow<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub password_hash: Option<&'a str>,
    pub name: &'a str,
    pub google_id: Option<&'a str>,
    pub role: &'a str,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a NewUser> for NewUserRow<'a> {
    fn from(user: &'a NewUser) -> Self {
        NewUserRow {
            id: user.id,
            email: &user.email,
            password_hash: user.password_hash.as_deref(),
            name: &user.name,
            google_id: user.google_id.as_deref(),
            role: user.role.as_str(),
            last_login_at: user.last_login_at,
        }
    }
}

/// A stored account. Never serialized: use [`User::to_response`] for
/// anything that leaves the process.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub name: String,
    pub google_id: Option<String>,
    pub role: Role,
    pub last_login_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn to_response(&self) -> UserResponse {
        UserResponse {
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &self.password_hash.as_ref().map(|_| "<redacted>"))
            .field("name", &self.name)
            .field("google_id", &self.google_id)
            .field("role", &self.role)
            .field("last_login_at", &self.last_login_at)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Input for creating a user. The id is assigned here, not by the database.
#[derive(Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub name: String,
    pub google_id: Option<String>,
    pub role: Role,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl NewUser {
    /// Email/password account.
    pub fn local(email: String, name: String, password_hash: String) -> Self {
        NewUser {
            id: Uuid::new_v4(),
            email,
            password_hash: Some(password_hash),
            name,
            google_id: None,
            role: Role::User,
            last_login_at: None,
        }
    }

    /// Account created on first Google login.
    pub fn google(email: String, name: String, google_id: String, now: DateTime<Utc>) -> Self {
        NewUser {
            id: Uuid::new_v4(),
            email,
            password_hash: None,
            name,
            google_id: Some(google_id),
            role: Role::User,
            last_login_at: Some(now),
        }
    }

    /// The record as a store would return it right after insertion.
    pub fn into_user(self, now: DateTime<Utc>) -> User {
        User {
            id: self.id,
            email: self.email,
            password_hash: self.password_hash,
            name: self.name,
            google_id: self.google_id,
            role: self.role,
            last_login_at: self.last_login_at,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Emails are compared and stored trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
