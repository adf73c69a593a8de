use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The only user fields other members of a trip ever get to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub display_name: String,
    pub email: String,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name,
            email: user.email,
        }
    }
}

/// Result of resolving an email address through the user directory.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserRef {
    pub id: String,
    pub email: String,
}
