use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ensure_max_len, user::PublicUser};
use crate::error::AppError;

pub const MAX_MESSAGE_CHARS: usize = 500;

/// A chat message as delivered to clients, with the author already projected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub trip_id: String,
    pub author: PublicUser,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Builds a new message stamped with the current time. Nothing is persisted here.
    pub fn compose(
        trip_id: impl Into<String>,
        author: PublicUser,
        text: ChatText,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            trip_id: trip_id.into(),
            author,
            text: text.0,
            created_at: Utc::now(),
        }
    }
}

/// Chat text that is non-empty after trimming and within the length limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatText(String);

impl ChatText {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ChatText {
    type Error = AppError;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::bad_request("Message is required"));
        }
        ensure_max_len(trimmed, "message", MAX_MESSAGE_CHARS)?;
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PostMessageRequest {
    #[serde(default, alias = "message")]
    pub text: String,
}
