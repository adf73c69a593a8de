use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::{
    config::DEFAULT_HISTORY_LIMIT,
    db::DbPool,
    error::AppError,
    models::{
        message::{ChatMessage, ChatText},
        user::PublicUser,
    },
};

#[derive(FromRow)]
struct MessageRow {
    id: String,
    trip_id: String,
    text: String,
    created_at: DateTime<Utc>,
    author_id: String,
    author_name: String,
    author_email: String,
}

impl From<MessageRow> for ChatMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            trip_id: row.trip_id,
            author: PublicUser {
                id: row.author_id,
                display_name: row.author_name,
                email: row.author_email,
            },
            text: row.text,
            created_at: row.created_at,
        }
    }
}

/// Append-only chat log, one stream per trip.
#[derive(Clone)]
pub struct MessageStore {
    db: DbPool,
}

impl MessageStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn insert(&self, message: &ChatMessage) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO trip_messages (id, trip_id, user_id, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&message.id)
        .bind(&message.trip_id)
        .bind(&message.author.id)
        .bind(&message.text)
        .bind(message.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn append(
        &self,
        trip_id: &str,
        author: PublicUser,
        text: &str,
    ) -> Result<ChatMessage, AppError> {
        let message = ChatMessage::compose(trip_id, author, ChatText::try_from(text)?);
        self.insert(&message).await?;
        Ok(message)
    }

    /// The latest `limit` messages, oldest first. `limit` is clamped to `1..=100`.
    pub async fn history(&self, trip_id: &str, limit: i64) -> Result<Vec<ChatMessage>, AppError> {
        let limit = limit.clamp(1, DEFAULT_HISTORY_LIMIT);
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"SELECT m.id, m.trip_id, m.text, m.created_at,
                      u.id AS author_id, u.display_name AS author_name, u.email AS author_email
               FROM trip_messages m JOIN users u ON u.id = m.user_id
               WHERE m.trip_id = ?1
               ORDER BY m.created_at DESC, m.rowid DESC
               LIMIT ?2"#,
        )
        .bind(trip_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        let mut messages: Vec<ChatMessage> = rows.into_iter().map(ChatMessage::from).collect();
        messages.reverse();
        Ok(messages)
    }
}
