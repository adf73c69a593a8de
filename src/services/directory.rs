use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::user::{PublicUser, User, UserRef},
};

/// Read access to the users owned by the auth service.
#[derive(Clone)]
pub struct UserDirectory {
    db: DbPool,
}

impl UserDirectory {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Inserts a user record. Credentials live with the auth service, not here.
    pub async fn register_user(&self, display_name: &str, email: &str) -> Result<User, AppError> {
        let display_name = display_name.trim();
        let email = email.trim().to_lowercase();
        if display_name.is_empty() || email.is_empty() {
            return Err(AppError::bad_request("display name and email are required"));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            email,
            profile_image_url: None,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO users (id, display_name, email, profile_image_url, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&user.id)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.profile_image_url)
        .bind(user.created_at)
        .execute(&self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::bad_request("Email already registered")
            }
            other => AppError::Database(other),
        })?;
        Ok(user)
    }

    /// Case-insensitive exact match. Unknown addresses are simply absent from the result.
    pub async fn find_ids_by_emails(&self, emails: &[String]) -> Result<Vec<UserRef>, AppError> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, email FROM users WHERE lower(email) IN (");
        let mut separated = query.separated(", ");
        for email in emails {
            separated.push_bind(email.trim().to_lowercase());
        }
        separated.push_unseparated(") ORDER BY created_at");
        let users = query.build_query_as::<UserRef>().fetch_all(&self.db).await?;
        Ok(users)
    }

    pub async fn public_profile(&self, user_id: &str) -> Result<Option<PublicUser>, AppError> {
        let user = sqlx::query_as::<_, PublicUser>(
            "SELECT id, display_name, email FROM users WHERE id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    /// Profiles for `user_ids`, in the same order. Ids without a user are skipped.
    pub async fn public_profiles(&self, user_ids: &[String]) -> Result<Vec<PublicUser>, AppError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, display_name, email FROM users WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in user_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");
        let found = query
            .build_query_as::<PublicUser>()
            .fetch_all(&self.db)
            .await?;

        Ok(user_ids
            .iter()
            .filter_map(|id| found.iter().find(|user| &user.id == id).cloned())
            .collect())
    }
}
