use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::{Key, PrivateCookieJar};
use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use tracing::debug;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        session::Session,
        user::{PublicUser, User},
    },
    state::AppState,
};

pub const SESSION_COOKIE: &str = "triptab_session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub display_name: String,
    pub email: String,
}

impl AuthenticatedUser {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            email: self.email.clone(),
        }
    }
}

impl From<User> for AuthenticatedUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name,
            email: user.email,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(Self(Some(user.clone())));
        }

        let Some(token) = session_token(&parts.headers, &state.cookie_key) else {
            return Ok(Self(None));
        };
        match authenticate_token(&state.db, &token).await {
            Ok(user) => {
                parts.extensions.insert(user.clone());
                Ok(Self(Some(user)))
            }
            Err(AppError::Unauthorized) => Ok(Self(None)),
            Err(err) => Err(err),
        }
    }
}

impl CurrentUser {
    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthorized)
    }
}

/// `Authorization: Bearer <token>` wins over the session cookie.
pub fn session_token(headers: &HeaderMap, key: &Key) -> Option<String> {
    if let Some(token) = bearer_token(headers) {
        return Some(token.to_string());
    }
    PrivateCookieJar::from_headers(headers, key.clone())
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[derive(FromRow)]
struct SessionUserRow {
    expires_at: Option<DateTime<Utc>>,
    user_id: String,
    display_name: String,
    email: String,
}

/// Resolves a session token to its user. Unknown and expired sessions are `Unauthorized`.
pub async fn authenticate_token(db: &DbPool, token: &str) -> Result<AuthenticatedUser, AppError> {
    let row = sqlx::query_as::<_, SessionUserRow>(
        r#"SELECT s.expires_at, u.id AS user_id, u.display_name, u.email
           FROM sessions s JOIN users u ON u.id = s.user_id
           WHERE s.id = ?1"#,
    )
    .bind(token)
    .fetch_optional(db)
    .await?;

    let Some(row) = row else {
        debug!("unknown session token");
        return Err(AppError::Unauthorized);
    };
    let now = Utc::now();
    if row.expires_at.map(|expires| expires <= now).unwrap_or(false) {
        debug!(user_id = %row.user_id, "expired session token");
        return Err(AppError::Unauthorized);
    }

    sqlx::query("UPDATE sessions SET last_seen_at = ?1 WHERE id = ?2")
        .bind(now)
        .bind(token)
        .execute(db)
        .await?;

    Ok(AuthenticatedUser {
        id: row.user_id,
        display_name: row.display_name,
        email: row.email,
    })
}

/// Stores a session for `user_id`. Issuing it to a client is the auth service's job.
pub async fn create_session(
    db: &DbPool,
    user_id: &str,
    ttl: Option<Duration>,
) -> Result<Session, AppError> {
    let now = Utc::now();
    let session = Session {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        created_at: now,
        last_seen_at: now,
        expires_at: ttl.map(|ttl| now + ttl),
    };
    sqlx::query(
        "INSERT INTO sessions (id, user_id, created_at, last_seen_at, expires_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&session.id)
    .bind(&session.user_id)
    .bind(session.created_at)
    .bind(session.last_seen_at)
    .bind(session.expires_at)
    .execute(db)
    .await?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, services::directory::UserDirectory};
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn sessions_resolve_until_they_expire() {
        let pool = db::init_pool("sqlite::memory:").await.unwrap();
        db::migrate(&pool).await.unwrap();
        let user = UserDirectory::new(pool.clone())
            .register_user("Alice", "alice@x.com")
            .await
            .unwrap();

        let live = create_session(&pool, &user.id, None).await.unwrap();
        let authed = authenticate_token(&pool, &live.id).await.unwrap();
        assert_eq!(authed.id, user.id);
        assert_eq!(authed.display_name, "Alice");

        let expired = create_session(&pool, &user.id, Some(Duration::seconds(-5)))
            .await
            .unwrap();
        assert!(expired.is_expired(Utc::now()));
        assert!(matches!(
            authenticate_token(&pool, &expired.id).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            authenticate_token(&pool, "made-up").await,
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(bearer_token(&headers), None);
    }
}
