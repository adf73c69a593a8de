//! Who may read or manage a trip.
//!
//! The predicates are pure and work on the small `{creator, participants, visibility}`
//! projection; `load` fetches that projection so HTTP handlers and realtime joins
//! go through exactly the same gate.

use crate::{db::DbPool, error::AppError, models::trip::Visibility};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripAccess {
    pub trip_id: String,
    pub creator_id: String,
    pub participants: Vec<String>,
    pub visibility: Visibility,
}

impl TripAccess {
    pub fn is_creator(&self, user_id: &str) -> bool {
        self.creator_id == user_id
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|id| id == user_id)
    }

    pub fn can_access(&self, user_id: &str) -> bool {
        match self.visibility {
            Visibility::Private => self.is_creator(user_id),
            Visibility::Group => self.is_creator(user_id) || self.is_participant(user_id),
        }
    }

    pub fn can_manage(&self, user_id: &str) -> bool {
        self.is_creator(user_id)
    }

    pub fn require_access(&self, user_id: &str) -> Result<(), AppError> {
        if self.can_access(user_id) {
            Ok(())
        } else {
            Err(AppError::forbidden("Access denied"))
        }
    }

    pub fn require_manage(&self, user_id: &str, action: &str) -> Result<(), AppError> {
        if self.can_manage(user_id) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!("Only the creator can {action}")))
        }
    }
}

pub async fn load(db: &DbPool, trip_id: &str) -> Result<TripAccess, AppError> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT creator_id, visibility FROM trips WHERE id = ?1")
            .bind(trip_id)
            .fetch_optional(db)
            .await?;
    let Some((creator_id, visibility)) = row else {
        return Err(AppError::not_found("Trip not found"));
    };

    let participants: Vec<String> = sqlx::query_scalar(
        "SELECT user_id FROM trip_participants WHERE trip_id = ?1 ORDER BY rowid",
    )
    .bind(trip_id)
    .fetch_all(db)
    .await?;

    Ok(TripAccess {
        trip_id: trip_id.to_string(),
        creator_id,
        participants,
        visibility: visibility.parse()?,
    })
}

/// Loads the trip and fails unless `user_id` may read it.
pub async fn authorize_read(
    db: &DbPool,
    trip_id: &str,
    user_id: &str,
) -> Result<TripAccess, AppError> {
    let access = load(db, trip_id).await?;
    access.require_access(user_id)?;
    Ok(access)
}

/// Loads the trip and fails unless `user_id` created it.
pub async fn authorize_manage(
    db: &DbPool,
    trip_id: &str,
    user_id: &str,
    action: &str,
) -> Result<TripAccess, AppError> {
    let access = load(db, trip_id).await?;
    access.require_manage(user_id, action)?;
    Ok(access)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(visibility: Visibility) -> TripAccess {
        TripAccess {
            trip_id: "t1".into(),
            creator_id: "alice".into(),
            participants: vec!["alice".into(), "bob".into()],
            visibility,
        }
    }

    #[test]
    fn group_trips_admit_creator_and_participants() {
        let access = trip(Visibility::Group);
        assert!(access.can_access("alice"));
        assert!(access.can_access("bob"));
        assert!(!access.can_access("mallory"));
    }

    #[test]
    fn private_trips_admit_only_the_creator() {
        let access = trip(Visibility::Private);
        assert!(access.can_access("alice"));
        assert!(!access.can_access("bob"));
        assert!(matches!(
            access.require_access("bob"),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn managing_ignores_visibility() {
        for visibility in [Visibility::Group, Visibility::Private] {
            let access = trip(visibility);
            assert!(access.can_manage("alice"));
            assert!(!access.can_manage("bob"));
        }
    }

    #[test]
    fn creator_counts_even_when_not_listed() {
        let access = TripAccess {
            participants: vec![],
            ..trip(Visibility::Group)
        };
        assert!(access.is_creator("alice"));
        assert!(!access.is_participant("alice"));
        assert!(access.can_access("alice"));
    }
}
