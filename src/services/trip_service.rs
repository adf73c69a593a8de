//! The façade HTTP handlers and realtime sessions call into.
//!
//! Chat has two write paths. `post_message` (HTTP) broadcasts and then waits for
//! the insert, so the caller learns about storage failures. `relay_message`
//! (realtime) broadcasts and hands the insert to a background task: live viewers
//! get the message immediately and a failed insert only shows up in the logs.

use tracing::{debug, error};

use crate::{
    access,
    auth::AuthenticatedUser,
    db::DbPool,
    error::AppError,
    models::{
        ledger::{Expense, Income, NewExpense, NewIncome},
        message::{ChatMessage, ChatText},
        trip::{NewPlace, NewTrip, ParticipantEmails, Place, Trip, TripDetail, TripStats, Visibility},
    },
    realtime::hub::{ChatHub, ChatStream},
    services::{directory::UserDirectory, messages::MessageStore, trips::TripStore},
};

#[derive(Clone)]
pub struct TripService {
    db: DbPool,
    trips: TripStore,
    messages: MessageStore,
    hub: ChatHub,
    history_limit: i64,
}

impl TripService {
    pub fn new(db: DbPool, hub: ChatHub, history_limit: i64) -> Self {
        let directory = UserDirectory::new(db.clone());
        Self {
            trips: TripStore::new(db.clone(), directory),
            messages: MessageStore::new(db.clone()),
            db,
            hub,
            history_limit,
        }
    }

    pub fn hub(&self) -> &ChatHub {
        &self.hub
    }

    pub fn directory(&self) -> &UserDirectory {
        self.trips.directory()
    }

    pub async fn create_trip(&self, user: &AuthenticatedUser, new: NewTrip) -> Result<Trip, AppError> {
        self.trips.create(&user.id, new).await
    }

    pub async fn list_trips(&self, user: &AuthenticatedUser) -> Result<Vec<Trip>, AppError> {
        self.trips.list_for_user(&user.id).await
    }

    pub async fn get_trip(&self, user: &AuthenticatedUser, trip_id: &str) -> Result<TripDetail, AppError> {
        self.trips.get(trip_id, &user.id).await
    }

    pub async fn link_expense(
        &self,
        user: &AuthenticatedUser,
        trip_id: &str,
        new: NewExpense,
    ) -> Result<Expense, AppError> {
        self.trips.link_expense(trip_id, &user.id, new).await
    }

    pub async fn link_income(
        &self,
        user: &AuthenticatedUser,
        trip_id: &str,
        new: NewIncome,
    ) -> Result<Income, AppError> {
        self.trips.link_income(trip_id, &user.id, new).await
    }

    pub async fn add_participants(
        &self,
        user: &AuthenticatedUser,
        trip_id: &str,
        emails: ParticipantEmails,
    ) -> Result<Trip, AppError> {
        self.trips
            .add_participants_by_email(trip_id, &user.id, &emails)
            .await
    }

    pub async fn remove_participant(
        &self,
        user: &AuthenticatedUser,
        trip_id: &str,
        target_user_id: &str,
    ) -> Result<Trip, AppError> {
        self.trips
            .remove_participant(trip_id, &user.id, target_user_id)
            .await
    }

    pub async fn add_place(
        &self,
        user: &AuthenticatedUser,
        trip_id: &str,
        place: NewPlace,
    ) -> Result<Trip, AppError> {
        self.trips.add_place(trip_id, &user.id, place).await
    }

    pub async fn set_place_visited(
        &self,
        user: &AuthenticatedUser,
        trip_id: &str,
        place_id: &str,
        visited: bool,
    ) -> Result<Place, AppError> {
        self.trips
            .set_place_visited(trip_id, &user.id, place_id, visited)
            .await
    }

    pub async fn trip_stats(&self, user: &AuthenticatedUser, trip_id: &str) -> Result<TripStats, AppError> {
        self.trips.compute_stats(trip_id, &user.id).await
    }

    pub async fn set_visibility(
        &self,
        user: &AuthenticatedUser,
        trip_id: &str,
        visibility: Visibility,
    ) -> Result<Visibility, AppError> {
        self.trips.set_visibility(trip_id, &user.id, visibility).await
    }

    pub async fn chat_history(
        &self,
        user: &AuthenticatedUser,
        trip_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<ChatMessage>, AppError> {
        access::authorize_read(&self.db, trip_id, &user.id).await?;
        self.messages
            .history(trip_id, limit.unwrap_or(self.history_limit))
            .await
    }

    pub async fn post_message(
        &self,
        user: &AuthenticatedUser,
        trip_id: &str,
        text: &str,
    ) -> Result<ChatMessage, AppError> {
        access::authorize_read(&self.db, trip_id, &user.id).await?;
        let message = ChatMessage::compose(trip_id, user.public(), ChatText::try_from(text)?);
        let delivered = self.hub.publish(&message);
        debug!(trip_id, delivered, "chat message broadcast");
        self.messages.insert(&message).await?;
        Ok(message)
    }

    /// Authorizes a realtime join and returns the room's message stream.
    pub async fn join_room(&self, user: &AuthenticatedUser, trip_id: &str) -> Result<ChatStream, AppError> {
        access::authorize_read(&self.db, trip_id, &user.id).await?;
        Ok(self.hub.subscribe(trip_id))
    }

    /// Broadcasts right away and persists in the background. Never waits for the insert.
    pub async fn relay_message(
        &self,
        user: &AuthenticatedUser,
        trip_id: &str,
        text: ChatText,
    ) -> Result<ChatMessage, AppError> {
        access::authorize_read(&self.db, trip_id, &user.id).await?;
        let message = ChatMessage::compose(trip_id, user.public(), text);
        let delivered = self.hub.publish(&message);
        debug!(trip_id, delivered, "chat message relayed");

        let messages = self.messages.clone();
        let pending = message.clone();
        tokio::spawn(async move {
            if let Err(err) = messages.insert(&pending).await {
                error!(
                    trip_id = %pending.trip_id,
                    message_id = %pending.id,
                    error = %err,
                    "failed to persist relayed chat message"
                );
            }
        });

        Ok(message)
    }
}
