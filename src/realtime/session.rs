//! Per-connection chat state: which trip room the socket sits in and how client
//! events turn into Trip Service calls.
//!
//! The session never touches the socket. Outgoing events go through an unbounded
//! queue that the transport drains, so it can be driven directly in tests.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::{
    auth::AuthenticatedUser,
    models::message::{ChatMessage, ChatText},
    services::trip_service::TripService,
};

pub const JOIN_FIRST: &str = "Join the trip before sending messages";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinTrip {
        #[serde(default)]
        trip_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        #[serde(default)]
        trip_id: Option<String>,
        #[serde(default)]
        text: Option<String>,
        /// Opaque token echoed back in the `ack` event.
        #[serde(default)]
        ack: Option<Value>,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Joined { trip_id: String },
    Error { reason: String },
    Message { message: ChatMessage },
    Ack { ack: Option<Value>, message: ChatMessage },
}

impl ServerEvent {
    fn error(reason: impl Into<String>) -> Self {
        ServerEvent::Error {
            reason: reason.into(),
        }
    }
}

struct JoinedRoom {
    trip_id: String,
    forwarder: JoinHandle<()>,
}

pub struct ChatSession {
    user: AuthenticatedUser,
    service: TripService,
    outbound: mpsc::UnboundedSender<ServerEvent>,
    joined: Option<JoinedRoom>,
}

impl ChatSession {
    pub fn new(
        user: AuthenticatedUser,
        service: TripService,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            user,
            service,
            outbound,
            joined: None,
        }
    }

    pub fn user(&self) -> &AuthenticatedUser {
        &self.user
    }

    pub fn joined_trip(&self) -> Option<&str> {
        self.joined.as_ref().map(|room| room.trip_id.as_str())
    }

    /// Parses one text frame. Frames that are not a known event are ignored.
    pub async fn handle_frame(&mut self, frame: &str) {
        match serde_json::from_str::<ClientEvent>(frame) {
            Ok(event) => self.handle(event).await,
            Err(err) => debug!(user_id = %self.user.id, error = %err, "ignoring malformed frame"),
        }
    }

    pub async fn handle(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::JoinTrip { trip_id } => match non_blank(trip_id) {
                Some(trip_id) => self.join(trip_id).await,
                None => debug!(user_id = %self.user.id, "join-trip without tripId ignored"),
            },
            ClientEvent::SendMessage { trip_id, text, ack } => {
                match (non_blank(trip_id), non_blank(text)) {
                    (Some(trip_id), Some(text)) => self.send(trip_id, &text, ack).await,
                    _ => debug!(user_id = %self.user.id, "incomplete send-message ignored"),
                }
            }
        }
    }

    async fn join(&mut self, trip_id: String) {
        let mut stream = match self.service.join_room(&self.user, &trip_id).await {
            Ok(stream) => stream,
            Err(err) => {
                debug!(user_id = %self.user.id, trip_id = %trip_id, error = %err, "join refused");
                self.emit(ServerEvent::error(err.public_message()));
                return;
            }
        };

        self.leave().await;
        let outbound = self.outbound.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                if outbound.send(ServerEvent::Message { message }).is_err() {
                    break;
                }
            }
        });

        info!(user_id = %self.user.id, trip_id = %trip_id, "joined trip room");
        self.joined = Some(JoinedRoom {
            trip_id: trip_id.clone(),
            forwarder,
        });
        self.emit(ServerEvent::Joined { trip_id });
    }

    async fn send(&mut self, trip_id: String, text: &str, ack: Option<Value>) {
        if self.joined_trip() != Some(trip_id.as_str()) {
            self.emit(ServerEvent::error(JOIN_FIRST));
            return;
        }

        let text = match ChatText::try_from(text) {
            Ok(text) => text,
            Err(err) => {
                self.emit(ServerEvent::error(err.public_message()));
                return;
            }
        };

        match self.service.relay_message(&self.user, &trip_id, text).await {
            Ok(message) => self.emit(ServerEvent::Ack { ack, message }),
            Err(err) => {
                warn!(user_id = %self.user.id, trip_id = %trip_id, error = %err, "chat send rejected");
                self.emit(ServerEvent::error(err.public_message()));
            }
        }
    }

    /// Stops forwarding the current room, if any, and drops the room once it is empty.
    ///
    /// The forwarder owns the room receiver, so it has to be gone before pruning.
    pub async fn leave(&mut self) {
        if let Some(room) = self.joined.take() {
            room.forwarder.abort();
            if let Err(err) = room.forwarder.await {
                if !err.is_cancelled() {
                    warn!(user_id = %self.user.id, trip_id = %room.trip_id, error = %err, "chat forwarder failed");
                }
            }
            self.service.hub().prune(&room.trip_id);
        }
    }

    fn emit(&self, event: ServerEvent) {
        if self.outbound.send(event).is_err() {
            debug!(user_id = %self.user.id, "connection gone, event dropped");
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(room) = self.joined.take() {
            room.forwarder.abort();
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
