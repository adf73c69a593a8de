//! In-process chat rooms, one broadcast channel per trip.
//!
//! Rooms only exist while someone listens. Messages published to a room nobody
//! joined are dropped; the chat log is the durable copy.

use std::{pin::Pin, sync::Arc};

use dashmap::DashMap;
use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::warn;

use crate::{config::DEFAULT_ROOM_CAPACITY, models::message::ChatMessage};

pub type ChatStream = Pin<Box<dyn Stream<Item = ChatMessage> + Send>>;

#[derive(Clone)]
pub struct ChatHub {
    rooms: Arc<DashMap<String, broadcast::Sender<ChatMessage>>>,
    capacity: usize,
}

impl ChatHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, trip_id: &str) -> ChatStream {
        let rx = self
            .rooms
            .entry(trip_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let room = trip_id.to_string();
        let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
            Ok(message) => Some(message),
            Err(err) => {
                warn!(trip_id = %room, error = %err, "chat receiver lagged, messages skipped");
                None
            }
        });
        Box::pin(stream)
    }

    /// Delivers to everyone currently in the room and returns how many receivers got it.
    pub fn publish(&self, message: &ChatMessage) -> usize {
        let Some(tx) = self
            .rooms
            .get(&message.trip_id)
            .map(|entry| entry.value().clone())
        else {
            return 0;
        };

        match tx.send(message.clone()) {
            Ok(receivers) => receivers,
            Err(_) => {
                self.prune(&message.trip_id);
                0
            }
        }
    }

    /// Drops the room if its last listener is gone.
    pub fn prune(&self, trip_id: &str) {
        self.rooms
            .remove_if(trip_id, |_, tx| tx.receiver_count() == 0);
    }

    pub fn listeners(&self, trip_id: &str) -> usize {
        self.rooms
            .get(trip_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new(DEFAULT_ROOM_CAPACITY)
    }
}
