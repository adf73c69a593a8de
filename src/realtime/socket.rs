use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{auth::AuthenticatedUser, services::trip_service::TripService};

use super::session::{ChatSession, ServerEvent};

/// Drives one authenticated socket until either side hangs up.
pub async fn run(socket: WebSocket, user: AuthenticatedUser, service: TripService) {
    let user_id = user.id.clone();
    info!(user_id = %user_id, "realtime connection established");

    let (mut sender, mut receiver) = socket.split();
    let (outbound, mut queue) = mpsc::unbounded_channel::<ServerEvent>();

    let mut writer = tokio::spawn(async move {
        while let Some(event) = queue.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(json) => Message::Text(json),
                Err(err) => {
                    error!(error = %err, "failed to serialize server event");
                    continue;
                }
            };
            if sender.send(frame).await.is_err() {
                break;
            }
        }
        debug!("realtime writer finished");
    });

    let mut session = ChatSession::new(user, service, outbound);
    let reader = async {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => session.handle_frame(&text).await,
                Ok(Message::Binary(_)) => warn!(user_id = %user_id, "binary frame ignored"),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    debug!(user_id = %user_id, error = %err, "socket read failed");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = reader => debug!(user_id = %user_id, "client went away"),
        _ = &mut writer => debug!(user_id = %user_id, "writer stopped"),
    }

    session.leave().await;
    writer.abort();
    info!(user_id = %user_id, "realtime connection closed");
}
