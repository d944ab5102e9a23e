use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::gateway::{GatewayCommand, GatewayDispatcher, GatewayEvent};
use crate::store::Store;

/// Number of unread in-app notifications pushed on connect.
const INITIAL_SYNC_LIMIT: i64 = 10;

/// Drive one pre-authenticated WebSocket connection. The token was already
/// verified at the HTTP upgrade, so membership is granted immediately and
/// the initial unread batch is pushed before the command loop starts.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: GatewayDispatcher,
    store: Arc<dyn Store>,
    user_id: Uuid,
    tenant_id: Uuid,
) {
    let (mut sender, mut receiver) = socket.split();

    info!(user_id = %user_id, tenant_id = %tenant_id, "Gateway connection established");

    let (conn_id, mut event_rx) = dispatcher.register(user_id, tenant_id).await;

    // Initial sync: one event carrying the recent unread batch.
    let initial = match store.unread_in_app(user_id, INITIAL_SYNC_LIMIT).await {
        Ok(notifications) => GatewayEvent::Notifications { notifications },
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Initial unread sync failed");
            GatewayEvent::Error {
                message: "failed to load unread notifications".to_string(),
            }
        }
    };

    if send_event(&mut sender, &initial).await.is_err() {
        dispatcher.unregister(conn_id).await;
        return;
    }

    // Forward targeted/broadcast events to this client.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if send_event(&mut sender, &event).await.is_err() {
                break;
            }
        }
    });

    // Command loop: client-issued read-state queries and mutations.
    let command_dispatcher = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let event = match serde_json::from_str::<GatewayCommand>(&text) {
                Ok(command) => handle_command(command, store.as_ref(), user_id).await,
                Err(_) => GatewayEvent::Error {
                    message: "unrecognized command".to_string(),
                },
            };

            // Read-state changes are synced to every session of the user;
            // query results and errors answer only the issuing connection.
            match &event {
                GatewayEvent::MarkedAsRead { .. } | GatewayEvent::AllMarkedAsRead { .. } => {
                    command_dispatcher.send_to_user(user_id, event).await;
                }
                _ => command_dispatcher.send_to_connection(conn_id, event).await,
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister(conn_id).await;
    info!(user_id = %user_id, "Gateway connection closed");
}

/// Execute one client command against the caller's own records. Errors come
/// back as structured events; the connection is never torn down for them.
pub async fn handle_command(
    command: GatewayCommand,
    store: &dyn Store,
    user_id: Uuid,
) -> GatewayEvent {
    match command {
        GatewayCommand::MarkAsRead { notification_id } => {
            match store.mark_as_read(user_id, notification_id).await {
                Ok(notification) => GatewayEvent::MarkedAsRead { notification },
                Err(e) => GatewayEvent::Error {
                    message: e.to_string(),
                },
            }
        }
        GatewayCommand::MarkAllAsRead => match store.mark_all_as_read(user_id).await {
            Ok(updated) => GatewayEvent::AllMarkedAsRead { updated },
            Err(e) => GatewayEvent::Error {
                message: e.to_string(),
            },
        },
        GatewayCommand::GetNotifications => match store.notifications_for_user(user_id).await {
            Ok(notifications) => GatewayEvent::Notifications { notifications },
            Err(e) => GatewayEvent::Error {
                message: e.to_string(),
            },
        },
    }
}

async fn send_event<S>(sender: &mut S, event: &GatewayEvent) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let Ok(json) = serde_json::to_string(event) else {
        return Err(());
    };

    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}
