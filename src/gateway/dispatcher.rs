use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use crate::gateway::GatewayEvent;

/// An authenticated live session. Exists only while the connection is up.
struct Session {
    user_id: Uuid,
    tenant_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

/// Connection registry with rooms per user and per tenant. All mutation goes
/// through register/unregister; fan-out reads a snapshot of the membership
/// and delivers over per-connection channels, so a slow client never blocks
/// a broadcast.
#[derive(Clone, Default)]
pub struct GatewayDispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    sessions: RwLock<HashMap<Uuid, Session>>,
    user_rooms: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
    tenant_rooms: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl GatewayDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated connection; joins rooms `user:{user_id}`
    /// and `tenant:{tenant_id}`. Returns the connection id and the event
    /// receiver for the connection's send loop.
    pub async fn register(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        self.inner.sessions.write().await.insert(
            conn_id,
            Session {
                user_id,
                tenant_id,
                tx,
            },
        );
        self.inner
            .user_rooms
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id);
        self.inner
            .tenant_rooms
            .write()
            .await
            .entry(tenant_id)
            .or_default()
            .insert(conn_id);

        debug!(conn_id = %conn_id, user_id = %user_id, "Gateway connection registered");

        (conn_id, rx)
    }

    /// Releases room membership for the connection. Safe to call more than
    /// once; the second call is a no-op.
    pub async fn unregister(&self, conn_id: Uuid) {
        let Some(session) = self.inner.sessions.write().await.remove(&conn_id) else {
            return;
        };

        let mut user_rooms = self.inner.user_rooms.write().await;
        if let Some(members) = user_rooms.get_mut(&session.user_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                user_rooms.remove(&session.user_id);
            }
        }
        drop(user_rooms);

        let mut tenant_rooms = self.inner.tenant_rooms.write().await;
        if let Some(members) = tenant_rooms.get_mut(&session.tenant_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                tenant_rooms.remove(&session.tenant_id);
            }
        }

        debug!(conn_id = %conn_id, user_id = %session.user_id, "Gateway connection released");
    }

    /// Emit to every live session of one user.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let members: Vec<Uuid> = self
            .inner
            .user_rooms
            .read()
            .await
            .get(&user_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();

        self.deliver(&members, event).await;
    }

    /// Emit to a single connection. Used for command replies that concern
    /// only the issuing session.
    pub async fn send_to_connection(&self, conn_id: Uuid, event: GatewayEvent) {
        if let Some(session) = self.inner.sessions.read().await.get(&conn_id) {
            let _ = session.tx.send(event);
        }
    }

    /// Emit to every live session of one tenant.
    pub async fn send_to_tenant(&self, tenant_id: Uuid, event: GatewayEvent) {
        let members: Vec<Uuid> = self
            .inner
            .tenant_rooms
            .read()
            .await
            .get(&tenant_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();

        self.deliver(&members, event).await;
    }

    /// Emit to every live session.
    pub async fn broadcast(&self, event: GatewayEvent) {
        let sessions = self.inner.sessions.read().await;
        for session in sessions.values() {
            let _ = session.tx.send(event.clone());
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn user_connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .user_rooms
            .read()
            .await
            .get(&user_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    async fn deliver(&self, members: &[Uuid], event: GatewayEvent) {
        let sessions = self.inner.sessions.read().await;
        for conn_id in members {
            if let Some(session) = sessions.get(conn_id) {
                // A closed receiver just means the connection is tearing
                // down; unregister will clean it up.
                let _ = session.tx.send(event.clone());
            }
        }
    }
}
