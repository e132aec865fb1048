use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::websocket::types::ServerEvent;

pub type WsSender = mpsc::UnboundedSender<ServerEvent>;

struct Connection {
    user_id: Uuid,
    tx: WsSender,
    rooms: HashSet<String>,
}

/// Registry of live WebSocket connections and the rooms they joined.
///
/// A user can hold several simultaneous connections (multiple tabs or
/// devices); `send_to_user` fans out to all of them. Rooms are named
/// routing channels, one per conversation, used for receipts, typing
/// notices and message delivery.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    connections: DashMap<Uuid, Connection>,
    users: DashMap<Uuid, HashSet<Uuid>>,
    rooms: DashMap<String, HashSet<Uuid>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: Uuid, conn_id: Uuid, tx: WsSender) {
        self.inner.connections.insert(
            conn_id,
            Connection {
                user_id,
                tx,
                rooms: HashSet::new(),
            },
        );
        self.inner
            .users
            .entry(user_id)
            .or_default()
            .insert(conn_id);
    }

    /// Removes the connection from every room and the user index. Returns
    /// how many connections the user still holds, so the caller knows
    /// whether this was their last one.
    pub fn unregister(&self, conn_id: Uuid) -> usize {
        let Some((_, connection)) = self.inner.connections.remove(&conn_id) else {
            return 0;
        };

        for room in &connection.rooms {
            if let Some(mut members) = self.inner.rooms.get_mut(room) {
                members.remove(&conn_id);
            }
        }
        self.inner.rooms.retain(|_, members| !members.is_empty());

        let remaining = match self.inner.users.get_mut(&connection.user_id) {
            Some(mut conns) => {
                conns.remove(&conn_id);
                conns.len()
            }
            None => 0,
        };

        if remaining == 0 {
            self.inner.users.remove(&connection.user_id);
        }

        remaining
    }

    pub fn join_room(&self, conn_id: Uuid, room: &str) {
        if let Some(mut connection) = self.inner.connections.get_mut(&conn_id) {
            connection.rooms.insert(room.to_string());
        } else {
            return;
        }
        self.inner
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(conn_id);
    }

    pub fn leave_room(&self, conn_id: Uuid, room: &str) {
        if let Some(mut connection) = self.inner.connections.get_mut(&conn_id) {
            connection.rooms.remove(room);
        }
        if let Some(mut members) = self.inner.rooms.get_mut(room) {
            members.remove(&conn_id);
        }
    }

    pub fn send_to_conn(&self, conn_id: Uuid, event: ServerEvent) {
        if let Some(connection) = self.inner.connections.get(&conn_id) {
            let _ = connection.tx.send(event);
        }
    }

    /// Delivers to every live connection of the user.
    pub fn send_to_user(&self, user_id: Uuid, event: ServerEvent) {
        let Some(conn_ids) = self
            .inner
            .users
            .get(&user_id)
            .map(|conns| conns.iter().copied().collect::<Vec<_>>())
        else {
            return;
        };

        for conn_id in conn_ids {
            self.send_to_conn(conn_id, event.clone());
        }
    }

    /// Delivers to every member of the room, optionally skipping one
    /// connection (the originator).
    pub fn send_to_room(&self, room: &str, skip: Option<Uuid>, event: ServerEvent) {
        let Some(conn_ids) = self
            .inner
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect::<Vec<_>>())
        else {
            return;
        };

        for conn_id in conn_ids {
            if Some(conn_id) == skip {
                continue;
            }
            self.send_to_conn(conn_id, event.clone());
        }
    }

    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .users
            .get(&user_id)
            .map(|conns| conns.len())
            .unwrap_or(0)
    }

    pub fn is_connected(&self, user_id: Uuid) -> bool {
        self.connection_count(user_id) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::mpsc::unbounded_channel;

    fn pong() -> ServerEvent {
        ServerEvent::Pong {
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fans_out_to_all_connections_of_a_user() {
        let manager = ConnectionManager::new();
        let user = Uuid::new_v4();
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();

        manager.register(user, Uuid::new_v4(), tx1);
        manager.register(user, Uuid::new_v4(), tx2);

        manager.send_to_user(user, pong());

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn room_send_skips_the_originator() {
        let manager = ConnectionManager::new();
        let (tx_a, mut rx_a) = unbounded_channel();
        let (tx_b, mut rx_b) = unbounded_channel();
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();

        manager.register(Uuid::new_v4(), conn_a, tx_a);
        manager.register(Uuid::new_v4(), conn_b, tx_b);
        manager.join_room(conn_a, "conversation_x");
        manager.join_room(conn_b, "conversation_x");

        manager.send_to_room("conversation_x", Some(conn_a), pong());

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn unregister_reports_remaining_connections() {
        let manager = ConnectionManager::new();
        let user = Uuid::new_v4();
        let conn_1 = Uuid::new_v4();
        let conn_2 = Uuid::new_v4();
        let (tx1, _rx1) = unbounded_channel();
        let (tx2, _rx2) = unbounded_channel();

        manager.register(user, conn_1, tx1);
        manager.register(user, conn_2, tx2);
        manager.join_room(conn_1, "conversation_x");

        assert_eq!(manager.unregister(conn_1), 1);
        assert!(manager.is_connected(user));
        assert_eq!(manager.unregister(conn_2), 0);
        assert!(!manager.is_connected(user));
    }

    #[tokio::test]
    async fn leaving_a_room_stops_delivery() {
        let manager = ConnectionManager::new();
        let conn = Uuid::new_v4();
        let (tx, mut rx) = unbounded_channel();

        manager.register(Uuid::new_v4(), conn, tx);
        manager.join_room(conn, "conversation_y");
        manager.leave_room(conn, "conversation_y");

        manager.send_to_room("conversation_y", None, pong());
        assert!(rx.try_recv().is_err());
    }
}
