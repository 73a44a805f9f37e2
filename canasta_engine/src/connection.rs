//! Connection Multiplexer: `connId -> transport handle` and a
//! `token <-> connId` bimap, with device-switch eviction. Generic over an
//! opaque transport-handle type so the engine crate is unit-testable
//! without an Axum/WebSocket dependency; `canasta_server` instantiates it
//! with a handle wrapping an `mpsc::UnboundedSender<Message>`.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::RwLock;

/// Invariant maintained after every operation: the token<->connection
/// relation is a partial function in both directions — at most one live
/// connId per token, at most one token per connId.
#[derive(Default)]
pub struct ConnectionMultiplexer<ConnId, H> {
    connections: RwLock<HashMap<ConnId, H>>,
    conn_to_token: RwLock<HashMap<ConnId, String>>,
    token_to_conn: RwLock<HashMap<String, ConnId>>,
}

impl<ConnId, H> ConnectionMultiplexer<ConnId, H>
where
    ConnId: Eq + Hash + Clone,
    H: Clone,
{
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            conn_to_token: RwLock::new(HashMap::new()),
            token_to_conn: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection with no associated token yet (used before the
    /// client has authenticated via `create_game`/`join_game`/`reconnect`).
    pub async fn add_connection(&self, conn_id: ConnId, handle: H) {
        self.connections.write().await.insert(conn_id, handle);
    }

    /// Register a connection already bound to a token. If another
    /// connection currently holds that token, evict it: the old connId is
    /// returned so the caller can send `disconnected_elsewhere` and close
    /// it. The token->connection mapping is overwritten with `conn_id`.
    pub async fn add_connection_with_token(
        &self,
        conn_id: ConnId,
        handle: H,
        token: String,
    ) -> Option<ConnId> {
        self.connections.write().await.insert(conn_id.clone(), handle);

        let old_conn = self.token_to_conn.write().await.insert(token.clone(), conn_id.clone());
        if let Some(old) = &old_conn {
            self.conn_to_token.write().await.remove(old);
        }
        self.conn_to_token.write().await.insert(conn_id, token);
        old_conn
    }

    pub async fn remove_connection(&self, conn_id: &ConnId) {
        self.connections.write().await.remove(conn_id);
        if let Some(token) = self.conn_to_token.write().await.remove(conn_id) {
            let mut token_to_conn = self.token_to_conn.write().await;
            // Only remove the token mapping if it still points at this
            // connection — a device switch may have already repointed it.
            if token_to_conn.get(&token) == Some(conn_id) {
                token_to_conn.remove(&token);
            }
        }
    }

    pub async fn get_connection_by_token(&self, token: &str) -> Option<ConnId> {
        self.token_to_conn.read().await.get(token).cloned()
    }

    pub async fn get_token_by_connection(&self, conn_id: &ConnId) -> Option<String> {
        self.conn_to_token.read().await.get(conn_id).cloned()
    }

    pub async fn get_connection(&self, conn_id: &ConnId) -> Option<H> {
        self.connections.read().await.get(conn_id).cloned()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Every live connection, for broadcast fan-out (`server_shutdown`) and
    /// the inactive-connection reaper.
    pub async fn all_connections(&self) -> Vec<(ConnId, H)> {
        self.connections
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn device_switch_evicts_old_connection_and_returns_it() {
        let mux: ConnectionMultiplexer<u32, &'static str> = ConnectionMultiplexer::new();
        mux.add_connection_with_token(1, "handle1", "tok".into()).await;
        let evicted = mux
            .add_connection_with_token(2, "handle2", "tok".into())
            .await;
        assert_eq!(evicted, Some(1));
        assert_eq!(mux.get_connection_by_token("tok").await, Some(2));
        assert_eq!(mux.get_token_by_connection(&1).await, None);
        assert_eq!(mux.get_token_by_connection(&2).await, Some("tok".to_string()));
    }

    #[tokio::test]
    async fn remove_connection_clears_both_directions() {
        let mux: ConnectionMultiplexer<u32, &'static str> = ConnectionMultiplexer::new();
        mux.add_connection_with_token(1, "h", "tok".into()).await;
        mux.remove_connection(&1).await;
        assert!(mux.get_connection(&1).await.is_none());
        assert!(mux.get_connection_by_token("tok").await.is_none());
    }

    #[tokio::test]
    async fn remove_connection_after_device_switch_does_not_clobber_new_mapping() {
        let mux: ConnectionMultiplexer<u32, &'static str> = ConnectionMultiplexer::new();
        mux.add_connection_with_token(1, "h1", "tok".into()).await;
        mux.add_connection_with_token(2, "h2", "tok".into()).await;
        // Stale removal of the evicted connection must not clear conn 2's mapping.
        mux.remove_connection(&1).await;
        assert_eq!(mux.get_connection_by_token("tok").await, Some(2));
    }

    #[tokio::test]
    async fn untokened_connections_are_tracked_but_absent_from_the_bimap() {
        let mux: ConnectionMultiplexer<u32, &'static str> = ConnectionMultiplexer::new();
        mux.add_connection(5, "handle").await;
        assert!(mux.get_connection(&5).await.is_some());
        assert!(mux.get_token_by_connection(&5).await.is_none());
    }
}
