//! Upstream application sessions and the identifier registry.
//!
//! Sessions speak the game protocol; the relay only looks them up by
//! transport identifier and forwards calls. Lifetime authority belongs to
//! the registry and to the sessions' own disconnect handling.

use crate::transport::SessionId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// An application session bound to one peer connection.
pub trait UpstreamSession: Send + Sync {
    /// Transport identifier of the peer connection this session serves.
    fn identifier(&self) -> &str;

    /// Peer address the session was opened for.
    fn peer_addr(&self) -> SocketAddr;

    /// Handle one application-protocol payload, framing byte already
    /// stripped.
    fn handle_binary(&self, payload: &[u8]);

    /// The peer connection is gone. The session performs its own teardown,
    /// including deregistration from the registry.
    fn on_disconnect(&self, reason: &str);
}

/// Builds application sessions when the transport opens a peer connection.
pub trait SessionFactory: Send + Sync {
    fn create(
        &self,
        identifier: SessionId,
        peer: SocketAddr,
        client_token: u64,
    ) -> Arc<dyn UpstreamSession>;
}

/// Identifier → session lookup table.
///
/// Transport callbacks and application-driven teardown may touch this from
/// different threads at once; the interior lock is the only synchronization
/// in this layer.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<dyn UpstreamSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its own identifier. A session already
    /// registered under the same identifier is replaced.
    pub fn new_session(&self, session: Arc<dyn UpstreamSession>) {
        let identifier = session.identifier().to_owned();
        self.sessions.write().insert(identifier, session);
    }

    pub fn get_session(&self, identifier: &str) -> Option<Arc<dyn UpstreamSession>> {
        self.sessions.read().get(identifier).cloned()
    }

    /// Drop a session from the table. Called from the session's own
    /// disconnect handling, not from the relay.
    pub fn remove_session(&self, identifier: &str) -> Option<Arc<dyn UpstreamSession>> {
        self.sessions.write().remove(identifier)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Identifiers currently registered, in no particular order.
    pub fn identifiers(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }
}
