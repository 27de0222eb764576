//! Client connections and their authentication state

use crate::types::ConnectionId;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// SASL mechanism name used for password authentication
pub const PLAIN_MECHANISM: &str = "PLAIN";

/// Authentication context installed on listeners and connections
///
/// The context decides which mechanism clients use to authenticate. A
/// connection keeps a reference to the context that was current when it
/// started (or last restarted) authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    mechanism: String,
    password: String,
}

impl AuthContext {
    /// Password authentication with the `PLAIN` mechanism
    pub fn plain(password: impl Into<String>) -> Self {
        Self {
            mechanism: PLAIN_MECHANISM.to_string(),
            password: password.into(),
        }
    }

    /// Mechanism offered to clients
    pub fn mechanism(&self) -> &str {
        &self.mechanism
    }

    /// Check a password supplied by a client
    pub fn verify(&self, password: &str) -> bool {
        self.password == password
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("mechanism", &self.mechanism)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authentication progress of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No authentication attempted (or attempt aborted)
    #[default]
    Unauthenticated,
    /// Handshake in progress
    Authenticating,
    /// Handshake completed
    Authenticated,
}

/// A client connection known to the directory
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    auth_state: AuthState,
    auth_context: Option<Arc<AuthContext>>,
}

impl Connection {
    /// Create an unauthenticated connection
    pub fn new(id: ConnectionId, remote_addr: SocketAddr) -> Self {
        Self {
            id,
            remote_addr,
            auth_state: AuthState::Unauthenticated,
            auth_context: None,
        }
    }

    /// Connection identifier
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Address of the remote peer
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Current authentication state
    pub fn auth_state(&self) -> AuthState {
        self.auth_state
    }

    /// Authentication context of the connection, if any
    pub fn auth_context(&self) -> Option<&Arc<AuthContext>> {
        self.auth_context.as_ref()
    }

    /// Start an authentication handshake
    pub fn begin_authentication(&mut self) {
        self.auth_state = AuthState::Authenticating;
    }

    /// Finish the handshake with a client password
    ///
    /// Without a context every client is accepted. Returns whether the
    /// connection is authenticated afterwards.
    pub fn complete_authentication(&mut self, password: &str) -> bool {
        let accepted = self
            .auth_context
            .as_ref()
            .map_or(true, |ctx| ctx.verify(password));

        self.auth_state = if accepted {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        accepted
    }

    /// Install a new authentication context
    ///
    /// A handshake in progress is aborted and the connection returns to
    /// [`AuthState::Unauthenticated`]; the other states are kept. Returns
    /// whether a handshake was aborted.
    pub fn reset_authentication(&mut self, context: Option<Arc<AuthContext>>) -> bool {
        self.auth_context = context;

        if self.auth_state == AuthState::Authenticating {
            debug!(connection = %self.id, "Aborting authentication in progress");
            self.auth_state = AuthState::Unauthenticated;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        Connection::new(ConnectionId(1), "127.0.0.1:4000".parse().unwrap())
    }

    #[test]
    fn test_reset_aborts_handshake() {
        let mut conn = connection();
        conn.begin_authentication();

        let ctx = Arc::new(AuthContext::plain("secret"));
        assert!(conn.reset_authentication(Some(ctx.clone())));
        assert_eq!(conn.auth_state(), AuthState::Unauthenticated);
        assert_eq!(conn.auth_context(), Some(&ctx));
    }

    #[test]
    fn test_reset_keeps_authenticated() {
        let mut conn = connection();
        conn.begin_authentication();
        assert!(conn.complete_authentication("anything"));

        assert!(!conn.reset_authentication(Some(Arc::new(AuthContext::plain("x")))));
        assert_eq!(conn.auth_state(), AuthState::Authenticated);
    }

    #[test]
    fn test_password_check() {
        let mut conn = connection();
        conn.reset_authentication(Some(Arc::new(AuthContext::plain("secret"))));
        conn.begin_authentication();

        assert!(!conn.complete_authentication("wrong"));
        assert_eq!(conn.auth_state(), AuthState::Unauthenticated);

        conn.begin_authentication();
        assert!(conn.complete_authentication("secret"));
    }

    #[test]
    fn test_debug_hides_password() {
        let ctx = AuthContext::plain("hunter2");
        let debug = format!("{ctx:?}");
        assert!(debug.contains("PLAIN"));
        assert!(!debug.contains("hunter2"));
    }
}
