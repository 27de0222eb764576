//! Pool of listening endpoints

use crate::listener::Listener;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tandem_core::{AddressFamily, AuthContext, SecurityPolicy};
use tandem_tls::Credentials;
use tracing::{debug, info};

static NEXT_ENDPOINT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of an endpoint, unique within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint-{}", self.0)
    }
}

/// An open listener with the security settings new connections get
#[derive(Debug)]
pub struct ServerEndpoint {
    id: EndpointId,
    listener: Box<dyn Listener>,
    policy: SecurityPolicy,
    credentials: Option<Arc<Credentials>>,
    auth_context: Option<Arc<AuthContext>>,
}

impl ServerEndpoint {
    /// Wrap an open listener
    pub fn new(
        listener: Box<dyn Listener>,
        policy: SecurityPolicy,
        credentials: Option<Arc<Credentials>>,
        auth_context: Option<Arc<AuthContext>>,
    ) -> Self {
        Self {
            id: EndpointId(NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed)),
            listener,
            policy,
            credentials,
            auth_context,
        }
    }

    /// Endpoint identifier
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Address family of the listener
    pub fn family(&self) -> AddressFamily {
        self.listener.family()
    }

    /// Port the listener is bound to
    pub fn local_port(&self) -> Option<u16> {
        self.listener.local_port()
    }

    /// The listener
    pub fn listener(&self) -> &dyn Listener {
        self.listener.as_ref()
    }

    /// Security policy
    pub fn security_policy(&self) -> SecurityPolicy {
        self.policy
    }

    /// TLS credentials
    pub fn credentials(&self) -> Option<&Arc<Credentials>> {
        self.credentials.as_ref()
    }

    /// Authentication context for new connections
    pub fn auth_context(&self) -> Option<&Arc<AuthContext>> {
        self.auth_context.as_ref()
    }

    /// Replace the credentials
    pub fn set_credentials(&mut self, credentials: Option<Arc<Credentials>>) {
        self.credentials = credentials;
    }

    /// Replace the security policy
    ///
    /// Set credentials first: a TLS policy needs them.
    pub fn set_security_policy(&mut self, policy: SecurityPolicy) {
        debug_assert!(!policy.uses_tls() || self.credentials.is_some());
        self.policy = policy;
    }

    /// Replace the authentication context
    pub fn set_auth_context(&mut self, context: Option<Arc<AuthContext>>) {
        self.auth_context = context;
    }

    /// Close the listener
    pub fn close(&mut self) {
        self.listener.close();
        debug!(endpoint = %self.id, family = %self.family(), "Endpoint closed");
    }
}

/// The server's listening endpoints
#[derive(Debug, Default)]
pub struct ServerPool {
    endpoints: Vec<ServerEndpoint>,
}

impl ServerPool {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an endpoint
    pub fn add(&mut self, endpoint: ServerEndpoint) -> EndpointId {
        let id = endpoint.id();
        info!(
            endpoint = %id,
            family = %endpoint.family(),
            port = ?endpoint.local_port(),
            policy = %endpoint.security_policy(),
            "Endpoint added"
        );
        self.endpoints.push(endpoint);
        id
    }

    /// Remove every endpoint
    pub fn take_all(&mut self) -> Vec<ServerEndpoint> {
        std::mem::take(&mut self.endpoints)
    }

    /// Endpoints in registration order
    pub fn endpoints(&self) -> &[ServerEndpoint] {
        &self.endpoints
    }

    /// Endpoints, mutably
    pub fn endpoints_mut(&mut self) -> &mut [ServerEndpoint] {
        &mut self.endpoints
    }

    /// Endpoint by identifier
    pub fn endpoint(&self, id: EndpointId) -> Option<&ServerEndpoint> {
        self.endpoints.iter().find(|e| e.id() == id)
    }

    /// Endpoint of `family`
    pub fn endpoint_for(&self, family: AddressFamily) -> Option<&ServerEndpoint> {
        self.endpoints.iter().find(|e| e.family() == family)
    }

    /// Port the server listens on, read from the IPv6 endpoint if there is one
    pub fn port(&self) -> Option<u16> {
        self.endpoint_for(AddressFamily::Ipv6)
            .or_else(|| self.endpoints.first())
            .and_then(ServerEndpoint::local_port)
    }

    /// Number of endpoints
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether the pool has no endpoint
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Close and drop every endpoint
    pub fn close_all(&mut self) {
        for mut endpoint in self.take_all() {
            endpoint.close();
        }
    }
}

impl Drop for ServerPool {
    fn drop(&mut self) {
        self.close_all();
    }
}
