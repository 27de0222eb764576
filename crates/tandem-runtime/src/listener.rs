//! Listening sockets
//!
//! A [`Listener`] goes through two steps: `bind` claims the address and
//! `open` starts accepting. Splitting them lets a reload reserve new ports
//! before anything about the running server changes.

use socket2::{Domain, Protocol, Socket, Type};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use tandem_core::{AddressFamily, Error, Result};
use tracing::debug;

/// Pending connections queued by the kernel
const LISTEN_BACKLOG: i32 = 128;

/// A listening endpoint for one address family
pub trait Listener: Send + fmt::Debug {
    /// Address family of the listener
    fn family(&self) -> AddressFamily;

    /// Configured address, `None` for the family's wildcard address
    fn address(&self) -> Option<IpAddr>;

    /// Claim the address and port
    fn bind(&mut self) -> Result<()>;

    /// Start accepting connections
    fn open(&mut self) -> Result<()>;

    /// Stop accepting and release the port
    fn close(&mut self);

    /// Whether the listener accepts connections
    fn is_open(&self) -> bool;

    /// Port the listener is bound to
    ///
    /// Read back from the socket, so a listener configured with port 0
    /// reports the port the system picked.
    fn local_port(&self) -> Option<u16>;

    /// A handle the reactor can accept connections on
    ///
    /// `None` for listeners that are not open or not backed by a socket.
    fn accept_handle(&self) -> Option<std::net::TcpListener> {
        None
    }
}

/// Creates listeners
pub trait ListenerFactory: Send + Sync + fmt::Debug {
    /// Create an unbound listener
    fn create(&self, family: AddressFamily, address: Option<IpAddr>, port: u16) -> Box<dyn Listener>;
}

/// Families to listen on for a configured address
///
/// Without an address both families are tried, IPv6 first.
pub fn families_for(address: Option<IpAddr>) -> Vec<AddressFamily> {
    match address {
        Some(ip) => vec![AddressFamily::of(&ip)],
        None => vec![AddressFamily::Ipv6, AddressFamily::Ipv4],
    }
}

/// TCP listener on a `socket2` socket
#[derive(Debug)]
pub struct TcpListenerSocket {
    family: AddressFamily,
    address: Option<IpAddr>,
    port: u16,
    socket: Option<Socket>,
    open: bool,
}

impl TcpListenerSocket {
    /// Create an unbound listener
    pub fn new(family: AddressFamily, address: Option<IpAddr>, port: u16) -> Self {
        Self {
            family,
            address,
            port,
            socket: None,
            open: false,
        }
    }

    fn socket_addr(&self) -> SocketAddr {
        let ip = self.address.unwrap_or_else(|| self.family.any_address());
        SocketAddr::new(ip, self.port)
    }

    fn error(&self, action: &str, e: std::io::Error) -> Error {
        Error::network(format!(
            "{} listener on {}: {action}: {e}",
            self.family,
            self.socket_addr()
        ))
    }
}

impl Listener for TcpListenerSocket {
    fn family(&self) -> AddressFamily {
        self.family
    }

    fn address(&self) -> Option<IpAddr> {
        self.address
    }

    fn bind(&mut self) -> Result<()> {
        let addr = self.socket_addr();
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| self.error("socket", e))?;

        if self.family == AddressFamily::Ipv6 {
            // Keep the IPv4 wildcard free for the IPv4 listener
            socket
                .set_only_v6(true)
                .map_err(|e| self.error("IPV6_V6ONLY", e))?;
        }
        socket
            .set_reuse_address(true)
            .map_err(|e| self.error("SO_REUSEADDR", e))?;
        socket
            .bind(&addr.into())
            .map_err(|e| self.error("bind", e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| self.error("O_NONBLOCK", e))?;

        self.socket = Some(socket);
        debug!(family = %self.family, %addr, port = ?self.local_port(), "Listener bound");
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        let Some(socket) = &self.socket else {
            return Err(Error::network(format!(
                "{} listener on {} opened before bind",
                self.family,
                self.socket_addr()
            )));
        };

        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| self.error("listen", e))?;
        self.open = true;
        debug!(family = %self.family, port = ?self.local_port(), "Listener open");
        Ok(())
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!(family = %self.family, "Listener closed");
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn local_port(&self) -> Option<u16> {
        let addr = self.socket.as_ref()?.local_addr().ok()?;
        addr.as_socket().map(|a| a.port())
    }

    fn accept_handle(&self) -> Option<std::net::TcpListener> {
        if !self.open {
            return None;
        }
        let socket = self.socket.as_ref()?.try_clone().ok()?;
        Some(socket.into())
    }
}

/// Creates [`TcpListenerSocket`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpListenerFactory;

impl ListenerFactory for TcpListenerFactory {
    fn create(&self, family: AddressFamily, address: Option<IpAddr>, port: u16) -> Box<dyn Listener> {
        Box::new(TcpListenerSocket::new(family, address, port))
    }
}
