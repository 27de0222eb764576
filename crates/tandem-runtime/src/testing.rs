//! Listener test doubles
//!
//! [`MockListenerFactory`] creates listeners that never touch the network.
//! Bind and open failures are scripted per (family, port), and every listener
//! the factory created stays inspectable through [`ListenerRecord`]s.

use crate::listener::{Listener, ListenerFactory};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tandem_core::{AddressFamily, Error, Result};

/// First port handed out for listeners configured with port 0
const FIRST_EPHEMERAL_PORT: u16 = 40000;

/// State of one listener created by a [`MockListenerFactory`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerRecord {
    /// Address family
    pub family: AddressFamily,
    /// Configured address
    pub address: Option<IpAddr>,
    /// Port, the assigned one once bound
    pub port: u16,
    /// `bind` succeeded
    pub bound: bool,
    /// `open` succeeded and `close` was not called
    pub open: bool,
    /// `close` was called
    pub closed: bool,
}

#[derive(Debug)]
struct FactoryState {
    bind_failures: HashSet<(AddressFamily, u16)>,
    open_failures: HashSet<(AddressFamily, u16)>,
    records: Vec<ListenerRecord>,
    next_port: u16,
}

/// Factory of in-memory listeners
#[derive(Debug, Clone)]
pub struct MockListenerFactory {
    state: Arc<Mutex<FactoryState>>,
}

impl MockListenerFactory {
    /// Factory whose listeners always succeed
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FactoryState {
                bind_failures: HashSet::new(),
                open_failures: HashSet::new(),
                records: Vec::new(),
                next_port: FIRST_EPHEMERAL_PORT,
            })),
        }
    }

    /// Make `bind` fail for `family` on `port`
    pub fn fail_bind(&self, family: AddressFamily, port: u16) -> &Self {
        self.state.lock().bind_failures.insert((family, port));
        self
    }

    /// Make `open` fail for `family` on `port`
    pub fn fail_open(&self, family: AddressFamily, port: u16) -> &Self {
        self.state.lock().open_failures.insert((family, port));
        self
    }

    /// Forget all scripted failures
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.bind_failures.clear();
        state.open_failures.clear();
    }

    /// Every listener created so far, in creation order
    pub fn listeners(&self) -> Vec<ListenerRecord> {
        self.state.lock().records.clone()
    }

    /// Listeners currently open
    pub fn open_listeners(&self) -> Vec<ListenerRecord> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|r| r.open)
            .cloned()
            .collect()
    }
}

impl Default for MockListenerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerFactory for MockListenerFactory {
    fn create(&self, family: AddressFamily, address: Option<IpAddr>, port: u16) -> Box<dyn Listener> {
        let mut state = self.state.lock();
        state.records.push(ListenerRecord {
            family,
            address,
            port,
            bound: false,
            open: false,
            closed: false,
        });

        Box::new(MockListener {
            index: state.records.len() - 1,
            family,
            address,
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
struct MockListener {
    index: usize,
    family: AddressFamily,
    address: Option<IpAddr>,
    state: Arc<Mutex<FactoryState>>,
}

impl MockListener {
    fn with_record<T>(&self, f: impl FnOnce(&mut FactoryState, usize) -> T) -> T {
        let mut state = self.state.lock();
        f(&mut state, self.index)
    }
}

impl Listener for MockListener {
    fn family(&self) -> AddressFamily {
        self.family
    }

    fn address(&self) -> Option<IpAddr> {
        self.address
    }

    fn bind(&mut self) -> Result<()> {
        let family = self.family;
        self.with_record(|state, index| {
            let port = state.records[index].port;
            if state.bind_failures.contains(&(family, port)) {
                return Err(Error::network(format!(
                    "{family} listener on port {port}: bind: Address already in use"
                )));
            }

            if port == 0 {
                state.records[index].port = state.next_port;
                state.next_port += 1;
            }
            state.records[index].bound = true;
            Ok(())
        })
    }

    fn open(&mut self) -> Result<()> {
        let family = self.family;
        self.with_record(|state, index| {
            let record = &state.records[index];
            if !record.bound {
                return Err(Error::network(format!("{family} listener opened before bind")));
            }
            if state.open_failures.contains(&(family, record.port)) {
                return Err(Error::network(format!(
                    "{family} listener on port {}: listen: Permission denied",
                    record.port
                )));
            }
            state.records[index].open = true;
            Ok(())
        })
    }

    fn close(&mut self) {
        self.with_record(|state, index| {
            let record = &mut state.records[index];
            record.open = false;
            record.bound = false;
            record.closed = true;
        });
    }

    fn is_open(&self) -> bool {
        self.with_record(|state, index| state.records[index].open)
    }

    fn local_port(&self) -> Option<u16> {
        self.with_record(|state, index| {
            let record = &state.records[index];
            record.bound.then_some(record.port)
        })
    }
}

impl Drop for MockListener {
    fn drop(&mut self) {
        self.with_record(|state, index| {
            let record = &mut state.records[index];
            if record.bound {
                record.open = false;
                record.bound = false;
                record.closed = true;
            }
        });
    }
}
