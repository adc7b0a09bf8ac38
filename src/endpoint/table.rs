//! Connection table: endpoints by id, with an index by remote address.

use std::collections::HashMap;
use std::net::SocketAddr;

use super::id::IdAllocator;
use super::{Endpoint, EndpointId};
use crate::core::{Error, Result};

/// All live endpoints of one server.
#[derive(Debug)]
pub(crate) struct ConnectionTable {
    endpoints: HashMap<EndpointId, Endpoint>,
    by_address: HashMap<SocketAddr, EndpointId>,
    ids: IdAllocator,
    capacity: usize,
}

impl ConnectionTable {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            endpoints: HashMap::new(),
            by_address: HashMap::new(),
            ids: IdAllocator::default(),
            capacity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.endpoints.len() >= self.capacity
    }

    /// Create an endpoint for `address` with a freshly allocated id.
    ///
    /// Fails if the address already has an endpoint or the table is full.
    pub(crate) fn insert_with<F>(&mut self, address: SocketAddr, make: F) -> Result<EndpointId>
    where
        F: FnOnce(EndpointId) -> Endpoint,
    {
        if let Some(&existing) = self.by_address.get(&address) {
            return Err(Error::AlreadyConnected(existing));
        }
        if self.is_full() {
            return Err(Error::TableFull);
        }

        let id = loop {
            let candidate = self.ids.next_id();
            if !self.endpoints.contains_key(&candidate) {
                break candidate;
            }
        };

        self.endpoints.insert(id, make(id));
        self.by_address.insert(address, id);
        Ok(id)
    }

    pub(crate) fn get(&self, id: EndpointId) -> Option<&Endpoint> {
        self.endpoints.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: EndpointId) -> Option<&mut Endpoint> {
        self.endpoints.get_mut(&id)
    }

    /// Id of the endpoint talking to `address`.
    pub(crate) fn id_for(&self, address: &SocketAddr) -> Option<EndpointId> {
        self.by_address.get(address).copied()
    }

    pub(crate) fn remove(&mut self, id: EndpointId) -> Option<Endpoint> {
        let endpoint = self.endpoints.remove(&id)?;
        if self.by_address.get(&endpoint.address()) == Some(&id) {
            self.by_address.remove(&endpoint.address());
        }
        Some(endpoint)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Endpoint> {
        self.endpoints.values_mut()
    }
}
