//! Endpoint identifiers.

/// Process-local handle for one remote peer.
///
/// Ids are assigned by the server when a connection is opened or accepted
/// and never change for the endpoint's lifetime. Zero is never issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u32);

impl EndpointId {
    /// Wrap a raw id, e.g. one received from an FFI caller.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw id value.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<EndpointId> for u32 {
    fn from(id: EndpointId) -> u32 {
        id.0
    }
}

/// Monotonic id source.
#[derive(Debug, Clone)]
pub(crate) struct IdAllocator {
    next: u32,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdAllocator {
    /// Next candidate id; the caller skips ids still in use.
    pub(crate) fn next_id(&mut self) -> EndpointId {
        let id = self.next;
        self.next = match self.next.wrapping_add(1) {
            0 => 1,
            n => n,
        };
        EndpointId(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.next_id(), EndpointId::from_raw(1));
        assert_eq!(ids.next_id(), EndpointId::from_raw(2));
    }

    #[test]
    fn test_zero_skipped_on_wrap() {
        let mut ids = IdAllocator { next: u32::MAX };
        assert_eq!(ids.next_id().raw(), u32::MAX);
        assert_eq!(ids.next_id().raw(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(EndpointId::from_raw(42).to_string(), "#42");
    }
}
