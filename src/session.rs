//! Session table, session-id allocation, and the `Service` capability set
//! a bound endpoint (a serial modem, here) implements.

use crate::error::ServiceError;
use macaddr::MacAddr6;
use rand::Rng;
use std::collections::HashMap;
use std::num::NonZeroU16;

/// Lifecycle state of a [`Service`]. A binding (peer MAC + session id) is
/// present iff `state != Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Dialing,
    Connected,
}

/// The capability set an access concentrator depends on for a bound
/// endpoint. A single concrete implementation (`crate::serial::SerialService`)
/// backs a serial modem; the trait exists so the AC never has to know that,
/// and so the discovery/takeover logic below can be driven by a mock in
/// tests instead of a real serial device.
#[async_trait::async_trait]
pub trait Service: Send {
    fn name(&self) -> &str;

    fn state(&self) -> ServiceState;

    /// The service's current (peer, session id) binding, if any. `None` iff
    /// `state() == Idle`.
    fn binding(&self) -> Option<(MacAddr6, NonZeroU16)>;

    /// Brings the service up for a newly-assigned session. Implementations
    /// open whatever resource they front (here, a serial device) and run any
    /// pre-flight conditioning (a chat script) before returning.
    fn connect(&mut self, peer: MacAddr6, session_id: NonZeroU16) -> Result<(), ServiceError>;

    /// Tears the service down, releasing its resources. Idempotent: calling
    /// `disconnect` on an already-`Idle` service is a no-op.
    fn disconnect(&mut self);

    /// Hands a PPP payload received from the Ethernet side to the service
    /// for delivery to the modem (Ethernet → modem direction).
    fn process_session_payload(&mut self, payload: &[u8]);

    /// Waits for, and processes, the service's next chunk of modem input.
    /// Pends forever while `state() == Idle`. `Ok(None)` signals the modem
    /// line dropped (EOF); the caller must then `disconnect` and emit PADT.
    async fn read_modem(&mut self) -> Result<Option<Vec<Vec<u8>>>, std::io::Error>;
}

/// The session table: a mapping from session id to bound service, with at
/// most one active session per service enforced by the access concentrator
/// (not by this type, which only tracks id → service-index bindings).
pub struct SessionTable {
    table: HashMap<NonZeroU16, usize>,
    allocator: SessionIdAllocator,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
            allocator: SessionIdAllocator::new(),
        }
    }

    pub fn get(&self, session_id: u16) -> Option<usize> {
        NonZeroU16::new(session_id).and_then(|id| self.table.get(&id).copied())
    }

    pub fn contains(&self, session_id: u16) -> bool {
        self.get(session_id).is_some()
    }

    /// Allocates a fresh session id without binding it yet. Used by the PADR
    /// handler, which must know the id before calling `connect` (so it can
    /// hand it to the service) but must not bind it until `connect` succeeds.
    pub fn allocate_id(&mut self) -> NonZeroU16 {
        self.allocator.allocate(&self.table)
    }

    /// Binds a previously-allocated id to `service_index`.
    pub fn bind(&mut self, session_id: NonZeroU16, service_index: usize) {
        self.table.insert(session_id, service_index);
    }

    /// Allocates a fresh session id and binds it to `service_index` in one
    /// step; a convenience for callers (and tests) that don't need the
    /// allocate/connect/bind split the PADR handler requires.
    pub fn insert(&mut self, service_index: usize) -> NonZeroU16 {
        let id = self.allocate_id();
        self.bind(id, service_index);
        id
    }

    /// Removes a binding, returning the freed service index if it was
    /// present.
    pub fn remove(&mut self, session_id: u16) -> Option<usize> {
        let id = NonZeroU16::new(session_id)?;
        self.table.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NonZeroU16, usize)> + '_ {
        self.table.iter().map(|(id, svc)| (*id, *svc))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocates session ids in [0x0001, 0xFFFF], starting at a uniformly random
/// value and walking forward (wrapping past 0xFFFF back to 0x0001) to find
/// the first id not currently bound. Never returns 0x0000.
struct SessionIdAllocator {
    next: u16,
}

impl SessionIdAllocator {
    fn new() -> Self {
        Self {
            next: rand::thread_rng().gen_range(1..=u16::MAX),
        }
    }

    /// Panics if `table` already has all 65534 ids bound.
    fn allocate(&mut self, table: &HashMap<NonZeroU16, usize>) -> NonZeroU16 {
        assert!(
            table.len() < usize::from(u16::MAX),
            "session table exhausted (65534 active sessions)"
        );

        loop {
            let candidate = self.next;
            self.next = if self.next == u16::MAX { 1 } else { self.next + 1 };

            if let Some(id) = NonZeroU16::new(candidate) {
                if !table.contains_key(&id) {
                    return id;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_never_returns_zero_or_a_bound_id() {
        let mut table = HashMap::new();
        let mut alloc = SessionIdAllocator { next: 0xfffe };

        let a = alloc.allocate(&table);
        table.insert(a, 0);
        let b = alloc.allocate(&table);
        table.insert(b, 0);
        let c = alloc.allocate(&table);

        assert_ne!(a.get(), 0);
        assert_ne!(b.get(), 0);
        assert_ne!(c.get(), 0);
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn allocator_wraps_past_0xffff_skipping_zero() {
        let table = HashMap::new();
        let mut alloc = SessionIdAllocator { next: 0xffff };
        let id = alloc.allocate(&table);
        assert_eq!(id.get(), 0xffff);
        let next = alloc.allocate(&table);
        assert_eq!(next.get(), 1);
    }

    #[test]
    fn table_insert_and_remove_round_trip() {
        let mut table = SessionTable::new();
        let id = table.insert(7);
        assert_eq!(table.get(id.get()), Some(7));
        assert_eq!(table.remove(id.get()), Some(7));
        assert_eq!(table.get(id.get()), None);
    }

    #[test]
    fn unknown_session_remove_is_a_no_op() {
        let mut table = SessionTable::new();
        assert_eq!(table.remove(0x1234), None);
        assert_eq!(table.len(), 0);
    }
}
