//! Virtual sockets multiplexed over the AT channel
//!
//! The module numbers its sockets itself. Callers work with a local
//! [`SocketId`] that indexes a fixed table; each slot remembers the handle
//! the module assigned:
//!
//! ```text
//!   SocketId(0) ──► slot { handle: Some(3), TCP, connected, pending: 12 }
//!   SocketId(1) ──► slot { handle: None }                 (free)
//!   SocketId(2) ──► slot { handle: Some(0), UDP, connected, pending: 0 }
//! ```
//!
//! Notifications (`+UUSORD`, `+UUSOCL`) update slots by module handle while
//! any command is running, so `pending` is only advisory and a receive always
//! asks the module again.

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Socket operations on the modem
pub mod ops;

#[cfg(test)]
mod tests;

/// Default pool size, one slot per module handle.
pub const DEFAULT_SOCKETS: usize = 7;

/// Local socket index handed out by `Modem::socket_open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(pub usize);

impl core::fmt::Display for SocketId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "socket {}", self.0)
    }
}

/// Transport protocol of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Protocol number used by `AT+USOCR`.
    pub fn code(self) -> u8 {
        match self {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Protocol {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Protocol::Tcp => defmt::write!(f, "TCP"),
            Protocol::Udp => defmt::write!(f, "UDP"),
        }
    }
}

/// Local bookkeeping for one module socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketSlot {
    /// Handle assigned by the module; `None` marks a free slot.
    pub handle: Option<u8>,
    pub protocol: Protocol,
    /// How long a receive waits for data. `u32::MAX` waits indefinitely.
    pub timeout_ms: u32,
    pub connected: bool,
    /// Bytes the module reported as waiting, advisory only.
    pub pending: usize,
    pub open: bool,
}

impl SocketSlot {
    const FREE: SocketSlot = SocketSlot {
        handle: None,
        protocol: Protocol::Tcp,
        timeout_ms: 0,
        connected: false,
        pending: 0,
        open: false,
    };

    pub fn is_free(&self) -> bool {
        self.handle.is_none()
    }
}

/// Fixed pool of socket slots.
#[derive(Debug, Clone)]
pub struct SocketTable<const N: usize> {
    slots: [SocketSlot; N],
}

impl<const N: usize> Default for SocketTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SocketTable<N> {
    pub const fn new() -> Self {
        Self {
            slots: [SocketSlot::FREE; N],
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// First slot without a module handle.
    pub fn find_free(&self) -> Option<SocketId> {
        self.slots.iter().position(SocketSlot::is_free).map(SocketId)
    }

    /// Slot holding module handle `handle`.
    pub fn find_handle(&self, handle: u8) -> Option<SocketId> {
        self.slots
            .iter()
            .position(|s| s.handle == Some(handle))
            .map(SocketId)
    }

    pub fn get(&self, id: SocketId) -> Option<&SocketSlot> {
        self.slots.get(id.0)
    }

    pub fn get_mut(&mut self, id: SocketId) -> Option<&mut SocketSlot> {
        self.slots.get_mut(id.0)
    }

    /// An allocated slot, or `None` for out-of-range and free slots.
    pub fn active(&self, id: SocketId) -> Option<&SocketSlot> {
        self.get(id).filter(|s| !s.is_free())
    }

    pub fn active_mut(&mut self, id: SocketId) -> Option<&mut SocketSlot> {
        self.get_mut(id).filter(|s| !s.is_free())
    }

    /// Bind a module handle to slot `id`.
    ///
    /// A module handle belongs to at most one slot; any other slot still
    /// claiming it is stale and gets released.
    pub fn assign(&mut self, id: SocketId, handle: u8, protocol: Protocol, timeout_ms: u32) -> bool {
        if id.0 >= N {
            return false;
        }
        if let Some(stale) = self.find_handle(handle).filter(|s| *s != id) {
            log::warn!("{} still held handle {}, releasing", stale, handle);
            self.release(stale);
        }
        self.slots[id.0] = SocketSlot {
            handle: Some(handle),
            protocol,
            timeout_ms,
            connected: protocol == Protocol::Udp,
            pending: 0,
            open: true,
        };
        true
    }

    /// Return a slot to the pool. Releasing a free slot does nothing.
    pub fn release(&mut self, id: SocketId) -> bool {
        match self.slots.get_mut(id.0) {
            Some(slot) if !slot.is_free() => {
                *slot = SocketSlot::FREE;
                true
            }
            _ => false,
        }
    }

    /// Release whichever slot holds module handle `handle`.
    pub fn release_handle(&mut self, handle: u8) -> bool {
        match self.find_handle(handle) {
            Some(id) => self.release(id),
            None => false,
        }
    }

    /// Record a pending byte count reported for module handle `handle`.
    pub fn set_pending(&mut self, handle: u8, pending: usize) -> bool {
        match self.find_handle(handle) {
            Some(id) => {
                self.slots[id.0].pending = pending;
                true
            }
            None => false,
        }
    }

    /// Module handles currently bound to a slot.
    pub fn handles(&self) -> impl Iterator<Item = u8> + '_ {
        self.slots.iter().filter_map(|s| s.handle)
    }

    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_free()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SocketId, &SocketSlot)> {
        self.slots.iter().enumerate().map(|(i, s)| (SocketId(i), s))
    }

    /// Forget every slot, e.g. after the module was powered down.
    pub fn clear(&mut self) {
        self.slots = [SocketSlot::FREE; N];
    }
}
