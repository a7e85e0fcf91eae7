//! Command/response engine
//!
//! One command is in flight at a time. [`Engine::execute`] formats it, writes
//! it to the transport and then drives the classifier until a final result:
//!
//! ```text
//!  execute(cmd) ──► write "cmd\r\n"
//!                     │
//!                     ▼
//!           ┌──► fill + scan ──► unit ──► URC table (urc::apply)
//!           │                      │
//!           │                      ▼
//!           │                   decoder ──► Stop ──► Reply::Stopped
//!           │                      │
//!           │                      ▼
//!           │          OK / ERROR / prompt / ABORTED ──► result
//!           │                      │
//!           └──── delay 1 ms ◄─────┘ (anything else, until timeout/cancel)
//! ```
//!
//! Decoders receive every unit together with the engine [`State`], so they
//! can update bookkeeping but can never start a second command: the engine
//! itself is mutably borrowed for the whole exchange.

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Error taxonomy of the driver
pub mod error;

/// Unsolicited result codes handled by the engine itself
pub mod urc;

use core::fmt::Write as _;
use core::net::Ipv4Addr;
use core::sync::atomic::{AtomicBool, Ordering};

use heapless::{Deque, String};

use crate::at::{Classifier, Printable, RX_BUFFER_SIZE, Response, ResponseKind, Scan};
use crate::modem::status::{DeviceType, NetworkStatus};
use crate::socket::SocketTable;
use crate::transport::{Clock, Transport};

pub use error::{Error, Outcome};

/// Longest command line the engine formats, terminator included.
pub const MAX_COMMAND: usize = 256;

/// Depth of the network event queue.
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// Cooperative cancellation shared between the driver and the application.
///
/// Setting the flag makes every wait inside the driver return
/// [`Error::Cancelled`] at its next poll. The flag stays set until
/// [`resume`](Self::resume).
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    /// A cleared flag.
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Ask all blocking operations to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Allow blocking operations again.
    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a decoder wants after seeing a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep waiting for the final result.
    Continue,
    /// End the exchange now with [`Reply::Stopped`].
    Stop,
}

/// Successful end of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// `OK`
    Ok,
    /// `@` or `>`: the module waits for raw bytes.
    Prompt,
    /// The decoder ended the exchange.
    Stopped,
}

/// Link events for the application, drained with `Modem::poll_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    /// A data session was activated.
    Connected,
    /// GPRS stayed detached longer than the watchdog window.
    Disconnected,
    /// The network deactivated the data profile.
    PdpDeactivated,
}

/// Decoder hook for one exchange.
pub type Decoder<'d, const S: usize> = dyn FnMut(&Response<'_>, &mut State<S>) -> Flow + 'd;

/// Everything notifications may change while a command runs.
#[derive(Debug)]
pub struct State<const S: usize> {
    pub network: NetworkStatus,
    pub sockets: SocketTable<S>,
    /// Address of the active data session.
    pub ip: Option<Ipv4Addr>,
    pub attached: bool,
    pub device: DeviceType,
    pub gprs_window_ms: u32,
    gprs_deadline: Option<u64>,
    events: Deque<NetworkEvent, EVENT_QUEUE_DEPTH>,
}

impl<const S: usize> State<S> {
    pub fn new(gprs_window_ms: u32) -> Self {
        Self {
            network: NetworkStatus::default(),
            sockets: SocketTable::new(),
            ip: None,
            attached: false,
            device: DeviceType::Unknown,
            gprs_window_ms,
            gprs_deadline: None,
            events: Deque::new(),
        }
    }

    /// Queue an event, dropping the oldest one when full.
    pub fn push_event(&mut self, event: NetworkEvent) {
        if self.events.is_full() {
            self.events.pop_front();
        }
        let _ = self.events.push_back(event);
    }

    pub fn pop_event(&mut self) -> Option<NetworkEvent> {
        self.events.pop_front()
    }

    /// The GPRS detach watchdog is running.
    pub fn watchdog_armed(&self) -> bool {
        self.gprs_deadline.is_some()
    }

    /// Forget the session after a detach or power-down.
    pub fn clear_session(&mut self) {
        self.ip = None;
        self.attached = false;
        self.gprs_deadline = None;
    }

    fn check_watchdog(&mut self, now_ms: u64) {
        if let Some(deadline) = self.gprs_deadline {
            if now_ms >= deadline {
                log::warn!("GPRS detached for {} ms, reporting disconnect", self.gprs_window_ms);
                self.clear_session();
                self.push_event(NetworkEvent::Disconnected);
            }
        }
    }
}

/// Single-owner AT command engine.
pub struct Engine<'a, T, C, const S: usize> {
    transport: T,
    clock: C,
    cancel: &'a CancelFlag,
    rx: Classifier<RX_BUFFER_SIZE>,
    state: State<S>,
    last_error: String<64>,
}

impl<T, C, const S: usize> core::fmt::Debug for Engine<'_, T, C, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("buffered", &self.rx.buffered())
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl<'a, T: Transport, C: Clock, const S: usize> Engine<'a, T, C, S> {
    pub fn new(transport: T, clock: C, cancel: &'a CancelFlag, gprs_window_ms: u32) -> Self {
        Self {
            transport,
            clock,
            cancel,
            rx: Classifier::new(),
            state: State::new(gprs_window_ms),
            last_error: String::new(),
        }
    }

    pub fn state(&self) -> &State<S> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State<S> {
        &mut self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn delay_ms(&mut self, ms: u32) {
        self.clock.delay_ms(ms);
    }

    pub fn cancel_flag(&self) -> &'a CancelFlag {
        self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Text of the last `ERROR` / `+CME ERROR` line.
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Lift cancellation for a cleanup sequence. Returns whether it was set.
    pub fn suspend_cancel(&self) -> bool {
        let was = self.cancel.is_cancelled();
        if was {
            self.cancel.resume();
        }
        was
    }

    /// Re-arm cancellation after [`suspend_cancel`](Self::suspend_cancel).
    pub fn restore_cancel(&self, was: bool) {
        if was {
            self.cancel.cancel();
        }
    }

    /// Send a command and wait for its final result.
    ///
    /// ERROR maps to [`Error::Protocol`], ABORTED to [`Error::Aborted`] and a
    /// silent module to [`Error::Timeout`]. Nothing is written while the
    /// cancel flag is set.
    pub fn execute(
        &mut self,
        cmd: core::fmt::Arguments<'_>,
        timeout_ms: u32,
        decoder: &mut Decoder<'_, S>,
    ) -> Result<Reply, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.state.check_watchdog(self.clock.now_ms());

        let mut line: String<MAX_COMMAND> = String::new();
        line.write_fmt(cmd).map_err(|_| Error::BufferOverflow)?;
        line.push_str("\r\n").map_err(|_| Error::BufferOverflow)?;
        log::trace!("AT send {}", Printable(line.as_bytes()));
        self.write_all(line.as_bytes())?;

        self.wait_final(timeout_ms, decoder)
    }

    /// [`execute`](Self::execute) without a decoder, where only `OK` succeeds.
    pub fn command(&mut self, cmd: core::fmt::Arguments<'_>, timeout_ms: u32) -> Result<(), Error> {
        match self.execute(cmd, timeout_ms, &mut |_, _| Flow::Continue)? {
            Reply::Ok => Ok(()),
            _ => Err(Error::Protocol),
        }
    }

    /// [`execute`](Self::execute) with a decoder, where `OK` succeeds.
    pub fn query(
        &mut self,
        cmd: core::fmt::Arguments<'_>,
        timeout_ms: u32,
        decoder: &mut Decoder<'_, S>,
    ) -> Result<(), Error> {
        match self.execute(cmd, timeout_ms, decoder)? {
            Reply::Prompt => Err(Error::Protocol),
            _ => Ok(()),
        }
    }

    /// Write raw payload bytes after a prompt.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        log::trace!("AT send {} raw bytes", bytes.len());
        self.write_all(bytes)
    }

    /// Wait for the final result of a command already sent.
    pub fn wait_final(&mut self, timeout_ms: u32, decoder: &mut Decoder<'_, S>) -> Result<Reply, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.state.check_watchdog(self.clock.now_ms());

        let start = self.clock.now_ms();
        loop {
            self.rx.fill(&mut self.transport).map_err(|e| {
                log::error!("transport read failed: {:?}", e);
                Error::Transport
            })?;

            while let Scan::Unit(unit) = self.rx.scan() {
                let result = {
                    let response = Response {
                        kind: unit.kind,
                        bytes: self.rx.bytes(&unit),
                    };
                    log::trace!("AT recv {:?} {}", response.kind, Printable(response.bytes));

                    if response.kind == ResponseKind::Plus {
                        urc::apply(&mut self.state, &response, self.clock.now_ms());
                    }
                    match decoder(&response, &mut self.state) {
                        Flow::Stop => Some(Ok(Reply::Stopped)),
                        Flow::Continue => match response.kind {
                            ResponseKind::Ok => Some(Ok(Reply::Ok)),
                            ResponseKind::Prompt => Some(Ok(Reply::Prompt)),
                            ResponseKind::Aborted => Some(Err(Error::Aborted)),
                            ResponseKind::Error => {
                                self.last_error.clear();
                                let text = response.text();
                                let keep = floor_char_boundary(text, self.last_error.capacity());
                                let _ = self.last_error.push_str(&text[..keep]);
                                Some(Err(Error::Protocol))
                            }
                            _ => None,
                        },
                    }
                };
                self.rx.consume(unit.len);
                if let Some(result) = result {
                    return result;
                }
            }

            if self.clock.now_ms().saturating_sub(start) >= u64::from(timeout_ms) {
                return Err(Error::Timeout);
            }
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.clock.delay_ms(1);
        }
    }

    /// Process notifications for `ms` milliseconds without sending anything.
    ///
    /// Stray final results are swallowed; only cancellation and transport
    /// failures are reported.
    pub fn pump(&mut self, ms: u32) -> Result<(), Error> {
        self.listen(ms, &mut |_, _| Flow::Continue)
    }

    /// [`pump`](Self::pump) with a decoder watching for a late reply.
    pub fn listen(&mut self, ms: u32, decoder: &mut Decoder<'_, S>) -> Result<(), Error> {
        match self.wait_final(ms, decoder) {
            Ok(_) | Err(Error::Timeout | Error::Protocol | Error::Aborted) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Drop everything buffered on the receive side.
    pub fn purge(&mut self) -> Result<(), Error> {
        self.rx.clear();
        self.transport.purge().map_err(|e| {
            log::error!("transport purge failed: {:?}", e);
            Error::Transport
        })
    }

    pub fn poll_event(&mut self) -> Option<NetworkEvent> {
        self.state.check_watchdog(self.clock.now_ms());
        self.state.pop_event()
    }

    fn write_all(&mut self, mut bytes: &[u8]) -> Result<(), Error> {
        while !bytes.is_empty() {
            match self.transport.write(bytes) {
                Ok(0) => return Err(Error::Transport),
                Ok(n) => bytes = &bytes[n.min(bytes.len())..],
                Err(e) => {
                    log::error!("transport write failed: {:?}", e);
                    return Err(Error::Transport);
                }
            }
        }
        Ok(())
    }
}

fn floor_char_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    (0..=max).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0)
}
