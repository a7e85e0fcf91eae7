//! Board boundary of the driver
//!
//! The driver never touches a UART, a GPIO or a timer directly. Everything it
//! needs from the board is expressed by three small traits that an integration
//! implements once:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 Modem driver                 │
//! └──────────────────────────────────────────────┘
//!        │                 │                 │
//!        ▼                 ▼                 ▼
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Transport  │   │    Clock    │   │ PowerControl │
//! │ (UART pipe) │   │ (ms ticks)  │   │ (PWR / RST)  │
//! └─────────────┘   └─────────────┘   └──────────────┘
//! ```
//!
//! - [`Transport`]: the serial byte pipe. Reads never block, writes may.
//! - [`Clock`]: millisecond time base and the single suspension point the
//!   driver uses while it waits for the module.
//! - [`PowerControl`]: the power key and reset lines of the module.
//!
//! The receive side of a real UART is usually filled from an interrupt. The
//! [`pipe::Pipe`] ring buffer is provided for that purpose.

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Errors reported by transport implementations
pub mod error;

/// Bounded interrupt-fed receive buffer
pub mod pipe;

/// Re-exports of the board traits
pub mod prelude {
    pub use super::{Clock, PowerControl, Transport};
}

/// Serial byte pipe to the module.
pub trait Transport {
    /// Associated error type
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes. Returns 0 when nothing is buffered.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write bytes towards the module. May block on back-pressure.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;

    /// Number of received bytes that can be read without blocking.
    fn bytes_available(&self) -> usize;

    /// Drop everything received so far.
    fn purge(&mut self) -> Result<(), Self::Error> {
        let mut scratch = [0u8; 64];
        while self.read(&mut scratch)? > 0 {}
        Ok(())
    }
}

/// Millisecond time source.
pub trait Clock {
    /// Monotonic milliseconds since an arbitrary origin.
    fn now_ms(&self) -> u64;

    /// Suspend the caller for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

/// Power key and reset lines of the module.
pub trait PowerControl {
    /// Drive one complete power-on key sequence.
    fn pulse_power(&mut self);

    /// Hold the reset line long enough to reboot the module.
    fn hardware_reset(&mut self);
}
