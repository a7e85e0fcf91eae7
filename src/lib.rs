//! # libcellular - u-blox cellular modem driver
//!
//! A `no_std` driver that turns the AT command channel of a u-blox SARA
//! cellular module into a typed API: power-up sequencing, network
//! registration, GPRS/PDP attach, DNS lookup and a small pool of virtual
//! sockets multiplexed over the single serial link.
//!
//! ## Layers
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  modem::Modem      power, SIM, register, attach, DNS │
//! │  socket            open / connect / send / receive   │
//! ├──────────────────────────────────────────────────────┤
//! │  engine::Engine    one command in flight, URC table  │
//! ├──────────────────────────────────────────────────────┤
//! │  at                response classifier, field parser │
//! ├──────────────────────────────────────────────────────┤
//! │  transport         Transport / Clock / PowerControl  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! libcellular = "0.1.0"
//! ```
//!
//! ### Bringing up a data session
//!
//! ```rust,no_run
//! use core::net::{Ipv4Addr, SocketAddrV4};
//! use libcellular::prelude::*;
//! # struct Uart;
//! # impl Transport for Uart {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ()> { Ok(0) }
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, ()> { Ok(buf.len()) }
//! #     fn bytes_available(&self) -> usize { 0 }
//! # }
//! # struct Ticks;
//! # impl Clock for Ticks {
//! #     fn now_ms(&self) -> u64 { 0 }
//! #     fn delay_ms(&mut self, _ms: u32) {}
//! # }
//! # struct Pins;
//! # impl PowerControl for Pins {
//! #     fn pulse_power(&mut self) {}
//! #     fn hardware_reset(&mut self) {}
//! # }
//!
//! static CANCEL: CancelFlag = CancelFlag::new();
//!
//! # fn main() -> Result<(), Error> {
//! let mut modem: Modem<'_, _, _, _> = Modem::new(Uart, Ticks, Pins, &CANCEL, Config::default());
//! modem.power_on(None)?;
//! modem.init_device_info()?;
//! let ip = modem.connect(None, None, None, Auth::Detect)?;
//!
//! let socket = modem.socket_open(Protocol::Tcp, None)?;
//! modem.socket_connect(socket, SocketAddrV4::new(Ipv4Addr::new(93, 184, 216, 34), 80))?;
//! modem.socket_send(socket, b"GET / HTTP/1.0\r\n\r\n")?;
//! let mut buf = [0u8; 256];
//! let n = modem.socket_receive(socket, &mut buf)?;
//! modem.socket_free(socket)?;
//! # let _ = (ip, n);
//! # Ok(())
//! # }
//! ```
//!
//! ## Optional Features
//!
//! - `std`: Implement `std::error::Error` for the driver error
//! - `defmt`: Enable defmt formatting for driver types

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]
#![doc(html_root_url = "https://shishir-dey.github.io/libcellular/")]

/// Board boundary: serial transport, clock and power lines.
pub mod transport;

/// AT response framing and field extraction.
pub mod at;

/// Command/response engine and unsolicited result code handling.
pub mod engine;

/// Modem lifecycle: power, SIM, registration, data session.
pub mod modem;

/// Virtual sockets multiplexed over the AT channel.
pub mod socket;

pub use engine::{CancelFlag, Error, NetworkEvent, Outcome};
pub use modem::{Auth, Config, Credentials, Modem, ModemState};
pub use socket::{Protocol, SocketId};

/// Everything an application needs to drive the modem.
pub mod prelude {
    pub use crate::engine::{CancelFlag, Error, NetworkEvent, Outcome};
    pub use crate::modem::{Auth, Config, Credentials, Modem, ModemState};
    pub use crate::socket::{Protocol, SocketId};
    pub use crate::transport::prelude::*;
}
