//! u-blox cellular modem driver
//!
//! [`Modem`] owns the command engine and the board's power lines and exposes
//! the connection lifecycle as a handful of blocking calls:
//!
//! ```text
//!   Off ──power_on──► Ready ──init_device_info──► Ready
//!                       │
//!                 register_network
//!                       ▼
//!                  Registered ──attach──► Attached
//!                       ▲                    │
//!                       └──── disconnect ────┘
//!
//!   power_off from any state ──► Off
//! ```
//!
//! Every call may be interrupted through the shared [`CancelFlag`]. A
//! cancelled step leaves the driver in its last stable state, and
//! [`Modem::power_off`] works even while the flag is set.

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Compiled-in carrier APN table
pub mod apn;

/// Driver timing and retry configuration
pub mod config;

/// Module file system
pub mod file;

/// Power, SIM, registration and data session sequences
pub mod lifecycle;

/// `+CSQ` conversion
pub mod signal;

/// Device and network status records
pub mod status;

/// Data usage counters
pub mod usage;

use core::net::Ipv4Addr;

use heapless::String;

use crate::engine::{CancelFlag, Engine, Error, NetworkEvent};
use crate::socket::DEFAULT_SOCKETS;
use crate::transport::{Clock, PowerControl, Transport};

pub use config::Config;
pub use signal::SignalQuality;
pub use status::{CellGlobalIdentity, DeviceStatus, DeviceType, NetworkStatus};
pub use usage::DataUsage;

/// Where the connection lifecycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemState {
    Off,
    PoweringOn,
    SimCheck,
    /// Powered, SIM ready
    Ready,
    DeviceInfo,
    Registering,
    Registered,
    Attaching,
    Attached,
    Disconnecting,
    Detaching,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ModemState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ModemState::Off => defmt::write!(f, "Off"),
            ModemState::PoweringOn => defmt::write!(f, "PoweringOn"),
            ModemState::SimCheck => defmt::write!(f, "SimCheck"),
            ModemState::Ready => defmt::write!(f, "Ready"),
            ModemState::DeviceInfo => defmt::write!(f, "DeviceInfo"),
            ModemState::Registering => defmt::write!(f, "Registering"),
            ModemState::Registered => defmt::write!(f, "Registered"),
            ModemState::Attaching => defmt::write!(f, "Attaching"),
            ModemState::Attached => defmt::write!(f, "Attached"),
            ModemState::Disconnecting => defmt::write!(f, "Disconnecting"),
            ModemState::Detaching => defmt::write!(f, "Detaching"),
        }
    }
}

/// PDP authentication method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Auth {
    None,
    Pap,
    Chap,
    /// Try none, PAP and CHAP in turn.
    #[default]
    Detect,
}

impl Auth {
    /// Methods tried in order, with their `AT+UPSD=0,6,<n>` codes.
    pub(crate) const METHODS: [(Auth, u8); 3] = [(Auth::None, 0), (Auth::Pap, 1), (Auth::Chap, 2)];

    pub(crate) fn allows(self, method: Auth) -> bool {
        self == Auth::Detect || self == method
    }
}

/// APN and login of a data session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub apn: String<64>,
    pub username: String<32>,
    pub password: String<32>,
}

impl Credentials {
    pub fn new(apn: &str, username: &str, password: &str) -> Result<Self, Error> {
        Ok(Self {
            apn: String::try_from(apn).map_err(|_| Error::BufferOverflow)?,
            username: String::try_from(username).map_err(|_| Error::BufferOverflow)?,
            password: String::try_from(password).map_err(|_| Error::BufferOverflow)?,
        })
    }
}

/// The modem driver.
///
/// `S` is the number of virtual socket slots.
pub struct Modem<'a, T, C, P, const S: usize = DEFAULT_SOCKETS> {
    pub(crate) engine: Engine<'a, T, C, S>,
    pub(crate) power: P,
    pub(crate) config: Config,
    pub(crate) device: DeviceStatus,
    pub(crate) state: ModemState,
    pub(crate) powered: bool,
    /// The data profile has been activated at least once.
    pub(crate) activated: bool,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) usage: usage::UsageCache,
}

impl<T, C, P, const S: usize> core::fmt::Debug for Modem<'_, T, C, P, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Modem")
            .field("state", &self.state)
            .field("powered", &self.powered)
            .field("device", &self.device)
            .field("engine", &self.engine)
            .finish()
    }
}

impl<'a, T, C, P, const S: usize> Modem<'a, T, C, P, S>
where
    T: Transport,
    C: Clock,
    P: PowerControl,
{
    pub fn new(transport: T, clock: C, power: P, cancel: &'a CancelFlag, config: Config) -> Self {
        Self {
            engine: Engine::new(transport, clock, cancel, config.gprs_watchdog_ms),
            power,
            config,
            device: DeviceStatus::default(),
            state: ModemState::Off,
            powered: false,
            activated: false,
            credentials: None,
            usage: usage::UsageCache::default(),
        }
    }

    pub fn state(&self) -> ModemState {
        self.state
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn device_status(&self) -> &DeviceStatus {
        &self.device
    }

    pub fn network_status(&self) -> &NetworkStatus {
        &self.engine.state().network
    }

    /// Cell identity from the last registration and operator replies.
    pub fn cell_identity(&self) -> CellGlobalIdentity {
        self.engine.state().network.cgi
    }

    /// Address of the active data session.
    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.engine.state().ip
    }

    pub fn is_attached(&self) -> bool {
        self.engine.state().attached
    }

    /// Credentials of the last successful attach.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Percentages of the last signal report.
    pub fn signal_quality(&self) -> Option<SignalQuality> {
        SignalQuality::from_status(&self.engine.state().network)
    }

    /// Text of the last error reply, for diagnostics.
    pub fn last_error(&self) -> &str {
        self.engine.last_error()
    }

    /// Set the `+UPSV` mode applied by the next `init_device_info`.
    pub fn set_power_mode(&mut self, mode: u8) {
        self.config.power_save_mode = mode;
    }

    /// Stop every blocking operation at its next poll.
    pub fn cancel(&self) {
        self.engine.cancel_flag().cancel();
    }

    pub fn resume(&self) {
        self.engine.cancel_flag().resume();
    }

    /// Next queued network event.
    pub fn poll_event(&mut self) -> Option<NetworkEvent> {
        self.engine.poll_event()
    }

    /// Process pending notifications for `ms` milliseconds.
    pub fn process_urcs(&mut self, ms: u32) -> Result<(), Error> {
        self.engine.pump(ms)
    }

    pub fn transport(&self) -> &T {
        self.engine.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.engine.transport_mut()
    }

    pub fn clock(&self) -> &C {
        self.engine.clock()
    }

    pub fn power_control(&self) -> &P {
        &self.power
    }

    pub(crate) fn ensure_powered(&self) -> Result<(), Error> {
        if self.powered {
            Ok(())
        } else {
            Err(Error::NotPowered)
        }
    }

    /// `AT` answered with `OK`.
    pub(crate) fn at_ok(&mut self) -> bool {
        self.engine
            .command(format_args!("AT"), self.config.at_timeout_ms)
            .is_ok()
    }
}

/// Treat module-side failures as acceptable, keeping cancellation and
/// transport failures.
pub(crate) fn lenient(result: Result<(), Error>) -> Result<(), Error> {
    match result {
        Err(e) if e.is_retryable() => Ok(()),
        other => other,
    }
}

/// Replace `out` with as much of `text` as fits.
pub(crate) fn store<const N: usize>(out: &mut String<N>, text: &str) {
    out.clear();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
}
