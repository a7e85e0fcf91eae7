//! Device and network status records
//!
//! Both records are owned by the driver and handed out by reference.
//! [`to_json`] renders either of them for diagnostics.

use heapless::String;
use serde::Serialize;

use crate::engine::Error;

/// Sentinel for a location area code the network did not report.
pub const LAC_UNSET: u16 = 0xFFFF;
/// Sentinel for a cell id the network did not report.
pub const CI_UNSET: u32 = 0xFFFF_FFFF;
/// Sentinel for a raw signal value the module did not report.
pub const SIGNAL_UNSET: u8 = 255;

/// Module model, detected from `AT+CGMM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DeviceType {
    #[default]
    Unknown,
    SaraG350,
    SaraU260,
    SaraU270,
    SaraU201,
    SaraR410,
}

impl DeviceType {
    /// Identify the device from the model string.
    pub fn from_model(model: &str) -> Self {
        const MODELS: &[(&str, DeviceType)] = &[
            ("SARA-G350", DeviceType::SaraG350),
            ("SARA-U260", DeviceType::SaraU260),
            ("SARA-U270", DeviceType::SaraU270),
            ("SARA-U201", DeviceType::SaraU201),
            ("SARA-R410", DeviceType::SaraR410),
        ];
        MODELS
            .iter()
            .find(|(name, _)| model.contains(name))
            .map(|(_, device)| *device)
            .unwrap_or(DeviceType::Unknown)
    }

    /// LTE-only devices register on EPS and have no GPRS profile commands.
    pub fn is_lte(self) -> bool {
        self == DeviceType::SaraR410
    }
}

/// SIM card state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SimState {
    #[default]
    Unknown,
    Missing,
    PinRequired,
    Ready,
}

/// Low power mode as configured with `AT+UPSV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PowerSave {
    /// The device does not support power saving.
    Disabled,
    /// Supported but not configured.
    #[default]
    Enabled,
    /// Configured with a non-zero mode.
    Active,
}

/// Identity and SIM state of the module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub device: DeviceType,
    pub sim: SimState,
    pub power_save: PowerSave,
    pub imei: String<16>,
    pub imsi: String<16>,
    pub ccid: String<24>,
    pub manufacturer: String<16>,
    pub model: String<16>,
    pub version: String<16>,
    pub extended_version: String<32>,
}

/// Registration state of one network domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Registration {
    #[default]
    Unknown,
    Denied,
    NotRegistered,
    Home,
    Roaming,
}

impl Registration {
    /// Map the `<stat>` field of `+CREG`, `+CGREG` and `+CEREG`.
    pub fn from_stat(stat: u8) -> Option<Self> {
        match stat {
            0 | 2 => Some(Registration::NotRegistered),
            1 => Some(Registration::Home),
            3 => Some(Registration::Denied),
            4 => Some(Registration::Unknown),
            5 => Some(Registration::Roaming),
            _ => None,
        }
    }

    /// Registered on the home network or roaming.
    pub fn is_registered(self) -> bool {
        matches!(self, Registration::Home | Registration::Roaming)
    }
}

/// Radio access technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AccessTechnology {
    #[default]
    Unknown,
    Gsm,
    Edge,
    Utran,
    Lte,
    LteCatM1,
    LteCatNb1,
}

impl AccessTechnology {
    /// Map the `<AcT>` field of `+COPS` and the registration replies.
    pub fn from_act(act: u8) -> Self {
        match act {
            0 | 1 => AccessTechnology::Gsm,
            3 => AccessTechnology::Edge,
            2 | 4 | 5 | 6 => AccessTechnology::Utran,
            7 => AccessTechnology::Lte,
            8 => AccessTechnology::LteCatM1,
            9 => AccessTechnology::LteCatNb1,
            _ => AccessTechnology::Unknown,
        }
    }
}

/// Which registration domain a `+CxREG` line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// Circuit switched, `+CREG`
    Circuit,
    /// Packet switched, `+CGREG`
    Packet,
    /// EPS (LTE), `+CEREG`
    Eps,
}

/// Cell the module is camped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellGlobalIdentity {
    pub mobile_country_code: u16,
    pub mobile_network_code: u16,
    pub two_digit_mnc: bool,
    pub location_area_code: u16,
    pub cell_id: u32,
}

impl Default for CellGlobalIdentity {
    fn default() -> Self {
        Self {
            mobile_country_code: 0,
            mobile_network_code: 0,
            two_digit_mnc: false,
            location_area_code: LAC_UNSET,
            cell_id: CI_UNSET,
        }
    }
}

/// Registration, cell and signal state.
///
/// Reset to unknown at the start of every registration check and then filled
/// in as replies and URCs arrive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkStatus {
    pub csd: Registration,
    pub psd: Registration,
    pub eps: Registration,
    pub act: AccessTechnology,
    /// Received signal strength in dBm, `None` until `+CSQ` reports it.
    pub rssi: Option<i16>,
    /// Bit error rate class mapped to a quality figure.
    pub qual: Option<u8>,
    pub rxlev: u8,
    pub rxqual: u8,
    pub rscp: u8,
    pub ecno: u8,
    pub rsrp: u8,
    pub rsrq: u8,
    pub cgi: CellGlobalIdentity,
    /// Numeric operator, MCC followed by MNC.
    pub operator: String<8>,
    pub phone_number: String<32>,
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self {
            csd: Registration::Unknown,
            psd: Registration::Unknown,
            eps: Registration::Unknown,
            act: AccessTechnology::Unknown,
            rssi: None,
            qual: None,
            rxlev: SIGNAL_UNSET,
            rxqual: SIGNAL_UNSET,
            rscp: SIGNAL_UNSET,
            ecno: SIGNAL_UNSET,
            rsrp: SIGNAL_UNSET,
            rsrq: SIGNAL_UNSET,
            cgi: CellGlobalIdentity::default(),
            operator: String::new(),
            phone_number: String::new(),
        }
    }
}

impl NetworkStatus {
    /// Forget everything learned so far.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Registration record of one domain.
    pub fn registration_mut(&mut self, domain: Domain) -> &mut Registration {
        match domain {
            Domain::Circuit => &mut self.csd,
            Domain::Packet => &mut self.psd,
            Domain::Eps => &mut self.eps,
        }
    }

    /// Circuit and packet domains both registered, or EPS registered.
    pub fn is_registered(&self) -> bool {
        (self.csd.is_registered() && self.psd.is_registered()) || self.eps.is_registered()
    }

    /// Any domain registered.
    pub fn any_registered(&self) -> bool {
        self.csd.is_registered() || self.psd.is_registered() || self.eps.is_registered()
    }

    /// Some domain was refused by the network.
    pub fn is_denied(&self) -> bool {
        [self.csd, self.psd, self.eps].contains(&Registration::Denied)
    }
}

/// Render a status record as JSON into `buf`, returning the length written.
pub fn to_json<S: Serialize>(status: &S, buf: &mut [u8]) -> Result<usize, Error> {
    serde_json_core::to_slice(status, buf).map_err(|_| Error::BufferOverflow)
}

#[cfg(feature = "defmt")]
impl defmt::Format for Registration {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Registration::Unknown => defmt::write!(f, "Unknown"),
            Registration::Denied => defmt::write!(f, "Denied"),
            Registration::NotRegistered => defmt::write!(f, "NotRegistered"),
            Registration::Home => defmt::write!(f, "Home"),
            Registration::Roaming => defmt::write!(f, "Roaming"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SimState {
    fn format(&self, f: defmt::Formatter) {
        match self {
            SimState::Unknown => defmt::write!(f, "Unknown"),
            SimState::Missing => defmt::write!(f, "Missing"),
            SimState::PinRequired => defmt::write!(f, "PinRequired"),
            SimState::Ready => defmt::write!(f, "Ready"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for AccessTechnology {
    fn format(&self, f: defmt::Formatter) {
        match self {
            AccessTechnology::Unknown => defmt::write!(f, "Unknown"),
            AccessTechnology::Gsm => defmt::write!(f, "GSM"),
            AccessTechnology::Edge => defmt::write!(f, "EDGE"),
            AccessTechnology::Utran => defmt::write!(f, "UTRAN"),
            AccessTechnology::Lte => defmt::write!(f, "LTE"),
            AccessTechnology::LteCatM1 => defmt::write!(f, "LTE Cat-M1"),
            AccessTechnology::LteCatNb1 => defmt::write!(f, "LTE Cat-NB1"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DeviceType {
    fn format(&self, f: defmt::Formatter) {
        match self {
            DeviceType::Unknown => defmt::write!(f, "Unknown"),
            DeviceType::SaraG350 => defmt::write!(f, "SARA-G350"),
            DeviceType::SaraU260 => defmt::write!(f, "SARA-U260"),
            DeviceType::SaraU270 => defmt::write!(f, "SARA-U270"),
            DeviceType::SaraU201 => defmt::write!(f, "SARA-U201"),
            DeviceType::SaraR410 => defmt::write!(f, "SARA-R410"),
        }
    }
}
