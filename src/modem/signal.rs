//! `+CSQ` conversion
//!
//! `+CSQ: <rssi>,<qual>` reports two raw indices, 99 meaning "not known".
//! They are turned into one canonical set of 3GPP measurements per access
//! technology:
//!
//! | technology | strength               | quality                          |
//! |------------|------------------------|----------------------------------|
//! | GSM, EDGE  | RXLEV = 2 * rssi       | RXQUAL = qual                    |
//! | UTRAN      | RSCP = dBm + 116       | Ec/No = min(7 + (7 - qual) * 6, 44) |
//! | LTE        | RSRP = rssi * 97 / 31  | RSRQ = qual * 34 / 7             |
//!
//! [`SignalQuality`] scales those onto 0..=100 over the full range of each
//! 3GPP index (RXLEV 0-63, RXQUAL 7-0, RSCP 0-96, Ec/No 0-49, RSRP 0-97,
//! RSRQ 0-34).

use super::status::{AccessTechnology, NetworkStatus, SIGNAL_UNSET};

/// Raw "not known" value of both `+CSQ` fields.
pub const CSQ_UNKNOWN: u8 = 99;

/// Bit error rate class to quality figure, 3GPP TS 45.008 8.2.4.
const QUAL: [u8; 8] = [49, 43, 37, 25, 19, 13, 7, 0];

/// Fold a `+CSQ` reply into `status` using its current access technology.
pub fn apply_csq(status: &mut NetworkStatus, rssi: u8, qual: u8) {
    let known_rssi = rssi != CSQ_UNKNOWN;
    let known_qual = qual != CSQ_UNKNOWN;

    if known_rssi {
        status.rssi = Some(-113 + 2 * i16::from(rssi));
    }
    if let Some(q) = QUAL.get(usize::from(qual)) {
        status.qual = Some(*q);
    }

    match status.act {
        AccessTechnology::Gsm | AccessTechnology::Edge => {
            status.rxlev = if known_rssi { rssi.saturating_mul(2) } else { SIGNAL_UNSET };
            status.rxqual = if known_qual { qual } else { SIGNAL_UNSET };
        }
        AccessTechnology::Utran => {
            status.rscp = match status.rssi {
                Some(dbm) if known_rssi => (dbm + 116).clamp(0, 96) as u8,
                _ => SIGNAL_UNSET,
            };
            status.ecno = if known_qual && qual <= 7 {
                (7 + (7 - qual) * 6).min(44)
            } else {
                SIGNAL_UNSET
            };
        }
        AccessTechnology::Lte | AccessTechnology::LteCatM1 | AccessTechnology::LteCatNb1 => {
            status.rsrp = if known_rssi {
                (u16::from(rssi) * 97 / 31).min(97) as u8
            } else {
                SIGNAL_UNSET
            };
            status.rsrq = if known_qual {
                (u16::from(qual) * 34 / 7).min(34) as u8
            } else {
                SIGNAL_UNSET
            };
        }
        AccessTechnology::Unknown => {}
    }
}

/// Signal strength and quality as percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalQuality {
    pub strength: u8,
    pub quality: u8,
}

impl SignalQuality {
    /// Scale the measurements of `status`; `None` when the technology or the
    /// measurements are unknown.
    pub fn from_status(status: &NetworkStatus) -> Option<Self> {
        let (strength, quality) = match status.act {
            AccessTechnology::Gsm | AccessTechnology::Edge => {
                let strength = percent(status.rxlev, 63)?;
                let quality = if status.rxqual <= 7 {
                    percent(7 - status.rxqual, 7)?
                } else {
                    return None;
                };
                (strength, quality)
            }
            AccessTechnology::Utran => (percent(status.rscp, 96)?, percent(status.ecno, 49)?),
            AccessTechnology::Lte | AccessTechnology::LteCatM1 | AccessTechnology::LteCatNb1 => {
                (percent(status.rsrp, 97)?, percent(status.rsrq, 34)?)
            }
            AccessTechnology::Unknown => return None,
        };
        Some(Self { strength, quality })
    }
}

fn percent(value: u8, max: u8) -> Option<u8> {
    if value == SIGNAL_UNSET {
        return None;
    }
    let value = u16::from(value.min(max));
    Some((value * 100 / u16::from(max)) as u8)
}
