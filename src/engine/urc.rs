//! Unsolicited result codes handled by the engine itself
//!
//! Every `+` line passes through [`apply`] before any caller decoder sees it,
//! so socket and registration bookkeeping stays correct no matter which
//! command happened to be running when the notification arrived.

use crate::at::{Response, fields};
use crate::modem::status::{AccessTechnology, CI_UNSET, Domain, LAC_UNSET, Registration};

use super::{NetworkEvent, State};

/// A notification the engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urc {
    /// `+CIEV: 9,<n>`, GPRS attach indicator (2 means attached).
    GprsIndicator(u8),
    /// `+USORD`, `+UUSORD`, `+USORF`, `+UUSORF` without payload.
    SocketPending { handle: u8, pending: usize },
    /// `+UUSOCL`, socket closed by the remote host.
    SocketClosed { handle: u8 },
    /// `+UUPSDD: 0`, data profile deactivated by the network.
    PdpDeactivated,
    /// `+CREG`, `+CGREG`, `+CEREG` in reply or URC form.
    Registration {
        domain: Domain,
        stat: u8,
        lac: Option<u16>,
        ci: Option<u32>,
        act: Option<u8>,
    },
}

/// Recognise the text after the `+` marker.
pub fn parse(body: &str) -> Option<Urc> {
    let (name, rest) = body.split_once(':')?;
    let fields = fields::split_fields(rest.trim_start()).ok()?;

    match name {
        "CIEV" => {
            if fields.len() == 2 && fields[0] == "9" {
                return Some(Urc::GprsIndicator(fields::int(&fields, 1).ok()?));
            }
            None
        }
        "USORD" | "UUSORD" | "USORF" | "UUSORF" => {
            // payload replies carry a third field and are not notifications
            if fields.len() != 2 {
                return None;
            }
            Some(Urc::SocketPending {
                handle: fields::int(&fields, 0).ok()?,
                pending: fields::int(&fields, 1).ok()?,
            })
        }
        "UUSOCL" => Some(Urc::SocketClosed {
            handle: fields::int(&fields, 0).ok()?,
        }),
        "UUPSDD" => (fields::quoted(&fields, 0).ok()? == "0").then_some(Urc::PdpDeactivated),
        "CREG" | "CGREG" | "CEREG" => {
            let domain = match name {
                "CREG" => Domain::Circuit,
                "CGREG" => Domain::Packet,
                _ => Domain::Eps,
            };
            registration(domain, &fields)
        }
        _ => None,
    }
}

/// `<n>,<stat>[,<lac>,<ci>[,<AcT>]]` as a reply, `<stat>[,<lac>,<ci>[,<AcT>]]`
/// as a URC. A plain number in the second position means the reply form.
fn registration(domain: Domain, fields: &[&str]) -> Option<Urc> {
    let reply = fields.len() >= 2 && fields[1].bytes().all(|b| b.is_ascii_digit()) && !fields[1].is_empty();
    let fields = if reply { &fields[1..] } else { fields };

    let stat = fields::int(fields, 0).ok()?;
    let lac = fields::hex(fields, 1)
        .ok()
        .and_then(|v| u16::try_from(v).ok())
        .filter(|v| *v != LAC_UNSET);
    let ci = fields::hex(fields, 2).ok().filter(|v| *v != CI_UNSET);
    let act = fields::int(fields, 3).ok();

    Some(Urc::Registration {
        domain,
        stat,
        lac,
        ci,
        act,
    })
}

/// Run the engine's notification table for one classified unit.
pub fn apply<const S: usize>(state: &mut State<S>, response: &Response<'_>, now_ms: u64) {
    let Some(body) = response.plus_body() else {
        return;
    };
    if let Some(urc) = parse(body) {
        handle(state, urc, now_ms);
    }
}

/// Apply one parsed notification to the state.
pub fn handle<const S: usize>(state: &mut State<S>, urc: Urc, now_ms: u64) {
    match urc {
        Urc::GprsIndicator(value) => {
            if state.device.is_lte() || !state.attached {
                return;
            }
            if value == 2 {
                log::debug!("GPRS re-attached, watchdog cleared");
                state.gprs_deadline = None;
            } else if state.gprs_deadline.is_none() {
                log::debug!("GPRS detached, watchdog armed for {} ms", state.gprs_window_ms);
                state.gprs_deadline = Some(now_ms + u64::from(state.gprs_window_ms));
            }
        }
        Urc::SocketPending { handle, pending } => {
            if state.sockets.set_pending(handle, pending) {
                log::debug!("handle {} has {} bytes pending", handle, pending);
            }
        }
        Urc::SocketClosed { handle } => {
            if state.sockets.release_handle(handle) {
                log::debug!("handle {} closed by remote host", handle);
            }
        }
        Urc::PdpDeactivated => {
            log::warn!("PDP context deactivated remotely");
            state.ip = None;
            state.attached = false;
            state.push_event(NetworkEvent::PdpDeactivated);
        }
        Urc::Registration {
            domain,
            stat,
            lac,
            ci,
            act,
        } => {
            let Some(reg) = Registration::from_stat(stat) else {
                return;
            };
            *state.network.registration_mut(domain) = reg;
            if let Some(lac) = lac {
                state.network.cgi.location_area_code = lac;
            }
            if let Some(ci) = ci {
                state.network.cgi.cell_id = ci;
            }
            if let Some(act) = act {
                state.network.act = AccessTechnology::from_act(act);
            }
            log::debug!("{:?} registration {:?}", domain, reg);
        }
    }
}
