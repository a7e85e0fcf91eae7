//! Power, SIM, registration and data session sequences
//!
//! Each public call is one scripted exchange built on the engine. Retry
//! budgets come from [`Config`](super::Config).

use core::net::Ipv4Addr;

use heapless::Vec;

use super::status::{AccessTechnology, DeviceType, PowerSave, Registration, SimState};
use super::{Auth, Credentials, Modem, ModemState, lenient, signal, store};
use crate::at::{ResponseKind, fields};
use crate::engine::{Error, Flow, NetworkEvent};
use crate::transport::{Clock, PowerControl, Transport};

/// Most APN candidates tried by one attach.
const MAX_CANDIDATES: usize = 4;

impl<T, C, P, const S: usize> Modem<'_, T, C, P, S>
where
    T: Transport,
    C: Clock,
    P: PowerControl,
{
    /// Power the module up and bring the SIM to ready.
    ///
    /// The power key is pulsed until `AT` answers, with one hardware reset
    /// between two full batches of attempts. The SIM is then polled, the PIN
    /// entered when required, and the whole sequence repeated once if the
    /// SIM never answers. Exhausting either budget is [`Error::Fatal`].
    pub fn power_on(&mut self, pin: Option<&str>) -> Result<(), Error> {
        self.device = Default::default();
        self.state = ModemState::PoweringOn;
        let result = self.power_on_sequence(pin);
        self.state = match result {
            Ok(()) => ModemState::Ready,
            Err(_) if self.powered => ModemState::SimCheck,
            Err(_) => ModemState::Off,
        };
        result
    }

    fn power_on_sequence(&mut self, pin: Option<&str>) -> Result<(), Error> {
        self.boot()?;

        self.state = ModemState::SimCheck;
        let attempts = self.config.sim_attempts.max(1);
        let mut retried = false;
        let mut i = 0;
        while i < attempts && self.device.sim != SimState::Ready {
            if self.engine.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let result = self.query_sim(format_args!("AT+CPIN?"));
            match result {
                // ERROR is fine here, the SIM may still be initialising
                Ok(()) | Err(Error::Protocol) => {}
                Err(e) => return Err(e),
            }
            if i == attempts - 1 && result.is_err() && !retried {
                log::warn!("SIM not ready after {} polls, restarting module", attempts);
                retried = true;
                i = 0;
                if !self.shutdown() {
                    log::warn!("module did not power down, resetting");
                    self.power.hardware_reset();
                }
                self.boot()?;
                self.state = ModemState::SimCheck;
                continue;
            }

            if self.device.sim == SimState::PinRequired {
                let Some(pin) = pin else {
                    log::error!("SIM PIN required but not available");
                    return Err(Error::Fatal);
                };
                self.query_sim(format_args!("AT+CPIN={}", pin))?;
            } else if self.device.sim != SimState::Ready {
                // slow SIMs report readiness with a late +CPIN URC
                let device = &mut self.device;
                self.engine.listen(1_000, &mut |r, _| {
                    sim_decoder(r, &mut device.sim);
                    Flow::Continue
                })?;
            }
            i += 1;
        }

        if self.device.sim != SimState::Ready {
            if self.engine.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if self.device.sim == SimState::Missing {
                log::error!("SIM not inserted");
            }
            return Err(Error::Fatal);
        }
        if self.device.device == DeviceType::Unknown {
            log::error!("unknown module type {:?}", self.device.model.as_str());
            return Err(Error::Fatal);
        }
        log::info!("module {:?} ready", self.device.device);
        Ok(())
    }

    fn query_sim(&mut self, cmd: core::fmt::Arguments<'_>) -> Result<(), Error> {
        let device = &mut self.device;
        self.engine
            .query(cmd, self.config.default_timeout_ms, &mut |r, _| {
                sim_decoder(r, &mut device.sim);
                Flow::Continue
            })
    }

    /// Pulse the power key until the module answers, then configure the
    /// AT interface.
    fn boot(&mut self) -> Result<(), Error> {
        log::info!("[ Modem::power_on ]");
        // the module must be reachable for power-down even when cancelled
        let was_cancelled = self.engine.suspend_cancel();
        let alive = match self.wake() {
            Ok(alive) => alive,
            Err(e) => {
                self.engine.restore_cancel(was_cancelled);
                return Err(e);
            }
        };
        if !alive {
            self.engine.restore_cancel(was_cancelled);
            log::error!("no reply from module");
            return Err(Error::Fatal);
        }
        self.powered = true;

        let device = &mut self.device;
        let identify = self
            .engine
            .query(format_args!("AT+CGMM"), self.config.default_timeout_ms, &mut |r, _| {
                if r.kind == ResponseKind::Unknown && !r.text().is_empty() {
                    store(&mut device.model, r.text());
                    device.device = DeviceType::from_model(r.text());
                }
                Flow::Continue
            });
        if self.device.device == DeviceType::SaraR410 {
            self.device.power_save = PowerSave::Disabled;
        }
        self.engine.state_mut().device = self.device.device;
        self.engine.restore_cancel(was_cancelled);
        if was_cancelled {
            return Err(Error::Cancelled);
        }
        lenient(identify)?;

        // flush boot URCs
        self.engine.pump(200)?;

        let timeout = self.config.default_timeout_ms;
        self.engine.command(format_args!("ATE0"), timeout)?;
        self.engine.command(format_args!("AT+CMEE=2"), timeout)?;
        self.engine.command(format_args!("AT+CMER=1,0,0,2,1"), timeout)?;
        self.engine.command(format_args!("AT+IPR=115200"), timeout)?;
        self.engine.delay_ms(100);
        Ok(())
    }

    fn wake(&mut self) -> Result<bool, Error> {
        let attempts = self.config.power_on_attempts.max(1);
        for batch in 0..2 {
            for attempt in 1..=attempts {
                self.power.pulse_power();
                self.engine.purge()?;
                if self.at_ok() {
                    log::debug!("module answered after {} pulses", attempt);
                    return Ok(true);
                }
                log::warn!("no reply to AT, attempt {}/{}", attempt, attempts);
            }
            if batch == 0 {
                log::warn!("power key budget exhausted, resetting module");
                self.power.hardware_reset();
            }
        }
        Ok(false)
    }

    /// Read identity strings and apply module settings.
    pub fn init_device_info(&mut self) -> Result<&super::DeviceStatus, Error> {
        self.ensure_powered()?;
        log::info!("[ Modem::init_device_info ]");
        let previous = self.state;
        self.state = ModemState::DeviceInfo;
        let result = self.device_info_sequence();
        self.state = previous;
        result?;
        Ok(&self.device)
    }

    fn device_info_sequence(&mut self) -> Result<(), Error> {
        let timeout = self.config.default_timeout_ms;
        if self.device.device == DeviceType::SaraR410 {
            self.engine.delay_ms(250);
        }

        let device = &mut self.device;
        self.engine.query(format_args!("AT+CGSN"), timeout, &mut |r, _| {
            if r.kind == ResponseKind::Unknown {
                store(&mut device.imei, r.text());
            }
            Flow::Continue
        })?;
        if self.device.sim != SimState::Ready {
            if self.device.sim == SimState::Missing {
                log::error!("SIM not inserted");
            }
            return Err(Error::Fatal);
        }

        let device = &mut self.device;
        self.engine.query(format_args!("AT+CGMI"), timeout, &mut |r, _| {
            if r.kind == ResponseKind::Unknown {
                store(&mut device.manufacturer, r.text());
            }
            Flow::Continue
        })?;
        let device = &mut self.device;
        self.engine.query(format_args!("AT+CGMR"), timeout, &mut |r, _| {
            if r.kind == ResponseKind::Unknown {
                store(&mut device.version, r.text());
            }
            Flow::Continue
        })?;
        let device = &mut self.device;
        self.engine.query(format_args!("ATI9"), timeout, &mut |r, _| {
            if r.kind == ResponseKind::Unknown {
                store(&mut device.extended_version, r.text());
            }
            Flow::Continue
        })?;
        let device = &mut self.device;
        self.engine.query(format_args!("AT+CCID"), timeout, &mut |r, _| {
            if let Some(Ok(f)) = r.plus_body().map(|b| fields::named(b, "CCID")) {
                if let Ok(ccid) = fields::quoted(&f, 0) {
                    store(&mut device.ccid, ccid);
                }
            }
            Flow::Continue
        })?;
        let device = &mut self.device;
        self.engine.query(format_args!("AT+CIMI"), timeout, &mut |r, _| {
            if r.kind == ResponseKind::Unknown {
                store(&mut device.imsi, r.text());
            }
            Flow::Continue
        })?;
        self.engine
            .command(format_args!("AT+COPS=3,2"), self.config.cops_timeout_ms)?;

        if self.device.power_save != PowerSave::Disabled {
            let mode = self.config.power_save_mode;
            self.engine.command(format_args!("AT+UPSV={}", mode), timeout)?;
            if mode != 0 {
                self.device.power_save = PowerSave::Active;
            }
        }
        log::info!(
            "IMEI {} IMSI {} ICCID {}",
            self.device.imei.as_str(),
            self.device.imsi.as_str(),
            self.device.ccid.as_str()
        );
        Ok(())
    }

    /// Enable registration URCs and wait until the network accepts the
    /// module or `timeout_ms` elapses.
    ///
    /// A denied registration is logged but only the timeout ends polling.
    pub fn register_network(&mut self, timeout_ms: u32) -> Result<(), Error> {
        self.ensure_known_device()?;
        log::info!("[ Modem::register_network ]");
        self.state = ModemState::Registering;
        let result = self.register_sequence(timeout_ms);
        self.state = match result {
            Ok(()) => ModemState::Registered,
            Err(_) => ModemState::Ready,
        };
        result
    }

    fn register_sequence(&mut self, timeout_ms: u32) -> Result<(), Error> {
        let timeout = self.config.query_timeout_ms;
        if self.device.device.is_lte() {
            self.engine.command(format_args!("AT+CEREG=2"), timeout)?;
        } else {
            self.engine.command(format_args!("AT+CGREG=2"), timeout)?;
            self.engine.command(format_args!("AT+CREG=2"), timeout)?;
        }

        let start = self.engine.now_ms();
        loop {
            if self.check_network_status()? {
                return Ok(());
            }
            if self.engine.now_ms().saturating_sub(start) >= u64::from(timeout_ms) {
                break;
            }
            if self.engine.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let poll = self.engine.now_ms();
            let window = u64::from(self.config.registration_poll_ms.min(timeout_ms));
            while self.engine.now_ms().saturating_sub(poll) < window {
                self.engine.pump(10)?;
                if self.network_status().is_registered() {
                    break;
                }
            }
        }

        let network = self.network_status();
        if network.csd == Registration::Denied {
            log::error!("CSD registration denied");
        }
        if network.psd == Registration::Denied {
            log::error!("PSD registration denied");
        }
        if network.eps == Registration::Denied {
            log::error!("EPS registration denied");
        }
        Err(Error::Timeout)
    }

    /// Refresh the network status. True once fully registered.
    pub fn check_network_status(&mut self) -> Result<bool, Error> {
        self.ensure_known_device()?;
        if self.engine.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.engine.state_mut().network.reset();

        let timeout = self.config.query_timeout_ms;
        let lte = self.device.device.is_lte();
        if lte {
            lenient(self.engine.command(format_args!("AT+CEREG?"), timeout))?;
        } else {
            // unsubscribed services answer ERROR
            lenient(self.engine.command(format_args!("AT+CREG?"), timeout))?;
            lenient(self.engine.command(format_args!("AT+CGREG?"), timeout))?;
        }

        if self.network_status().any_registered() {
            if !self.at_ok() {
                return Err(Error::Timeout);
            }
            self.refresh_signal()?;
        }

        let network = self.network_status();
        Ok(if lte {
            network.eps.is_registered()
        } else {
            network.csd.is_registered() && network.psd.is_registered()
        })
    }

    /// Refresh operator, access technology and signal strength.
    pub fn signal_strength(&mut self) -> Result<&super::NetworkStatus, Error> {
        self.ensure_powered()?;
        log::info!("[ Modem::signal_strength ]");
        self.refresh_signal()?;
        Ok(self.network_status())
    }

    /// Refresh the cell identity from the operator and registration replies.
    pub fn cellular_global_identity(&mut self) -> Result<super::CellGlobalIdentity, Error> {
        self.ensure_powered()?;
        self.refresh_operator()?;
        let timeout = self.config.query_timeout_ms;
        if self.device.device.is_lte() {
            self.engine.command(format_args!("AT+CEREG?"), timeout)?;
        } else {
            self.engine.command(format_args!("AT+CREG?"), timeout)?;
            self.engine.command(format_args!("AT+CGREG?"), timeout)?;
        }
        Ok(self.cell_identity())
    }

    fn refresh_signal(&mut self) -> Result<(), Error> {
        self.refresh_operator()?;
        self.engine
            .query(format_args!("AT+CSQ"), self.config.query_timeout_ms, &mut |r, state| {
                // +CSQ: <rssi>,<qual>
                if let Some(Ok(f)) = r.plus_body().map(|b| fields::named(b, "CSQ")) {
                    if let (Ok(rssi), Ok(qual)) = (fields::int::<u8>(&f, 0), fields::int::<u8>(&f, 1)) {
                        signal::apply_csq(&mut state.network, rssi, qual);
                    }
                }
                Flow::Continue
            })
    }

    fn refresh_operator(&mut self) -> Result<(), Error> {
        let timeout = self.config.cops_timeout_ms;
        self.engine.command(format_args!("AT+COPS=3,2"), timeout)?;
        self.engine.query(format_args!("AT+COPS?"), timeout, &mut |r, state| {
            // +COPS: <mode>[,<format>,<oper>[,<AcT>]]
            if let Some(Ok(f)) = r.plus_body().map(|b| fields::named(b, "COPS")) {
                if let Ok(oper) = fields::quoted(&f, 2) {
                    let cgi = &mut state.network.cgi;
                    if oper.len() >= 5 && oper.bytes().all(|b| b.is_ascii_digit()) {
                        let (mcc, mnc) = oper.split_at(3);
                        cgi.mobile_country_code = mcc.parse().unwrap_or(0);
                        cgi.mobile_network_code = mnc.parse().unwrap_or(0);
                        cgi.two_digit_mnc = mnc.len() == 2;
                    }
                    store(&mut state.network.operator, oper);
                }
                if let Ok(act) = fields::int::<u8>(&f, 3) {
                    state.network.act = AccessTechnology::from_act(act);
                }
            }
            Flow::Continue
        })?;
        // the G350 reports no access technology
        if self.device.device == DeviceType::SaraG350 {
            self.engine.state_mut().network.act = AccessTechnology::Gsm;
        }
        Ok(())
    }

    /// Activate a data session and return its address.
    ///
    /// Without explicit credentials the last working ones are used, and
    /// failing those the carrier table entries for the SIM's IMSI. Each
    /// candidate is tried with every method `auth` allows.
    pub fn attach(
        &mut self,
        apn: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
        auth: Auth,
    ) -> Result<Ipv4Addr, Error> {
        self.ensure_known_device()?;
        log::info!("[ Modem::attach ]");
        let previous = self.state;
        self.state = ModemState::Attaching;
        let result = self.attach_sequence(apn, username, password, auth);
        match result {
            Ok(ip) => {
                log::info!("attached with address {}", ip);
                let state = self.engine.state_mut();
                state.ip = Some(ip);
                state.attached = true;
                state.push_event(NetworkEvent::Connected);
                self.state = ModemState::Attached;
            }
            Err(_) => self.state = previous,
        }
        result
    }

    fn attach_sequence(
        &mut self,
        apn: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
        auth: Auth,
    ) -> Result<Ipv4Addr, Error> {
        self.engine.state_mut().ip = None;

        if self.device.device.is_lte() {
            let mut ip = None;
            self.engine
                .query(format_args!("AT+CGPADDR=1"), self.config.default_timeout_ms, &mut |r, _| {
                    // +CGPADDR: <cid>,<address>
                    if let Some(Ok(f)) = r.plus_body().map(|b| fields::named(b, "CGPADDR")) {
                        ip = fields::ipv4(&f, 1).ok();
                    }
                    Flow::Continue
                })?;
            self.activated = true;
            return ip.ok_or(Error::Protocol);
        }

        self.engine
            .command(format_args!("AT+CGATT=1"), self.config.attach_timeout_ms)?;

        let profile = self.config.profile_timeout_ms;
        let mut active = 0u8;
        self.engine
            .query(format_args!("AT+UPSND=0,8"), profile, &mut |r, _| {
                // +UPSND: <profile>,8,<status>
                if let Some(Ok(f)) = r.plus_body().map(|b| fields::named(b, "UPSND")) {
                    active = fields::int(&f, 2).unwrap_or(0);
                }
                Flow::Continue
            })?;

        if active == 1 {
            log::debug!("data profile already active");
            self.activated = true;
        } else {
            self.activated = false;
            let candidates = self.candidates(apn, username, password)?;
            self.engine
                .command(format_args!("AT+UPSD=0,7,\"0.0.0.0\""), profile)?;

            let mut activated = None;
            'candidates: for candidate in candidates {
                log::debug!(
                    "trying APN {:?} user {:?}",
                    candidate.apn.as_str(),
                    candidate.username.as_str()
                );
                if !candidate.apn.is_empty() {
                    self.engine
                        .command(format_args!("AT+UPSD=0,1,\"{}\"", candidate.apn), profile)?;
                }
                if !candidate.username.is_empty() {
                    self.engine
                        .command(format_args!("AT+UPSD=0,2,\"{}\"", candidate.username), profile)?;
                }
                if !candidate.password.is_empty() {
                    self.engine
                        .command(format_args!("AT+UPSD=0,3,\"{}\"", candidate.password), profile)?;
                }
                for (method, code) in Auth::METHODS {
                    if !auth.allows(method) {
                        continue;
                    }
                    self.engine
                        .command(format_args!("AT+UPSD=0,6,{}", code), profile)?;
                    match self
                        .engine
                        .command(format_args!("AT+UPSDA=0,3"), self.config.activate_timeout_ms)
                    {
                        Ok(()) => {
                            log::info!("data profile activated with {:?}", method);
                            activated = Some(candidate);
                            break 'candidates;
                        }
                        Err(e) if e.is_retryable() => {
                            log::warn!("activation with {:?} failed: {}", method, e);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }

            let Some(credentials) = activated else {
                log::error!("APN, username or password may be wrong");
                return Err(Error::Protocol);
            };
            self.activated = true;
            self.credentials = Some(credentials);
        }

        let mut ip = None;
        self.engine
            .query(format_args!("AT+UPSND=0,0"), profile, &mut |r, _| {
                // +UPSND: 0,0,"<address>"
                if let Some(Ok(f)) = r.plus_body().map(|b| fields::named(b, "UPSND")) {
                    if f.first() == Some(&"0") && f.get(1) == Some(&"0") {
                        ip = fields::ipv4(&f, 2).ok();
                    }
                }
                Flow::Continue
            })?;
        for index in 1..=2 {
            lenient(self.engine.query(
                format_args!("AT+UPSND=0,{}", index),
                profile,
                &mut |r, _| {
                    if let Some(Ok(f)) = r.plus_body().map(|b| fields::named(b, "UPSND")) {
                        if let Ok(dns) = fields::ipv4(&f, 2) {
                            log::debug!("DNS server {}: {}", index, dns);
                        }
                    }
                    Flow::Continue
                },
            ))?;
        }
        ip.ok_or(Error::Protocol)
    }

    /// Credentials to try: the caller's, else the last working ones, else
    /// the carrier table.
    fn candidates(
        &self,
        apn: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Vec<Credentials, MAX_CANDIDATES>, Error> {
        let mut candidates = Vec::new();
        if apn.is_some() || username.is_some() || password.is_some() {
            let given = Credentials::new(
                apn.unwrap_or(""),
                username.unwrap_or(""),
                password.unwrap_or(""),
            )?;
            let _ = candidates.push(given);
        } else if let Some(last) = &self.credentials {
            let _ = candidates.push(last.clone());
        } else {
            for entry in super::apn::lookup(&self.device.imsi).iter().take(MAX_CANDIDATES) {
                let _ = candidates.push(Credentials::new(entry.apn, entry.username, entry.password)?);
            }
        }
        if candidates.is_empty() {
            // let the module use its stored profile
            let _ = candidates.push(Credentials::default());
        }
        Ok(candidates)
    }

    /// Register and attach in one go.
    pub fn connect(
        &mut self,
        apn: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
        auth: Auth,
    ) -> Result<Ipv4Addr, Error> {
        self.register_network(self.config.registration_timeout_ms)?;
        self.attach(apn, username, password, auth)
    }

    /// Deactivate the data session and detach from the packet domain.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        self.deactivate()?;
        self.detach()?;
        self.engine.state_mut().push_event(NetworkEvent::Disconnected);
        Ok(())
    }

    /// Deactivate the data profile. Works while cancelled.
    pub fn deactivate(&mut self) -> Result<(), Error> {
        if !self.is_attached() {
            return Err(Error::NotConnected);
        }
        log::info!("[ Modem::deactivate ]");
        let was_cancelled = self.engine.suspend_cancel();
        self.state = ModemState::Disconnecting;

        let result = if self.ip().is_none() {
            Err(Error::NotConnected)
        } else if self.device.device.is_lte() {
            Ok(())
        } else {
            self.engine
                .command(format_args!("AT+UPSDA=0,4"), self.config.activate_timeout_ms)
        };
        if result.is_ok() {
            let state = self.engine.state_mut();
            state.ip = None;
            state.attached = false;
        }
        self.state = if result.is_ok() {
            ModemState::Registered
        } else {
            ModemState::Attached
        };

        self.engine.restore_cancel(was_cancelled);
        result
    }

    /// Detach from the packet domain. Works while cancelled.
    pub fn detach(&mut self) -> Result<(), Error> {
        if !self.activated {
            return Err(Error::NotConnected);
        }
        log::info!("[ Modem::detach ]");
        let was_cancelled = self.engine.suspend_cancel();
        let previous = self.state;
        self.state = ModemState::Detaching;

        let result = if self.device.device.is_lte() {
            if self.at_ok() {
                self.engine
                    .command(format_args!("AT+COPS=2,2"), self.config.cops_timeout_ms)
            } else {
                Err(Error::Timeout)
            }
        } else {
            self.engine
                .command(format_args!("AT+CGATT=0"), self.config.attach_timeout_ms)
        };
        if result.is_ok() {
            self.activated = false;
            self.engine.state_mut().clear_session();
            self.state = ModemState::Registered;
        } else {
            self.state = previous;
        }

        self.engine.restore_cancel(was_cancelled);
        result
    }

    /// Re-activate the data profile after the network dropped it.
    pub fn reconnect(&mut self) -> Result<Ipv4Addr, Error> {
        if !self.activated {
            return Err(Error::NotConnected);
        }
        if let (true, Some(ip)) = (self.is_attached(), self.ip()) {
            return Ok(ip);
        }
        log::info!("[ Modem::reconnect ]");
        self.engine
            .command(format_args!("AT+UPSDA=0,3"), self.config.activate_timeout_ms)?;

        let mut ip = None;
        self.engine.query(
            format_args!("AT+UPSND=0,0"),
            self.config.profile_timeout_ms,
            &mut |r, _| {
                if let Some(Ok(f)) = r.plus_body().map(|b| fields::named(b, "UPSND")) {
                    ip = fields::ipv4(&f, 2).ok();
                }
                Flow::Continue
            },
        )?;
        let ip = ip.ok_or(Error::Protocol)?;
        let state = self.engine.state_mut();
        state.ip = Some(ip);
        state.attached = true;
        state.push_event(NetworkEvent::Connected);
        self.state = ModemState::Attached;
        Ok(ip)
    }

    /// Shut the module down, falling back to the power key when it does
    /// not answer. Works while cancelled.
    pub fn power_off(&mut self) -> Result<(), Error> {
        self.shutdown();
        Ok(())
    }

    /// Body of [`power_off`](Self::power_off). False when `AT+CPWROFF` was
    /// never acknowledged and the module may still be running.
    fn shutdown(&mut self) -> bool {
        let was_cancelled = self.engine.suspend_cancel();
        let mut graceful = !self.powered;
        if self.powered {
            log::info!("[ Modem::power_off ]");
            for attempt in 1..=self.config.power_off_attempts.max(1) {
                if !self.at_ok() {
                    log::info!("no reply to AT, using power key");
                    self.power.pulse_power();
                    break;
                }
                match self
                    .engine
                    .command(format_args!("AT+CPWROFF"), self.config.power_off_timeout_ms)
                {
                    Ok(()) => {
                        graceful = true;
                        break;
                    }
                    Err(Error::Aborted) => log::info!("power off aborted, retrying ({})", attempt),
                    Err(e) => log::info!("power off failed: {}, retrying ({})", e, attempt),
                }
            }
            self.engine.delay_ms(1_000);
        }

        self.powered = false;
        self.activated = false;
        let state = self.engine.state_mut();
        state.clear_session();
        state.sockets.clear();
        state.network.reset();
        self.state = ModemState::Off;

        self.engine.restore_cancel(was_cancelled);
        graceful
    }

    /// Resolve a host name to an address.
    ///
    /// Dotted-quad strings are parsed locally.
    pub fn resolve(&mut self, host: &str) -> Result<Ipv4Addr, Error> {
        if let Some(ip) = fields::parse_ipv4(host) {
            return Ok(ip);
        }
        self.ensure_powered()?;
        let mut ip = None;
        self.engine.query(
            format_args!("AT+UDNSRN=0,\"{}\"", host),
            self.config.dns_timeout_ms,
            &mut |r, _| {
                // +UDNSRN: "<address>"
                if let Some(Ok(f)) = r.plus_body().map(|b| fields::named(b, "UDNSRN")) {
                    ip = fields::ipv4(&f, 0).ok();
                }
                Flow::Continue
            },
        )?;
        let ip = ip.ok_or(Error::Protocol)?;
        log::debug!("{} resolved to {}", host, ip);
        Ok(ip)
    }

    fn ensure_known_device(&self) -> Result<(), Error> {
        self.ensure_powered()?;
        if self.device.device == DeviceType::Unknown {
            return Err(Error::NotPowered);
        }
        Ok(())
    }
}

/// Track `+CPIN` replies and the "SIM not inserted" error.
fn sim_decoder(r: &crate::at::Response<'_>, sim: &mut SimState) {
    match r.kind {
        ResponseKind::Plus => {
            if let Some(Ok(f)) = r.plus_body().map(|b| fields::named(b, "CPIN")) {
                *sim = if f.first() == Some(&"READY") {
                    SimState::Ready
                } else {
                    SimState::PinRequired
                };
            }
        }
        ResponseKind::Error => {
            if r.text().contains("SIM not inserted") {
                *sim = SimState::Missing;
            }
        }
        _ => {}
    }
}
