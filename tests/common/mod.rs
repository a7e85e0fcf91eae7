//! Simulated u-blox module for the integration tests.
//!
//! The three board handles share one [`ModemSim`]. Commands written by the
//! driver are answered from a table of scripted replies, raw payloads after a
//! prompt are captured, and time only moves when the driver sleeps.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use libcellular::prelude::*;

/// Reply to one command.
#[derive(Debug, Clone)]
pub enum Answer {
    /// Bytes sent back as they are.
    Text(String),
    /// Prompt, then `then` once `len` raw bytes arrived.
    Prompt { len: usize, then: String },
    /// No reply at all.
    Silent,
}

pub fn ok() -> Answer {
    Answer::Text("\r\nOK\r\n".into())
}

pub fn error() -> Answer {
    Answer::Text("\r\nERROR\r\n".into())
}

/// An information line followed by OK.
pub fn info(line: &str) -> Answer {
    Answer::Text(format!("\r\n{}\r\n\r\nOK\r\n", line))
}

#[derive(Debug, Default)]
pub struct ModemSim {
    pub now: u64,
    pub powered: bool,
    /// Ignore power pulses until the reset line was used once.
    pub needs_reset: bool,
    pub pulses: usize,
    pub resets: usize,
    pub commands: Vec<String>,
    pub payloads: Vec<Vec<u8>>,
    to_host: VecDeque<u8>,
    partial: Vec<u8>,
    raw: Option<(usize, Vec<u8>, String)>,
    replies: HashMap<String, VecDeque<Answer>>,
    scheduled: Vec<(u64, String)>,
}

pub type Shared = Rc<RefCell<ModemSim>>;

impl ModemSim {
    /// Script the replies to `cmd`. Replies are used in order and the last
    /// one keeps answering.
    pub fn reply(&mut self, cmd: &str, answers: &[Answer]) {
        self.replies.insert(cmd.to_string(), answers.iter().cloned().collect());
    }

    /// Deliver `text` to the driver now.
    pub fn inject(&mut self, text: &str) {
        self.to_host.extend(text.as_bytes());
    }

    /// Deliver `text` once the clock reaches `at_ms`.
    pub fn schedule(&mut self, at_ms: u64, text: &str) {
        self.scheduled.push((at_ms, text.to_string()));
    }

    /// How many times `cmd` was sent.
    pub fn count(&self, cmd: &str) -> usize {
        self.commands.iter().filter(|c| c.as_str() == cmd).count()
    }

    pub fn sent(&self, cmd: &str) -> bool {
        self.count(cmd) > 0
    }

    fn answer(&mut self, cmd: &str) -> Answer {
        match self.replies.get_mut(cmd) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(ok),
            Some(queue) => queue.front().cloned().unwrap_or_else(ok),
            None => ok(),
        }
    }

    fn receive(&mut self, byte: u8) {
        if let Some((len, data, then)) = self.raw.as_mut() {
            data.push(byte);
            if data.len() == *len {
                let then = then.clone();
                let data = std::mem::take(data);
                self.raw = None;
                self.payloads.push(data);
                self.inject(&then);
            }
            return;
        }

        self.partial.push(byte);
        if !self.partial.ends_with(b"\r\n") {
            return;
        }
        let line = String::from_utf8_lossy(&self.partial[..self.partial.len() - 2]).into_owned();
        self.partial.clear();
        self.commands.push(line.clone());
        if !self.powered {
            return;
        }

        match self.answer(&line) {
            Answer::Text(text) => self.inject(&text),
            Answer::Prompt { len, then } => {
                self.inject("\r\n@");
                self.raw = Some((len, Vec::new(), then));
            }
            Answer::Silent => {}
        }
        if line == "AT+CPWROFF" {
            self.powered = false;
        }
    }

    fn advance(&mut self, ms: u32) {
        self.now += u64::from(ms);
        let now = self.now;
        let (due, later): (Vec<_>, Vec<_>) = self.scheduled.drain(..).partition(|(at, _)| *at <= now);
        self.scheduled = later;
        for (_, text) in due {
            self.inject(&text);
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimTransport(pub Shared);

impl Transport for SimTransport {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut sim = self.0.borrow_mut();
        let n = buf.len().min(sim.to_host.len());
        for (slot, byte) in buf.iter_mut().zip(sim.to_host.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut sim = self.0.borrow_mut();
        for &b in buf {
            sim.receive(b);
        }
        Ok(buf.len())
    }

    fn bytes_available(&self) -> usize {
        self.0.borrow().to_host.len()
    }
}

#[derive(Debug, Clone)]
pub struct SimClock(pub Shared);

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.0.borrow().now
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.borrow_mut().advance(ms);
    }
}

#[derive(Debug, Clone)]
pub struct SimPower(pub Shared);

impl PowerControl for SimPower {
    fn pulse_power(&mut self) {
        let mut sim = self.0.borrow_mut();
        sim.pulses += 1;
        if !sim.needs_reset || sim.resets > 0 {
            sim.powered = true;
        }
    }

    fn hardware_reset(&mut self) {
        self.0.borrow_mut().resets += 1;
    }
}

pub type SimModem<'a> = Modem<'a, SimTransport, SimClock, SimPower>;

/// A SARA-U260 on a Vodafone UK SIM, registered on both domains.
pub fn u260() -> Shared {
    let sim = Shared::default();
    {
        let mut s = sim.borrow_mut();
        s.reply("AT+CGMM", &[info("SARA-U260")]);
        s.reply("AT+CPIN?", &[info("+CPIN: READY")]);
        s.reply("AT+CGSN", &[info("352753090000001")]);
        s.reply("AT+CGMI", &[info("u-blox")]);
        s.reply("AT+CGMR", &[info("23.20")]);
        s.reply("ATI9", &[info("23.20,A01.01")]);
        s.reply("AT+CCID", &[info("+CCID: 8944110068256270054")]);
        s.reply("AT+CIMI", &[info("234150000000001")]);
        s.reply("AT+CREG?", &[info("+CREG: 2,1,\"3A9B\",\"01A2B3C4\"")]);
        s.reply("AT+CGREG?", &[info("+CGREG: 2,1,\"3A9B\",\"01A2B3C4\"")]);
        s.reply("AT+COPS?", &[info("+COPS: 0,2,\"23415\",2")]);
        s.reply("AT+CSQ", &[info("+CSQ: 15,2")]);
        s.reply("AT+UPSND=0,8", &[info("+UPSND: 0,8,0")]);
        s.reply("AT+UPSND=0,0", &[info("+UPSND: 0,0,\"10.52.1.7\"")]);
        s.reply("AT+UPSND=0,1", &[info("+UPSND: 0,1,\"8.8.8.8\"")]);
        s.reply("AT+UPSND=0,2", &[info("+UPSND: 0,2,\"8.8.4.4\"")]);
        s.reply("AT+UDNSRN=0,\"example.com\"", &[info("+UDNSRN: \"93.184.216.34\"")]);
    }
    sim
}

pub fn modem<'a>(sim: &Shared, cancel: &'a CancelFlag) -> SimModem<'a> {
    let _ = env_logger::builder().is_test(true).try_init();
    Modem::new(
        SimTransport(sim.clone()),
        SimClock(sim.clone()),
        SimPower(sim.clone()),
        cancel,
        Config::default(),
    )
}

/// Powered, registered and attached.
pub fn online<'a>(sim: &Shared, cancel: &'a CancelFlag) -> SimModem<'a> {
    let mut modem = modem(sim, cancel);
    modem.power_on(None).unwrap();
    modem.init_device_info().unwrap();
    modem.connect(None, None, None, Auth::Detect).unwrap();
    modem
}
