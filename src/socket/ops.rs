//! Socket operations on the modem
//!
//! Every operation maps a local [`SocketId`] to the module handle stored in
//! its slot and runs one or more exchanges:
//!
//! ```text
//!   socket_open     AT+USOCR=6 | AT+USOCR=17[,port]   ──► +USOCR: <h>
//!   socket_connect  AT+USOCO=<h>,"<ip>",<port>
//!   socket_send     AT+USOWR=<h>,<n>  ──► @  ──► <n raw bytes> ──► OK
//!   socket_send_to  AT+USOST=<h>,"<ip>",<port>,<n> ──► @ ──► ...
//!   socket_receive  AT+USORD=<h>,<n>  ──► +USORD: <h>,<n>,"<bytes>"
//!   socket_close    AT+USOCL=<h>
//! ```

use core::net::SocketAddrV4;

use super::{Protocol, SocketId, SocketSlot};
use crate::at::{Response, ResponseKind, fields};
use crate::engine::{Error, Flow, Reply, State};
use crate::modem::Modem;
use crate::modem::lenient;
use crate::transport::{Clock, PowerControl, Transport};

/// Handles the module can hand out, `0..MODULE_HANDLES`.
pub const MODULE_HANDLES: u8 = 7;

/// Resends of one write chunk after a timeout or error.
const SEND_RETRIES: u8 = 1;

/// Where a write chunk goes.
#[derive(Debug, Clone, Copy)]
enum Destination {
    /// The connected peer, `+USOWR`
    Stream,
    /// An explicit peer, `+USOST`
    Datagram(SocketAddrV4),
}

/// Record the handle of a `+USOCR: <h>` or `+USOCTL: <h>,<param>,<value>`
/// reply.
fn handle_decoder<'a, const S: usize>(
    name: &'static str,
    handle: &'a mut Option<u8>,
) -> impl FnMut(&Response<'_>, &mut State<S>) -> Flow + 'a {
    move |r, _| {
        if let Some(Ok(f)) = r.plus_body().map(|b| fields::named(b, name)) {
            if let Ok(h) = fields::int(&f, 0) {
                *handle = Some(h);
            }
        }
        Flow::Continue
    }
}

impl<T, C, P, const S: usize> Modem<'_, T, C, P, S>
where
    T: Transport,
    C: Clock,
    P: PowerControl,
{
    /// Allocate a slot and create a module socket for it.
    ///
    /// `local_port` only applies to UDP sockets on 2G/3G modules.
    pub fn socket_open(&mut self, protocol: Protocol, local_port: Option<u16>) -> Result<SocketId, Error> {
        self.ensure_powered()?;
        if !self.is_attached() {
            self.reconnect()?;
        }
        self.engine
            .command(format_args!("AT"), self.config.at_timeout_ms)?;

        let id = self
            .engine
            .state()
            .sockets
            .find_free()
            .ok_or(Error::ResourceExhausted)?;
        log::debug!("{}: creating {:?} socket", id, protocol);

        let handle = match self.create_socket(protocol, local_port) {
            Ok(handle) => handle,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                log::warn!("socket create failed ({}), reclaiming stale handles", e);
                if self.close_orphans() {
                    log::debug!("closed stale socket handle(s)");
                }
                self.create_socket(protocol, local_port).map_err(|e| match e {
                    Error::Cancelled => Error::Cancelled,
                    _ => Error::ResourceExhausted,
                })?
            }
        };

        let timeout = self.config.socket_timeout_ms;
        self.engine
            .state_mut()
            .sockets
            .assign(id, handle, protocol, timeout);
        log::debug!("{}: handle {} was created", id, handle);
        Ok(id)
    }

    fn create_socket(&mut self, protocol: Protocol, local_port: Option<u16>) -> Result<u8, Error> {
        let timeout = self.config.socket_create_timeout_ms;
        let mut handle = None;
        {
            let mut decoder = handle_decoder::<S>("USOCR", &mut handle);
            match (protocol, local_port) {
                (Protocol::Udp, Some(port)) => {
                    self.engine
                        .query(format_args!("AT+USOCR=17,{}", port), timeout, &mut decoder)?
                }
                _ => self.engine.query(
                    format_args!("AT+USOCR={}", protocol.code()),
                    timeout,
                    &mut decoder,
                )?,
            }
        }
        handle.ok_or(Error::Protocol)
    }

    /// Close module handles no slot owns, e.g. left over from before a
    /// local restart. True if any was closed.
    fn close_orphans(&mut self) -> bool {
        let mut closed = false;
        for handle in 0..MODULE_HANDLES {
            if self.engine.state().sockets.find_handle(handle).is_some() {
                continue;
            }
            let mut open = None;
            let queried = self.engine.query(
                format_args!("AT+USOCTL={},1", handle),
                self.config.socket_create_timeout_ms,
                &mut handle_decoder::<S>("USOCTL", &mut open),
            );
            let Some(open) = open.filter(|_| queried.is_ok()) else {
                continue;
            };
            log::debug!("handle {} was open, closing", open);
            if self
                .engine
                .command(format_args!("AT+USOCL={}", open), self.config.socket_close_timeout_ms)
                .is_ok()
            {
                closed = true;
            }
        }
        closed
    }

    /// Connect a TCP socket. Connecting a connected socket does nothing.
    pub fn socket_connect(&mut self, id: SocketId, addr: SocketAddrV4) -> Result<(), Error> {
        let slot = self.slot(id)?;
        if slot.connected {
            return Ok(());
        }
        let handle = slot.handle.ok_or(Error::InvalidSocket)?;
        self.ensure_eps()?;
        log::debug!("{}: connecting to {}", id, addr);
        self.engine.command(
            format_args!("AT+USOCO={},\"{}\",{}", handle, addr.ip(), addr.port()),
            self.config.socket_connect_timeout_ms,
        )?;
        if let Some(slot) = self.engine.state_mut().sockets.active_mut(id) {
            slot.connected = true;
        }
        Ok(())
    }

    /// Resolve `host` and connect to it.
    pub fn socket_connect_host(&mut self, id: SocketId, host: &str, port: u16) -> Result<(), Error> {
        let ip = self.resolve(host)?;
        self.socket_connect(id, SocketAddrV4::new(ip, port))
    }

    pub fn socket_is_connected(&self, id: SocketId) -> bool {
        self.engine
            .state()
            .sockets
            .active(id)
            .is_some_and(|s| s.connected)
    }

    /// Set how long a receive waits for data; `u32::MAX` waits forever.
    pub fn socket_set_blocking(&mut self, id: SocketId, timeout_ms: u32) -> Result<(), Error> {
        let slot = self
            .engine
            .state_mut()
            .sockets
            .active_mut(id)
            .ok_or(Error::InvalidSocket)?;
        slot.timeout_ms = timeout_ms;
        Ok(())
    }

    /// Bytes the module reported as waiting, after a short URC pump.
    pub fn socket_readable(&mut self, id: SocketId) -> Result<usize, Error> {
        if self.engine.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if !self.slot(id)?.connected {
            return Err(Error::NotConnected);
        }
        self.engine.pump(10)?;
        match self.slot(id)? {
            slot if slot.connected => Ok(slot.pending),
            _ => Err(Error::NotConnected),
        }
    }

    /// Send on a connected socket, returning the bytes the module accepted.
    ///
    /// A chunk that keeps failing ends the send; what went out before it is
    /// reported as a short write.
    pub fn socket_send(&mut self, id: SocketId, data: &[u8]) -> Result<usize, Error> {
        let sent = self.send_chunks(id, Destination::Stream, data)?;
        self.requery_idle(id);
        Ok(sent)
    }

    /// Send one datagram to `peer`.
    pub fn socket_send_to(&mut self, id: SocketId, peer: SocketAddrV4, data: &[u8]) -> Result<usize, Error> {
        let sent = self.send_chunks(id, Destination::Datagram(peer), data)?;
        self.requery_idle(id);
        Ok(sent)
    }

    fn send_chunks(&mut self, id: SocketId, to: Destination, data: &[u8]) -> Result<usize, Error> {
        let mut sent = 0;
        for chunk in data.chunks(self.config.max_write.max(1)) {
            let handle = self.slot(id)?.handle.ok_or(Error::InvalidSocket)?;
            match self.write_chunk(handle, to, chunk) {
                Ok(()) => sent += chunk.len(),
                Err(e) if sent > 0 => {
                    log::warn!("{}: short write, {} of {} bytes ({})", id, sent, data.len(), e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(sent)
    }

    fn write_chunk(&mut self, handle: u8, to: Destination, chunk: &[u8]) -> Result<(), Error> {
        let mut attempt = 0;
        loop {
            self.ensure_eps()?;
            let (reply, timeout) = match to {
                Destination::Stream => {
                    let timeout = self.config.socket_write_timeout_ms;
                    let reply = self.engine.execute(
                        format_args!("AT+USOWR={},{}", handle, chunk.len()),
                        timeout,
                        &mut |_, _| Flow::Continue,
                    );
                    (reply, timeout)
                }
                Destination::Datagram(peer) => {
                    let timeout = self.config.socket_send_to_timeout_ms;
                    let reply = self.engine.execute(
                        format_args!("AT+USOST={},\"{}\",{},{}", handle, peer.ip(), peer.port(), chunk.len()),
                        timeout,
                        &mut |_, _| Flow::Continue,
                    );
                    (reply, timeout)
                }
            };

            let result = match reply {
                Ok(Reply::Prompt) => {
                    self.engine.send_raw(chunk)?;
                    match self.engine.wait_final(timeout, &mut |_, _| Flow::Continue) {
                        Ok(Reply::Ok) => Ok(()),
                        Ok(_) => Err(Error::Protocol),
                        Err(e) => Err(e),
                    }
                }
                // the first attempt's data went out late, the resend gets a bare OK
                Ok(Reply::Ok) if attempt > 0 => Ok(()),
                Ok(_) => Err(Error::Protocol),
                Err(e) => Err(e),
            };
            match result {
                Err(e) if e.is_retryable() && attempt < SEND_RETRIES => {
                    attempt += 1;
                    log::warn!("write on handle {} failed ({}), retrying", handle, e);
                }
                other => return other,
            }
        }
    }

    /// Receive on a connected socket into `buf`.
    ///
    /// The pending count is asked from the module before reading. Reads
    /// continue until `buf` is full, the socket's timeout elapses or the
    /// socket is closed; the bytes read so far are returned in every case.
    pub fn socket_receive(&mut self, id: SocketId, buf: &mut [u8]) -> Result<usize, Error> {
        let slot = self.slot(id)?;
        let handle = slot.handle.ok_or(Error::InvalidSocket)?;
        if !slot.connected {
            return Err(Error::NotConnected);
        }
        self.requery(handle, slot.protocol)?;

        let start = self.engine.now_ms();
        let mut received = 0;
        while received < buf.len() {
            let Ok(slot) = self.slot(id) else {
                log::debug!("{}: closed during read", id);
                break;
            };
            if !slot.connected {
                break;
            }

            let block = (buf.len() - received)
                .min(self.config.max_read)
                .min(slot.pending);
            if block > 0 {
                let n = match self.read_chunk(handle, &mut buf[received..received + block]) {
                    Ok(n) => n,
                    Err(e) if received > 0 => {
                        log::warn!("{}: read ended early ({})", id, e);
                        break;
                    }
                    Err(e) => return Err(e),
                };
                if let Some(slot) = self.engine.state_mut().sockets.active_mut(id) {
                    slot.pending = slot.pending.saturating_sub(n);
                }
                received += n;
                if n > 0 {
                    continue;
                }
                // reported bytes did not arrive yet
                self.requery(handle, slot.protocol)?;
            }

            if expired(self.engine.now_ms(), start, slot.timeout_ms) {
                break;
            }
            match self.engine.pump(10) {
                Ok(()) => {}
                Err(_) if received > 0 => break,
                Err(e) => return Err(e),
            }
        }

        self.requery_idle(id);
        Ok(received)
    }

    fn read_chunk(&mut self, handle: u8, out: &mut [u8]) -> Result<usize, Error> {
        let mut copied = 0;
        self.engine.query(
            format_args!("AT+USORD={},{}", handle, out.len()),
            self.config.socket_read_timeout_ms,
            &mut |r, _| {
                if r.kind != ResponseKind::Plus {
                    return Flow::Continue;
                }
                // +USORD: <h>,<n>,"<bytes>"
                if let Ok((header, data)) = fields::payload_reply(r.bytes, "USORD", 2) {
                    if fields::int::<u8>(&header, 0) == Ok(handle) {
                        let n = data.len().min(out.len());
                        out[..n].copy_from_slice(&data[..n]);
                        copied = n;
                    }
                }
                Flow::Continue
            },
        )?;
        Ok(copied)
    }

    /// Receive one datagram into `buf`, returning its length and sender.
    ///
    /// `None` when nothing arrived before the socket's timeout.
    pub fn socket_receive_from(
        &mut self,
        id: SocketId,
        buf: &mut [u8],
    ) -> Result<Option<(usize, SocketAddrV4)>, Error> {
        let slot = self.slot(id)?;
        let handle = slot.handle.ok_or(Error::InvalidSocket)?;
        self.requery(handle, slot.protocol)?;

        let start = self.engine.now_ms();
        let mut datagram = None;
        loop {
            let slot = self.slot(id)?;
            if slot.pending > 0 && !buf.is_empty() {
                let len = buf.len().min(self.config.max_read);
                datagram = self.read_datagram(handle, &mut buf[..len])?;
                if let (Some((n, _)), Some(slot)) =
                    (datagram, self.engine.state_mut().sockets.active_mut(id))
                {
                    slot.pending = slot.pending.saturating_sub(n);
                }
                break;
            }
            if expired(self.engine.now_ms(), start, slot.timeout_ms) {
                break;
            }
            self.engine.pump(10)?;
        }

        self.requery_idle(id);
        Ok(datagram)
    }

    fn read_datagram(&mut self, handle: u8, out: &mut [u8]) -> Result<Option<(usize, SocketAddrV4)>, Error> {
        let mut datagram = None;
        self.engine.query(
            format_args!("AT+USORF={},{}", handle, out.len()),
            self.config.socket_read_timeout_ms,
            &mut |r, _| {
                if r.kind != ResponseKind::Plus {
                    return Flow::Continue;
                }
                // +USORF: <h>,"<ip>",<port>,<n>,"<bytes>"
                if let Ok((header, data)) = fields::payload_reply(r.bytes, "USORF", 4) {
                    let peer = (fields::ipv4(&header, 1), fields::int::<u16>(&header, 2));
                    if let (Ok(ip), Ok(port)) = peer {
                        let n = data.len().min(out.len());
                        out[..n].copy_from_slice(&data[..n]);
                        datagram = Some((n, SocketAddrV4::new(ip, port)));
                    }
                }
                Flow::Continue
            },
        )?;
        Ok(datagram)
    }

    /// Close the module socket. The slot stays allocated.
    ///
    /// A failing close is logged and the socket treated as closed anyway.
    pub fn socket_close(&mut self, id: SocketId) -> Result<(), Error> {
        let slot = self.slot(id)?;
        let handle = slot.handle.ok_or(Error::InvalidSocket)?;
        let mut result = Ok(());
        if slot.open || slot.connected {
            log::debug!("{}: closing handle {}", id, handle);
            result = self.close_handle(handle);
            if let Err(e) = result {
                log::warn!("{}: close failed ({}), assuming closed", id, e);
            }
        }
        if let Some(slot) = self.engine.state_mut().sockets.active_mut(id) {
            slot.connected = false;
            slot.open = false;
        }
        match result {
            Err(Error::Cancelled) => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    fn close_handle(&mut self, handle: u8) -> Result<(), Error> {
        self.ensure_eps()?;
        let result = self.engine.command(
            format_args!("AT+USOCL={}", handle),
            self.config.socket_close_timeout_ms,
        );
        if result == Err(Error::Protocol) && !self.device.device.is_lte() {
            lenient(self.engine.query(
                format_args!("AT+CEER"),
                self.config.default_timeout_ms,
                &mut |r, _| {
                    if r.kind == ResponseKind::Plus {
                        log::info!("close cause: {}", r.text());
                    }
                    Flow::Continue
                },
            ))?;
        }
        result
    }

    /// Close the socket and return its slot to the pool.
    ///
    /// The slot is released even when the close fails. Freeing a free slot
    /// does nothing.
    pub fn socket_free(&mut self, id: SocketId) -> Result<(), Error> {
        if id.0 >= self.engine.state().sockets.capacity() {
            return Err(Error::InvalidSocket);
        }
        if self.engine.state().sockets.active(id).is_some() {
            let _ = self.socket_close(id);
            self.engine.state_mut().sockets.release(id);
            log::debug!("{} freed", id);
        }
        Ok(())
    }

    /// Copy of an allocated slot. Out-of-range ids are invalid, free slots
    /// not connected.
    fn slot(&self, id: SocketId) -> Result<SocketSlot, Error> {
        let sockets = &self.engine.state().sockets;
        if id.0 >= sockets.capacity() {
            return Err(Error::InvalidSocket);
        }
        sockets.active(id).copied().ok_or(Error::NotConnected)
    }

    /// Ask the module for the pending byte count with a zero-length read.
    /// The reply lands in the slot through the URC table.
    fn requery(&mut self, handle: u8, protocol: Protocol) -> Result<(), Error> {
        let timeout = self.config.socket_read_timeout_ms;
        let result = match protocol {
            Protocol::Tcp => self
                .engine
                .command(format_args!("AT+USORD={},0", handle), timeout),
            Protocol::Udp => self
                .engine
                .command(format_args!("AT+USORF={},0", handle), timeout),
        };
        lenient(result)
    }

    /// Re-arm pending notifications once nothing is left to read.
    fn requery_idle(&mut self, id: SocketId) {
        let Ok(slot) = self.slot(id) else {
            return;
        };
        if let (0, Some(handle)) = (slot.pending, slot.handle) {
            let _ = self.requery(handle, slot.protocol);
        }
    }

    /// LTE modules can lock up on socket commands while EPS is lost.
    fn ensure_eps(&mut self) -> Result<(), Error> {
        if !self.device.device.is_lte() {
            return Ok(());
        }
        self.engine
            .command(format_args!("AT+CEREG?"), self.config.query_timeout_ms)?;
        if self.network_status().eps.is_registered() {
            Ok(())
        } else {
            log::warn!("EPS not registered, refusing socket command");
            Err(Error::NotConnected)
        }
    }
}

fn expired(now: u64, start: u64, timeout_ms: u32) -> bool {
    timeout_ms != u32::MAX && now.saturating_sub(start) >= u64::from(timeout_ms)
}
