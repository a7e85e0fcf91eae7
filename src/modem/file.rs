//! Module file system
//!
//! Small files in the module's flash, e.g. certificates or configuration
//! blobs, written with a prompt exchange and read back as one
//! length-prefixed `+URDFILE` reply.

use super::Modem;
use crate::at::{ResponseKind, fields};
use crate::engine::{Error, Flow, Reply};
use crate::transport::{Clock, PowerControl, Transport};

impl<T, C, P, const S: usize> Modem<'_, T, C, P, S>
where
    T: Transport,
    C: Clock,
    P: PowerControl,
{
    /// Delete `name`. A missing file counts as deleted.
    pub fn delete_file(&mut self, name: &str) -> Result<(), Error> {
        self.ensure_powered()?;
        self.engine.query(
            format_args!("AT+UDELFILE=\"{}\"", name),
            self.config.default_timeout_ms,
            &mut |r, _| {
                if r.kind == ResponseKind::Error && r.text().contains("FILE NOT FOUND") {
                    Flow::Stop
                } else {
                    Flow::Continue
                }
            },
        )
    }

    /// Write `data` to `name`, replacing any previous content.
    pub fn write_file(&mut self, name: &str, data: &[u8]) -> Result<usize, Error> {
        self.ensure_powered()?;
        let timeout = self.config.default_timeout_ms;
        match self.engine.execute(
            format_args!("AT+UDWNFILE=\"{}\",{}", name, data.len()),
            timeout,
            &mut |_, _| Flow::Continue,
        )? {
            Reply::Prompt => {}
            _ => return Err(Error::Protocol),
        }
        self.engine.send_raw(data)?;
        match self.engine.wait_final(timeout, &mut |_, _| Flow::Continue)? {
            Reply::Ok => {
                log::debug!("wrote {} bytes to {}", data.len(), name);
                Ok(data.len())
            }
            _ => Err(Error::Protocol),
        }
    }

    /// Read `name` into `buf`, returning the bytes copied.
    ///
    /// Content beyond `buf.len()` is dropped.
    pub fn read_file(&mut self, name: &str, buf: &mut [u8]) -> Result<usize, Error> {
        self.ensure_powered()?;
        let mut copied = None;
        self.engine.query(
            format_args!("AT+URDFILE=\"{}\"", name),
            self.config.default_timeout_ms,
            &mut |r, _| {
                if r.kind != ResponseKind::Plus {
                    return Flow::Continue;
                }
                // +URDFILE: "<name>",<length>,"<data>"
                if let Ok((header, data)) = fields::payload_reply(r.bytes, "URDFILE", 2) {
                    if fields::quoted(&header, 0) == Ok(name) {
                        let n = data.len().min(buf.len());
                        buf[..n].copy_from_slice(&data[..n]);
                        copied = Some(n);
                    }
                }
                Flow::Continue
            },
        )?;
        copied.ok_or(Error::Protocol)
    }
}
