//! AT response framing
//!
//! The module answers on a single half-duplex channel where replies to the
//! running command, unsolicited result codes (URCs) and raw socket payloads
//! are interleaved. This module turns that byte stream back into units:
//!
//! ```text
//!   bytes ──► Classifier ──► (kind, len) ──► engine
//!               │
//!               ├─ 1. length-prefixed payload replies (+USORD, +USORF, +URDFILE)
//!               ├─ 2. fixed result codes (OK, ERROR, ABORTED, RING, ...)
//!               ├─ 3. "+..." lines (URCs and information replies)
//!               └─ 4. anything else is held as an "unknown" prefix
//! ```
//!
//! Payload replies are matched by their length field, never by scanning for
//! the closing quote, because the payload may itself contain quotes or line
//! terminators.

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Incremental response classifier
pub mod classifier;

/// Field extraction from classified response lines
pub mod fields;

#[cfg(test)]
mod tests;

pub use classifier::{Classified, Classifier, Match, Scan};

/// Receive buffer size: the largest socket read plus framing headroom.
pub const RX_BUFFER_SIZE: usize = MAX_PAYLOAD + 64;

/// Largest payload moved by a single socket or file read.
pub const MAX_PAYLOAD: usize = 1024;

/// Category of one classified unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Final result `OK`
    Ok,
    /// Final result `ERROR`, `+CME ERROR: ...` or `+CMS ERROR: ...`
    Error,
    /// `@` or `>` prompt asking for a raw payload
    Prompt,
    /// Command aborted by the module, safe to resend
    Aborted,
    /// `CONNECT`
    Connect,
    /// `NO CARRIER`
    NoCarrier,
    /// `NO DIALTONE`
    NoDialtone,
    /// `BUSY`
    Busy,
    /// `NO ANSWER`
    NoAnswer,
    /// `RING`
    Ring,
    /// A `+` line: either an information reply or a URC
    Plus,
    /// Free-form text (identity strings, banners, stray bytes)
    Unknown,
}

impl ResponseKind {
    /// Kinds that end the wait for the running command.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            ResponseKind::Ok | ResponseKind::Error | ResponseKind::Prompt | ResponseKind::Aborted
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ResponseKind {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ResponseKind::Ok => defmt::write!(f, "OK"),
            ResponseKind::Error => defmt::write!(f, "ERR"),
            ResponseKind::Prompt => defmt::write!(f, "PROMPT"),
            ResponseKind::Aborted => defmt::write!(f, "ABORTED"),
            ResponseKind::Connect => defmt::write!(f, "CONNECT"),
            ResponseKind::NoCarrier => defmt::write!(f, "NO CARRIER"),
            ResponseKind::NoDialtone => defmt::write!(f, "NO DIALTONE"),
            ResponseKind::Busy => defmt::write!(f, "BUSY"),
            ResponseKind::NoAnswer => defmt::write!(f, "NO ANSWER"),
            ResponseKind::Ring => defmt::write!(f, "RING"),
            ResponseKind::Plus => defmt::write!(f, "+"),
            ResponseKind::Unknown => defmt::write!(f, "UNK"),
        }
    }
}

/// A classified unit borrowed from the receive buffer.
#[derive(Debug, Clone, Copy)]
pub struct Response<'a> {
    pub kind: ResponseKind,
    pub bytes: &'a [u8],
}

impl<'a> Response<'a> {
    /// The unit with leading and trailing CR/LF removed.
    pub fn line(&self) -> &'a [u8] {
        trim_crlf(self.bytes)
    }

    /// [`line`](Self::line) as text, empty when it is not UTF-8.
    pub fn text(&self) -> &'a str {
        core::str::from_utf8(self.line()).unwrap_or("")
    }

    /// For `+` lines, the text after the marker, e.g. `CREG: 2,1`.
    pub fn plus_body(&self) -> Option<&'a str> {
        if self.kind != ResponseKind::Plus {
            return None;
        }
        self.text().strip_prefix('+')
    }
}

/// Strip CR and LF from both ends.
pub fn trim_crlf(mut bytes: &[u8]) -> &[u8] {
    while let [b'\r' | b'\n', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b'\r' | b'\n'] = bytes {
        bytes = rest;
    }
    bytes
}

/// Renders raw channel bytes for logs, escaping control characters.
#[derive(Clone, Copy)]
pub struct Printable<'a>(pub &'a [u8]);

impl core::fmt::Display for Printable<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for &b in self.0 {
            match b {
                b'\r' => f.write_str("\\r")?,
                b'\n' => f.write_str("\\n")?,
                0x20..=0x7e => core::fmt::Write::write_char(f, b as char)?,
                _ => write!(f, "\\x{:02x}", b)?,
            }
        }
        Ok(())
    }
}

impl core::fmt::Debug for Printable<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "\"{}\"", self)
    }
}
