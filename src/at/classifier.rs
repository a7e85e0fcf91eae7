//! Incremental response classifier
//!
//! [`classify`] is a pure function of the bytes buffered so far. It either
//! recognises exactly one unit at the front of the buffer or answers
//! [`Scan::Wait`]. Because a decision is only made once the deciding bytes are
//! present, feeding a stream one byte at a time yields the same units as
//! feeding it in one piece.

use heapless::Vec;

use super::ResponseKind;
use crate::transport::Transport;

/// Outcome of matching one pattern against the buffered bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// More bytes are needed to decide.
    Wait,
    /// The bytes seen so far rule this pattern out.
    NotFound,
    /// The pattern matched this many bytes.
    Len(usize),
}

/// One recognised unit at the front of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified {
    pub kind: ResponseKind,
    pub len: usize,
}

/// Outcome of one classification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// Nothing can be decided until more bytes arrive.
    Wait,
    /// A unit is ready.
    Unit(Classified),
}

/// Element of a length-aware reply pattern.
#[derive(Debug, Clone, Copy)]
enum Token {
    /// Exact bytes
    Lit(&'static [u8]),
    /// Decimal number; remembered as the length of a following payload
    Num,
    /// Double quoted string without escapes
    Quoted,
    /// Raw bytes, as many as the last number said
    Payload,
}

use Token::{Lit, Num, Payload, Quoted};

/// Replies that carry raw bytes, most specific first.
const PAYLOAD_REPLIES: &[&[Token]] = &[
    // +USORD: <socket>,<length>,"<data>"
    &[Lit(b"\r\n+USORD: "), Num, Lit(b","), Num, Lit(b",\""), Payload, Lit(b"\"")],
    // +USORF with a doubled line start, as sent by some LTE firmware
    &[
        Lit(b"\r\n\r\n+USORF: "), Num, Lit(b",\""), Num, Lit(b"."), Num, Lit(b"."), Num,
        Lit(b"."), Num, Lit(b"\","), Num, Lit(b","), Num, Lit(b",\""), Payload, Lit(b"\"\r\n"),
    ],
    // +USORF: <socket>,"<ip>",<port>,<length>,"<data>"
    &[
        Lit(b"\r\n+USORF: "), Num, Lit(b",\""), Num, Lit(b"."), Num, Lit(b"."), Num, Lit(b"."),
        Num, Lit(b"\","), Num, Lit(b","), Num, Lit(b",\""), Payload, Lit(b"\"\r\n"),
    ],
    &[
        Lit(b"\r\n+USORF: "), Num, Lit(b",\""), Num, Lit(b"."), Num, Lit(b"."), Num, Lit(b"."),
        Num, Lit(b"\","), Num, Lit(b","), Num, Lit(b",\""), Payload, Lit(b"\""),
    ],
    // +URDFILE: "<name>",<length>,"<data>"
    &[Lit(b"\r\n+URDFILE: "), Quoted, Lit(b","), Num, Lit(b",\""), Payload, Lit(b"\"")],
];

/// What a fixed pattern produces when it matches.
#[derive(Debug, Clone, Copy)]
enum Action {
    Unit(ResponseKind),
    /// Consume this many leading bytes as filler.
    Discard(usize),
}

#[derive(Debug, Clone, Copy)]
struct Delimited {
    start: &'static [u8],
    end: Option<&'static [u8]>,
    action: Action,
}

const fn unit(start: &'static [u8], end: Option<&'static [u8]>, kind: ResponseKind) -> Delimited {
    Delimited {
        start,
        end,
        action: Action::Unit(kind),
    }
}

/// Result codes and line shapes, tried in order after the payload replies.
const DELIMITED: &[Delimited] = &[
    unit(b"\r\n\r\r\nOK\r\n", None, ResponseKind::Ok),
    unit(b"\r\nOK\r\n", None, ResponseKind::Ok),
    // trailing OK left behind by a +USORF reply that already took its CR LF
    unit(b"OK\r\n", None, ResponseKind::Ok),
    unit(b"\r\nERROR\r\n", None, ResponseKind::Error),
    unit(b"\r\n+CME ERROR:", Some(b"\r\n"), ResponseKind::Error),
    unit(b"\r\n+CMS ERROR:", Some(b"\r\n"), ResponseKind::Error),
    unit(b"\r\nRING\r\n", None, ResponseKind::Ring),
    unit(b"\r\nCONNECT\r\n", None, ResponseKind::Connect),
    unit(b"\r\nNO CARRIER\r\n", None, ResponseKind::NoCarrier),
    unit(b"\r\nNO DIALTONE\r\n", None, ResponseKind::NoDialtone),
    unit(b"\r\nBUSY\r\n", None, ResponseKind::Busy),
    unit(b"\r\nNO ANSWER\r\n", None, ResponseKind::NoAnswer),
    Delimited {
        start: b"\r\r\n\r\r\n+USORF:",
        end: None,
        action: Action::Discard(4),
    },
    unit(b"\r\n+", Some(b"\r\n"), ResponseKind::Plus),
    unit(b"\r\n@", None, ResponseKind::Prompt),
    unit(b"\r\n>", None, ResponseKind::Prompt),
    unit(b"\n>", None, ResponseKind::Prompt),
    unit(b"\r\nABORTED\r\n", None, ResponseKind::Aborted),
    Delimited {
        start: b"\r\n\r\n",
        end: None,
        action: Action::Discard(2),
    },
    unit(b"\r\n", Some(b"\r\n"), ResponseKind::Unknown),
];

/// Match `start`, then at least one byte, then `end`.
pub fn match_delimited(data: &[u8], start: &[u8], end: Option<&[u8]>) -> Match {
    let mut o = 0;
    for &s in start {
        match data.get(o) {
            None => return Match::Wait,
            Some(&b) if b != s => return Match::NotFound,
            Some(_) => o += 1,
        }
    }
    let Some(end) = end else {
        return Match::Len(o);
    };
    if o >= data.len() {
        return Match::Wait;
    }
    o += 1;
    let mut x = 0;
    while x < end.len() {
        let Some(&ch) = data.get(o) else {
            return Match::Wait;
        };
        o += 1;
        x = if end[x] == ch {
            x + 1
        } else if end[0] == ch {
            1
        } else {
            0
        };
    }
    Match::Len(o)
}

/// Match a payload reply. `limit` bounds the unit length; a length field
/// that cannot fit is treated as a mismatch so a corrupt header cannot stall
/// the channel.
fn match_tokens(data: &[u8], tokens: &[Token], limit: usize) -> Match {
    let mut o = 0;
    let mut num = 0usize;
    for token in tokens {
        match *token {
            Lit(lit) => {
                for &l in lit {
                    match data.get(o) {
                        None => return Match::Wait,
                        Some(&b) if b != l => return Match::NotFound,
                        Some(_) => o += 1,
                    }
                }
            }
            Num => {
                let first = o;
                num = 0;
                loop {
                    match data.get(o) {
                        None => return Match::Wait,
                        Some(&b) if b.is_ascii_digit() => {
                            num = num.saturating_mul(10).saturating_add((b - b'0') as usize);
                            o += 1;
                        }
                        Some(_) => break,
                    }
                }
                if o == first {
                    return Match::NotFound;
                }
            }
            Quoted => {
                match data.get(o) {
                    None => return Match::Wait,
                    Some(&b'"') => o += 1,
                    Some(_) => return Match::NotFound,
                }
                loop {
                    match data.get(o) {
                        None => return Match::Wait,
                        Some(&b'"') => {
                            o += 1;
                            break;
                        }
                        Some(_) => o += 1,
                    }
                }
            }
            Payload => {
                if o.saturating_add(num) >= limit {
                    return Match::NotFound;
                }
                if data.len() < o + num {
                    return Match::Wait;
                }
                o += num;
            }
        }
    }
    Match::Len(o)
}

/// Recognise the unit at the front of `data`.
///
/// `full` tells the classifier that no more bytes can be buffered, in which
/// case patterns still waiting for input are given up on so the channel keeps
/// moving. `limit` is the buffer capacity.
pub fn classify(data: &[u8], full: bool, limit: usize) -> Scan {
    let mut unknown = 0;
    while unknown < data.len() {
        let rest = &data[unknown..];

        for tokens in PAYLOAD_REPLIES {
            match match_tokens(rest, tokens, limit) {
                Match::Wait if !full => return Scan::Wait,
                Match::NotFound => {}
                _ if unknown > 0 => return found(ResponseKind::Unknown, unknown),
                Match::Len(len) => return found(ResponseKind::Plus, len),
                Match::Wait => {}
            }
        }

        for pattern in DELIMITED {
            let m = match_delimited(rest, pattern.start, pattern.end);
            match (m, pattern.action) {
                (Match::Wait, _) if !full => return Scan::Wait,
                (Match::NotFound, _) => {}
                (Match::Len(_), Action::Discard(n)) if unknown == 0 => {
                    return found(ResponseKind::Unknown, n);
                }
                _ if unknown > 0 => return found(ResponseKind::Unknown, unknown),
                (Match::Len(len), Action::Unit(kind)) => return found(kind, len),
                _ => {}
            }
        }

        unknown += 1;
    }
    if full && unknown > 0 {
        return found(ResponseKind::Unknown, unknown);
    }
    Scan::Wait
}

fn found(kind: ResponseKind, len: usize) -> Scan {
    Scan::Unit(Classified { kind, len })
}

/// Receive buffer plus classification state.
#[derive(Debug)]
pub struct Classifier<const N: usize> {
    buf: Vec<u8, N>,
}

impl<const N: usize> Default for Classifier<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Classifier<N> {
    /// Create an empty classifier.
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append bytes, returning how many fitted.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(N - self.buf.len());
        // cannot fail: n is bounded by the spare capacity
        let _ = self.buf.extend_from_slice(&bytes[..n]);
        n
    }

    /// Pull whatever the transport has buffered into spare capacity.
    pub fn fill<T: Transport>(&mut self, transport: &mut T) -> Result<usize, T::Error> {
        let old = self.buf.len();
        if old == N || transport.bytes_available() == 0 {
            return Ok(0);
        }
        if self.buf.resize(N, 0).is_err() {
            return Ok(0);
        }
        let read = transport.read(&mut self.buf[old..]);
        let n = *read.as_ref().unwrap_or(&0);
        self.buf.truncate(old + n);
        read
    }

    /// Classify the unit at the front of the buffer.
    pub fn scan(&self) -> Scan {
        classify(&self.buf, self.buf.len() == N, N)
    }

    /// Bytes of a unit returned by [`scan`](Self::scan).
    pub fn bytes(&self, unit: &Classified) -> &[u8] {
        &self.buf[..unit.len.min(self.buf.len())]
    }

    /// Drop the first `len` bytes.
    pub fn consume(&mut self, len: usize) {
        let len = len.min(self.buf.len());
        let remaining = self.buf.len() - len;
        self.buf.copy_within(len.., 0);
        self.buf.truncate(remaining);
    }

    /// Bytes held but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Forget everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
