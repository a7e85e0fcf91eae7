//! Common error type for transport implementations

/// Errors a [`Transport`](super::Transport) implementation can report.
///
/// Board integrations are free to use their own error type; this one is
/// provided so simple UART wrappers and the [`Pipe`](super::pipe::Pipe) do not
/// have to invent one.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The underlying peripheral is not initialised.
    NotOpen,
    /// The peripheral rejected a write.
    WriteError,
    /// The peripheral reported a framing, parity or overrun error.
    ReadError,
    /// A write accepted zero bytes.
    WriteZero,
    /// The receive buffer overflowed and bytes were dropped.
    Overflow,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::NotOpen => write!(f, "transport not open"),
            Error::WriteError => write!(f, "transport write failed"),
            Error::ReadError => write!(f, "transport read failed"),
            Error::WriteZero => write!(f, "transport accepted no bytes"),
            Error::Overflow => write!(f, "receive buffer overflow"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotOpen => defmt::write!(f, "NotOpen"),
            Error::WriteError => defmt::write!(f, "WriteError"),
            Error::ReadError => defmt::write!(f, "ReadError"),
            Error::WriteZero => defmt::write!(f, "WriteZero"),
            Error::Overflow => defmt::write!(f, "Overflow"),
        }
    }
}
