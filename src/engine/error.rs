//! Error taxonomy of the driver

/// Everything a driver operation can fail with.
///
/// The first six variants are the module-facing failure classes; the rest
/// are local precondition failures of the typed API.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// No final result arrived within the command's time budget.
    Timeout,
    /// The module answered `ERROR` (or `+CME`/`+CMS ERROR`), or a reply did
    /// not carry the data the command promised.
    Protocol,
    /// The module answered `ABORTED`; the command can be resent at once.
    Aborted,
    /// No free socket slot, or the module refused to allocate one.
    ResourceExhausted,
    /// The operation was stopped by [`CancelFlag::cancel`](super::CancelFlag::cancel).
    Cancelled,
    /// Power-on or SIM bring-up failed after the full retry-and-reset budget.
    Fatal,
    /// The socket id does not refer to an allocated slot.
    InvalidSocket,
    /// The socket or data session is not connected.
    NotConnected,
    /// The module has not been powered on.
    NotPowered,
    /// The board transport reported an I/O failure.
    Transport,
    /// A command or result did not fit its fixed-size buffer.
    BufferOverflow,
}

/// Tri-state result classification of an operation.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Outcome {
    /// The operation completed.
    Success,
    /// The operation failed but may be retried or re-driven.
    Recoverable,
    /// The module is unusable until the caller intervenes.
    Fatal,
}

impl Error {
    /// Classify this error as recoverable or fatal.
    pub fn outcome(&self) -> Outcome {
        match self {
            Error::Fatal => Outcome::Fatal,
            _ => Outcome::Recoverable,
        }
    }

    /// True for failures a bounded resend may cure.
    ///
    /// Cancellation is not a module failure and never counts as retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout | Error::Protocol | Error::Aborted)
    }
}

impl Outcome {
    /// Classify the result of any driver operation.
    pub fn of<T>(result: &Result<T, Error>) -> Outcome {
        match result {
            Ok(_) => Outcome::Success,
            Err(e) => e.outcome(),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            Error::Timeout => "no final result before the deadline",
            Error::Protocol => "module returned an error",
            Error::Aborted => "command aborted by the module",
            Error::ResourceExhausted => "no socket available",
            Error::Cancelled => "operation cancelled",
            Error::Fatal => "module unusable",
            Error::InvalidSocket => "invalid socket",
            Error::NotConnected => "not connected",
            Error::NotPowered => "module not powered",
            Error::Transport => "transport failure",
            Error::BufferOverflow => "buffer overflow",
        };
        f.write_str(text)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::Protocol => defmt::write!(f, "Protocol"),
            Error::Aborted => defmt::write!(f, "Aborted"),
            Error::ResourceExhausted => defmt::write!(f, "ResourceExhausted"),
            Error::Cancelled => defmt::write!(f, "Cancelled"),
            Error::Fatal => defmt::write!(f, "Fatal"),
            Error::InvalidSocket => defmt::write!(f, "InvalidSocket"),
            Error::NotConnected => defmt::write!(f, "NotConnected"),
            Error::NotPowered => defmt::write!(f, "NotPowered"),
            Error::Transport => defmt::write!(f, "Transport"),
            Error::BufferOverflow => defmt::write!(f, "BufferOverflow"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Outcome {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Outcome::Success => defmt::write!(f, "Success"),
            Outcome::Recoverable => defmt::write!(f, "Recoverable"),
            Outcome::Fatal => defmt::write!(f, "Fatal"),
        }
    }
}
