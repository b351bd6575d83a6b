//! Errors that cross the scan boundary, and the transient-failure type the
//! network layer folds into "closed" or "empty".

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

/// Fatal scan errors. Everything else is absorbed below this boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("could not resolve target '{target}'")]
    Resolution { target: String },

    #[error("invalid port range {start}-{end} (expected 1 <= start <= end <= 65535)")]
    InvalidRange { start: u32, end: u32 },

    #[error("port set is empty")]
    EmptyPortSet,

    #[error("scan cancelled after {completed} ports")]
    Cancelled { completed: u64 },
}

/// Why a single network operation gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientFailure {
    TimedOut,
    Refused,
    Io(io::ErrorKind),
    Tls,
}

impl From<io::Error> for TransientFailure {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => TransientFailure::Refused,
            io::ErrorKind::TimedOut => TransientFailure::TimedOut,
            kind => TransientFailure::Io(kind),
        }
    }
}

/// Result of one bounded network operation.
///
/// Callers decide what a `Transient` means for them and collapse it with
/// [`ProbeOutcome::unwrap_or`] / [`ProbeOutcome::unwrap_or_else`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome<T> {
    Completed(T),
    Transient(TransientFailure),
}

impl<T> ProbeOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, ProbeOutcome::Completed(_))
    }

    pub fn unwrap_or(self, default: T) -> T {
        match self {
            ProbeOutcome::Completed(v) => v,
            ProbeOutcome::Transient(_) => default,
        }
    }

    pub fn unwrap_or_else(self, f: impl FnOnce(TransientFailure) -> T) -> T {
        match self {
            ProbeOutcome::Completed(v) => v,
            ProbeOutcome::Transient(why) => f(why),
        }
    }

    pub fn unwrap_or_default(self) -> T
    where
        T: Default,
    {
        self.unwrap_or_else(|_| T::default())
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ProbeOutcome<U> {
        match self {
            ProbeOutcome::Completed(v) => ProbeOutcome::Completed(f(v)),
            ProbeOutcome::Transient(why) => ProbeOutcome::Transient(why),
        }
    }
}

impl<T> From<io::Error> for ProbeOutcome<T> {
    fn from(e: io::Error) -> Self {
        ProbeOutcome::Transient(e.into())
    }
}
