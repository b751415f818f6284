// SPDX-License-Identifier: GPL-2.0

//! Error type shared by all falcon operations.

use thiserror::Error;

/// Errors returned by falcon control and bootstrap operations.
///
/// Every variant maps onto the kernel error code the hardware layer traditionally returns, see
/// [`Error::to_errno`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Bad size, alignment, port or index. A caller bug, never retried.
    #[error("invalid argument")]
    InvalidArgument,
    /// The capability is absent on this instance, for the lifetime of the instance.
    #[error("operation not supported")]
    Unsupported,
    /// The hardware did not reach the expected state within its budget.
    #[error("timed out")]
    Timeout,
    /// The hardware reported that it is not in a state to serve the request.
    #[error("hardware not ready")]
    NotReady,
    /// A hardware access did not complete as expected.
    #[error("I/O error")]
    Io,
    /// An external security collaborator reported a failure.
    #[error("security delegate failed with status {0}")]
    DelegateFailure(i32),
    /// No falcon instance is known under the requested identifier.
    #[error("no such device")]
    NoDevice,
    /// A GPU-visible buffer or instance block could not be allocated or mapped.
    #[error("out of memory")]
    NoMemory,
    /// A firmware image could not be found.
    #[error("no such firmware")]
    NoEntry,
}

impl Error {
    /// Returns the negative errno equivalent of this error.
    pub fn to_errno(self) -> i32 {
        match self {
            Error::InvalidArgument => -22,
            Error::Unsupported => -524,
            Error::Timeout => -110,
            Error::NotReady => -11,
            Error::Io => -5,
            Error::DelegateFailure(status) if status < 0 => status,
            Error::DelegateFailure(_) => -5,
            Error::NoDevice => -19,
            Error::NoMemory => -12,
            Error::NoEntry => -2,
        }
    }
}

/// Result type used throughout the crate, defaulting to `()` on success.
pub type Result<T = ()> = core::result::Result<T, Error>;
