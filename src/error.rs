//! Stable result taxonomy shared by every component in this crate.
//!
//! Mirrors the C ABI enum the original library exposes across its FFI
//! boundary: callers distinguish failure categories (a full container vs.
//! an invalid argument vs. a resource-limit) rather than matching on a
//! single opaque error. `Success` has no variant here — it is the absence
//! of an `Err`, as is idiomatic for a `Result`-returning Rust API.

use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The stable error taxonomy. Variant order and names are part of the
/// public contract; do not renumber or remove without a major version
/// bump.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A requested length (size, capacity, count) violates a component's
    /// shape requirement, e.g. a non-power-of-two ring capacity.
    #[error("length requirement violated: {reason}")]
    Length { reason: &'static str },

    /// An unspecified failure with no more precise category.
    #[error("unknown failure: {reason}")]
    Unknown { reason: &'static str },

    /// An argument is invalid independent of current state (checked
    /// before any state change).
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: &'static str },

    /// The upstream allocator (or the OS) declined to provide memory.
    #[error("out of memory (requested {requested} bytes)")]
    Memory { requested: u64 },

    /// A fixed-capacity container has no room for another item.
    #[error("container is full")]
    Full,

    /// An operation requiring at least one item found none.
    #[error("container is empty")]
    Empty,

    /// A fixed resource (slot, handle, thread) is exhausted.
    #[error("resource limit reached: {resource}")]
    ResourceLimit { resource: &'static str },

    /// A pointer or handle does not belong to the instance it was
    /// presented to.
    #[error("access violation: {reason}")]
    Access { reason: &'static str },

    /// A lookup found nothing matching the given key.
    #[error("not found")]
    NotFound,

    /// End of an iterable resource was reached.
    #[error("end of stream")]
    Eof,

    /// The operation is in progress asynchronously and has not yet
    /// completed.
    #[error("scheduled, not yet complete")]
    Scheduled,

    /// The operation is not supported by this instance or build
    /// configuration.
    #[error("unsupported operation: {reason}")]
    Unsupported { reason: &'static str },
}

/// Severity used to pick the `tracing` macro fired at construction time.
/// Diagnostic errors (double-release, invalid argument) are worth a
/// warning the moment they're created even if the caller later discards
/// them; resource exhaustion is logged at `error` since it usually means
/// the caller is about to fail an operation the user cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl Error {
    /// Severity bucket for this error, used to decide the logging level
    /// fired when the error is constructed via the `new_*` helpers below.
    pub fn severity(&self) -> Severity {
        match self {
            Error::InvalidArgument { .. } | Error::Full | Error::Empty | Error::NotFound => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }

    pub fn length(reason: &'static str) -> Self {
        let e = Error::Length { reason };
        e.log();
        e
    }

    pub fn invalid_argument(reason: &'static str) -> Self {
        let e = Error::InvalidArgument { reason };
        e.log();
        e
    }

    pub fn out_of_memory(requested: u64) -> Self {
        let e = Error::Memory { requested };
        e.log();
        e
    }

    pub fn full() -> Self {
        let e = Error::Full;
        e.log();
        e
    }

    pub fn empty() -> Self {
        let e = Error::Empty;
        e.log();
        e
    }

    pub fn resource_limit(resource: &'static str) -> Self {
        let e = Error::ResourceLimit { resource };
        e.log();
        e
    }

    pub fn access(reason: &'static str) -> Self {
        let e = Error::Access { reason };
        e.log();
        e
    }

    fn log(&self) {
        match self.severity() {
            Severity::Warning => tracing::warn!(error = %self, "moonsugar operation failed"),
            Severity::Error => tracing::error!(error = %self, "moonsugar operation failed"),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}
