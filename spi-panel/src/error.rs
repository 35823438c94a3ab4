//! Error types shared by every layer of the driver.
//!
//! Hardware errors from `embedded-hal` implementations are folded into [Error] through their
//! `kind()`, so a single error type works for any pin or SPI implementation. Use
//! [Error::kind] to classify an error without matching on every variant.

use alloc::{boxed::Box, string::String};
use core::time::Duration;

use embedded_hal::{digital, spi};
use thiserror::Error as ThisError;

use crate::{hw::LineRole, session::PowerState, window::RefreshWindow};

/// Coarse classification of an [Error].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A GPIO line or chip could not be acquired or used.
    Resource,
    /// The SPI device could not be opened, configured or written.
    Io,
    /// A busy-wait exceeded its bound.
    Timeout,
    /// Invalid configuration or caller input, detected before any hardware traffic.
    Config,
    /// The operation is not valid in the panel's current power state.
    State,
}

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
    #[error("timed out after {waited:?} waiting for the panel during {stage}")]
    Timeout {
        /// The operation that triggered the wait, e.g. "refresh".
        stage: &'static str,
        /// How long was spent polling before giving up.
        waited: Duration,
    },
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot {operation} while the panel is {state:?}")]
    State {
        operation: &'static str,
        state: PowerState,
    },
    /// An init table entry failed. The table is not resumed or retried.
    #[error("init table entry {entry} (opcode {opcode:#04x}) failed: {source}")]
    InitEntry {
        /// 1-based position of the failing entry in its table.
        entry: usize,
        opcode: u8,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Returns the classification of this error, looking through init table wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Resource(_) => ErrorKind::Resource,
            Error::Io(_) => ErrorKind::Io,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Config(_) => ErrorKind::Config,
            Error::State { .. } => ErrorKind::State,
            Error::InitEntry { source, .. } => source.kind(),
        }
    }
}

#[derive(Debug, ThisError)]
pub enum ResourceError {
    #[error("{0:?} line was never acquired or has been released")]
    NotAcquired(LineRole),
    #[error("{0:?} line has the wrong direction for this operation")]
    WrongDirection(LineRole),
    #[error("line offset {offset} is configured for more than one role ({role:?})")]
    DuplicateLine { role: LineRole, offset: u32 },
    #[error("cannot open GPIO chip {chip}: {reason}")]
    ChipUnavailable { chip: String, reason: String },
    #[error("cannot acquire {role:?} line at offset {offset}: {reason}")]
    LineUnavailable {
        role: LineRole,
        offset: u32,
        reason: String,
    },
    #[error("{role:?} line failed: {kind:?}")]
    Pin {
        role: LineRole,
        kind: digital::ErrorKind,
    },
}

#[derive(Debug, ThisError)]
pub enum IoError {
    #[error("cannot open SPI device {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("cannot configure SPI device {path}: {reason}")]
    Configure { path: String, reason: String },
    #[error("short SPI write: {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },
    #[error("SPI transport is closed")]
    Closed,
    #[error("SPI write failed: {0:?}")]
    Spi(spi::ErrorKind),
    #[cfg(feature = "linux")]
    #[error("SPI write failed: {0}")]
    Os(String),
}

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("framebuffer of {width}x{height} needs {expected} bytes, got {actual}")]
    FramebufferSize {
        width: u16,
        height: u16,
        expected: usize,
        actual: usize,
    },
    #[error("1-bit framebuffers need a width that is a multiple of 8, got {0}")]
    UnalignedWidth(u16),
    #[error("window {window:?} does not fit a {width}x{height} panel")]
    WindowOutOfBounds {
        window: RefreshWindow,
        width: u16,
        height: u16,
    },
    #[error("window {window:?} covers {pixels} pixels ({expected} bytes), got {actual} bytes")]
    PixelCount {
        window: RefreshWindow,
        pixels: usize,
        expected: usize,
        actual: usize,
    },
    #[error("rectangle {0:?} is empty or extends into negative coordinates")]
    InvalidRectangle(embedded_graphics::primitives::Rectangle),
    #[error("expected a {expected:?} framebuffer, got {actual:?}")]
    EncodingMismatch {
        expected: crate::buffer::PixelEncoding,
        actual: crate::buffer::PixelEncoding,
    },
    #[error("expected a {expected_width}x{expected_height} framebuffer, got {width}x{height}")]
    DimensionMismatch {
        expected_width: u16,
        expected_height: u16,
        width: u16,
        height: u16,
    },
    #[error("init table entry {entry} is malformed: {reason}")]
    MalformedEntry { entry: usize, reason: &'static str },
    #[error("{0} is not supported by this panel model")]
    UnsupportedOperation(&'static str),
}

/// Converts a pin error, tagging it with the role of the line that raised it.
pub(crate) fn pin_error<E: digital::Error>(role: LineRole) -> impl FnOnce(E) -> Error {
    move |e| {
        ResourceError::Pin {
            role,
            kind: e.kind(),
        }
        .into()
    }
}

/// Converts an `embedded-hal` SPI error.
pub(crate) fn spi_error<E: spi::Error>(e: E) -> Error {
    IoError::Spi(e.kind()).into()
}
