//! Error types for the frame pipeline.
//!
//! Startup failures (`ServerError`) end the process with exit code 1.
//! Device errors carry a numeric code so they can be recorded in [`Stats`]
//! and described later; only some kinds are fatal at open time.
//!
//! [`Stats`]: crate::stats::Stats

use std::collections::TryReserveError;
use std::fmt;
use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("pixel configuration has no pixels ({strands} strands x {pixels_per_strand} pixels)")]
    Empty { strands: usize, pixels_per_strand: usize },

    #[error("pixel count overflows ({strands} strands x {pixels_per_strand} pixels)")]
    Overflow { strands: usize, pixels_per_strand: usize },

    #[error("could not allocate space for {pixels} pixels ({bytes} bytes)")]
    Allocation {
        pixels: usize,
        bytes: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("pixel index {index} out of range (buffer holds {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Device error classes with stable numeric codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceErrorKind {
    Allocation,
    Open,
    Write,
    Mode,
    BaudRate,
    NotOpen,
    Length,
}

impl DeviceErrorKind {
    pub const ALL: [DeviceErrorKind; 7] = [
        DeviceErrorKind::Allocation,
        DeviceErrorKind::Open,
        DeviceErrorKind::Write,
        DeviceErrorKind::Mode,
        DeviceErrorKind::BaudRate,
        DeviceErrorKind::NotOpen,
        DeviceErrorKind::Length,
    ];

    pub fn code(self) -> i32 {
        match self {
            DeviceErrorKind::Allocation => 1,
            DeviceErrorKind::Open => 2,
            DeviceErrorKind::Write => 3,
            DeviceErrorKind::Mode => 4,
            DeviceErrorKind::BaudRate => 5,
            DeviceErrorKind::NotOpen => 6,
            DeviceErrorKind::Length => 7,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Baud rate problems degrade timing but leave the device usable
    pub fn is_fatal(self) -> bool {
        !matches!(self, DeviceErrorKind::BaudRate)
    }

    pub fn describe(self) -> &'static str {
        match self {
            DeviceErrorKind::Allocation => "could not allocate device buffers",
            DeviceErrorKind::Open => "could not open output device",
            DeviceErrorKind::Write => "device write failed",
            DeviceErrorKind::Mode => "could not configure device mode",
            DeviceErrorKind::BaudRate => "requested baud rate not supported, timing may drift",
            DeviceErrorKind::NotOpen => "device is not open",
            DeviceErrorKind::Length => "pixel buffer does not match device geometry",
        }
    }
}

impl fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Text for a raw device error code
pub fn describe_code(code: i32) -> &'static str {
    DeviceErrorKind::from_code(code)
        .map(DeviceErrorKind::describe)
        .unwrap_or("unknown device error")
}

#[derive(Error, Debug)]
#[error("{kind} (code {}): {detail}", .kind.code())]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub detail: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, detail: impl Into<String>) -> Self {
        DeviceError {
            kind,
            detail: detail.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: DeviceErrorKind,
        detail: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DeviceError {
            kind,
            detail: detail.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid pixel configuration: {strands} strands x {pixels_per_strand} pixels")]
    NoPixels { strands: usize, pixels_per_strand: usize },

    #[error("read timeout must be greater than zero")]
    ZeroReadTimeout,

    #[error("serial device requires a port path")]
    MissingSerialPort,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("fatal device error")]
    Device(#[from] DeviceError),

    #[error("failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("listener error")]
    Io(#[from] io::Error),
}
