//! Device driver capability and its backends.
//!
//! The render loop only sees [`DeviceDriver`]; which backend sits behind it is
//! decided once at startup from [`DeviceConfig`].

mod serial;
mod simulated;

pub use serial::SerialDriver;
pub use simulated::{SimulatedDriver, SimulatedHandle};

use crate::config::{DeviceConfig, DeviceKind};
use crate::error::{describe_code, DeviceError};
use crate::pixel::PixelBuffer;
use crate::stats::Stats;

/// Output channel that pushes a pixel buffer to hardware
pub trait DeviceDriver: Send {
    /// Open the output for the given geometry.
    ///
    /// An error for which [`DeviceError::is_fatal`] is false leaves the device
    /// usable in a degraded mode.
    fn open(&mut self, strands: usize, pixels_per_strand: usize) -> Result<(), DeviceError>;

    /// Push the whole buffer. Must not modify the buffer.
    fn refresh(&mut self, buffer: &PixelBuffer, stats: &mut Stats) -> Result<(), DeviceError>;

    /// Release the output. Safe to call more than once.
    fn close(&mut self);

    fn describe_error(&self, code: i32) -> &'static str {
        describe_code(code)
    }

    /// Short name for log lines
    fn name(&self) -> &str;
}

/// Build the backend selected by configuration
pub fn build_driver(config: &DeviceConfig) -> Box<dyn DeviceDriver> {
    match config.kind {
        DeviceKind::Simulated => Box::new(SimulatedDriver::new(config.history)),
        DeviceKind::Serial => Box::new(SerialDriver::new(config.clone())),
    }
}
