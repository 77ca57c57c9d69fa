//! Real-time LED strand server.
//!
//! A TCP client sends messages; each one is acknowledged and produces one
//! frame, generated into a [`pixel::PixelBuffer`] and pushed to a
//! [`device::DeviceDriver`]. The render loop in [`server`] owns the buffer,
//! the driver and the [`stats::Stats`].

pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod generator;
pub mod pixel;
pub mod pixel_format;
pub mod protocol;
pub mod server;
pub mod stats;

pub use config::Config;
pub use device::DeviceDriver;
pub use error::{DeviceError, ServerError};
pub use pixel::{Pixel, PixelBuffer};
pub use server::Server;
pub use stats::Stats;
