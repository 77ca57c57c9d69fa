//! Serial wire framings for pixel data.

mod adalight;
mod awa;
mod p9813;

pub use adalight::build_adalight_frame;
pub use awa::build_awa_frame;
pub use p9813::build_p9813_frame;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::pixel::Pixel;
use crate::pixel_format::PixelFormat;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WireProtocol {
    #[default]
    Adalight,
    Awa,
    P9813,
}

impl WireProtocol {
    /// Largest pixel count the frame header can carry, if bounded.
    ///
    /// Adalight sends the count in 16 bits; AWA sends `count - 1`.
    pub fn max_pixels(self) -> Option<usize> {
        match self {
            WireProtocol::Adalight => Some(u16::MAX as usize),
            WireProtocol::Awa => Some(u16::MAX as usize + 1),
            WireProtocol::P9813 => None,
        }
    }

    /// Encode a full frame for the wire.
    ///
    /// P9813 has a fixed channel order and ignores `format`.
    pub fn build_frame(self, pixels: &[Pixel], format: PixelFormat) -> Vec<u8> {
        match self {
            WireProtocol::Adalight => build_adalight_frame(&format.encode(pixels), format.stride()),
            WireProtocol::Awa => build_awa_frame(&format.encode(pixels), format.stride()),
            WireProtocol::P9813 => build_p9813_frame(pixels),
        }
    }
}
