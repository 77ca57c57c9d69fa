use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::pixel::Pixel;

/// Channel order expected by the LED chips behind a serial output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    #[default]
    Rgb,
    Grb,
    Bgr,
    Rgbw,
    Grbw,
}

impl PixelFormat {
    /// Bytes per pixel on the wire
    pub fn stride(self) -> usize {
        match self {
            PixelFormat::Rgbw | PixelFormat::Grbw => 4,
            _ => 3,
        }
    }

    /// Append `pixels` to `out` in this channel order
    pub fn encode_into(self, pixels: &[Pixel], out: &mut Vec<u8>) {
        out.reserve(pixels.len() * self.stride());
        for &Pixel { r, g, b } in pixels {
            match self {
                PixelFormat::Rgb => out.extend_from_slice(&[r, g, b]),
                PixelFormat::Grb => out.extend_from_slice(&[g, r, b]),
                PixelFormat::Bgr => out.extend_from_slice(&[b, g, r]),
                PixelFormat::Rgbw => {
                    // white is the common floor of all three channels
                    let w = r.min(g).min(b);
                    out.extend_from_slice(&[r - w, g - w, b - w, w]);
                }
                PixelFormat::Grbw => {
                    let w = r.min(g).min(b);
                    out.extend_from_slice(&[g - w, r - w, b - w, w]);
                }
            }
        }
    }

    pub fn encode(self, pixels: &[Pixel]) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(pixels, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Pixel = Pixel::new(255, 0, 0);

    #[test]
    fn test_rgb_passthrough() {
        let pixels = [RED, Pixel::new(0, 255, 0), Pixel::new(0, 0, 255)];
        assert_eq!(
            PixelFormat::Rgb.encode(&pixels),
            vec![255, 0, 0, 0, 255, 0, 0, 0, 255]
        );
    }

    #[test]
    fn test_grb_transform() {
        assert_eq!(PixelFormat::Grb.encode(&[RED]), vec![0, 255, 0]);
    }

    #[test]
    fn test_bgr_transform() {
        assert_eq!(PixelFormat::Bgr.encode(&[RED]), vec![0, 0, 255]);
    }

    #[test]
    fn test_rgbw_transform() {
        let white = Pixel::new(255, 255, 255);
        assert_eq!(PixelFormat::Rgbw.encode(&[white]), vec![0, 0, 0, 255]);

        let pink = Pixel::new(255, 128, 128);
        assert_eq!(PixelFormat::Rgbw.encode(&[pink]), vec![127, 0, 0, 128]);
    }

    #[test]
    fn test_grbw_transform() {
        let white = Pixel::new(255, 255, 255);
        assert_eq!(PixelFormat::Grbw.encode(&[white]), vec![0, 0, 0, 255]);
        assert_eq!(PixelFormat::Grbw.encode(&[RED]), vec![0, 255, 0, 0]);
    }

    #[test]
    fn test_format_names_from_json() {
        let format: PixelFormat = serde_json::from_str("\"GRBW\"").unwrap();
        assert_eq!(format, PixelFormat::Grbw);
        assert_eq!(format.stride(), 4);
    }
}
