use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::BufferError;

/// One RGB pixel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Pixel {
    pub const BLACK: Pixel = Pixel { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Pixel { r, g, b }
    }

    /// Build a pixel from floating point channels, clamping to [0, 255].
    /// NaN maps to 0.
    pub fn from_f64(r: f64, g: f64, b: f64) -> Self {
        Pixel {
            r: clamp_channel(r),
            g: clamp_channel(g),
            b: clamp_channel(b),
        }
    }

    /// Build a pixel from wide integers, clamping to [0, 255]
    pub fn saturating(r: i32, g: i32, b: i32) -> Self {
        Pixel {
            r: r.clamp(0, 255) as u8,
            g: g.clamp(0, 255) as u8,
            b: b.clamp(0, 255) as u8,
        }
    }

    /// Pack as a P9813 word: marker byte followed by blue, green, red.
    ///
    /// The marker carries the inverted top two bits of each channel so the
    /// chip can validate the word.
    pub fn to_p9813(self) -> [u8; 4] {
        let flag = 0xC0 | ((!self.b >> 6) << 4) | ((!self.g >> 6) << 2) | (!self.r >> 6);
        [flag, self.b, self.g, self.r]
    }
}

fn clamp_channel(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.trunc().clamp(0.0, 255.0) as u8
}

/// Fixed-size pixel storage for every strand, laid out strand after strand
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pixels: Vec<Pixel>,
    strands: usize,
    pixels_per_strand: usize,
    dirty: Option<Range<usize>>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer of `strands * pixels_per_strand` pixels
    pub fn allocate(strands: usize, pixels_per_strand: usize) -> Result<Self, BufferError> {
        let total = strands
            .checked_mul(pixels_per_strand)
            .ok_or(BufferError::Overflow { strands, pixels_per_strand })?;
        if total == 0 {
            return Err(BufferError::Empty { strands, pixels_per_strand });
        }

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(total)
            .map_err(|source| BufferError::Allocation {
                pixels: total,
                bytes: total.saturating_mul(std::mem::size_of::<Pixel>()),
                source,
            })?;
        pixels.resize(total, Pixel::BLACK);

        Ok(PixelBuffer {
            pixels,
            strands,
            pixels_per_strand,
            dirty: None,
        })
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn strands(&self) -> usize {
        self.strands
    }

    pub fn pixels_per_strand(&self) -> usize {
        self.pixels_per_strand
    }

    pub fn get(&self, index: usize) -> Option<Pixel> {
        self.pixels.get(index).copied()
    }

    /// Set one pixel and mark it dirty
    pub fn set(&mut self, index: usize, color: Pixel) -> Result<(), BufferError> {
        let len = self.pixels.len();
        let slot = self
            .pixels
            .get_mut(index)
            .ok_or(BufferError::IndexOutOfRange { index, len })?;
        *slot = color;
        self.touch(index..index + 1);
        Ok(())
    }

    /// Overwrite pixels from `start` with `colors`, stopping at whichever
    /// runs out first. Returns the number written.
    pub fn write_from(&mut self, start: usize, colors: impl IntoIterator<Item = Pixel>) -> usize {
        let Some(tail) = self.pixels.get_mut(start..) else {
            return 0;
        };
        let mut written = 0;
        for (slot, color) in tail.iter_mut().zip(colors) {
            *slot = color;
            written += 1;
        }
        self.touch(start..start + written);
        written
    }

    /// Set every pixel to `color`
    pub fn fill(&mut self, color: Pixel) {
        self.pixels.fill(color);
        self.touch(0..self.pixels.len());
    }

    /// Read-only view handed to device drivers
    pub fn as_slice(&self) -> &[Pixel] {
        &self.pixels
    }

    /// Pixels of a single strand
    pub fn strand(&self, strand: usize) -> Option<&[Pixel]> {
        if strand >= self.strands {
            return None;
        }
        let start = strand * self.pixels_per_strand;
        Some(&self.pixels[start..start + self.pixels_per_strand])
    }

    /// Index range touched since the last successful refresh
    pub fn dirty(&self) -> Option<Range<usize>> {
        self.dirty.clone()
    }

    pub fn mark_clean(&mut self) {
        self.dirty = None;
    }

    fn touch(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        self.dirty = Some(match self.dirty.take() {
            Some(d) => d.start.min(range.start)..d.end.max(range.end),
            None => range,
        });
    }
}
