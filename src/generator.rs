//! Frame generation.
//!
//! Procedural frames are a set of sine waves swept along the strand; each
//! channel uses its own frequency and offset so the colors don't repeat in
//! step. External frames copy client RGB triples straight into the buffer.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::pixel::{Pixel, PixelBuffer};

/// Phase step per frame is `pixels_per_strand / PHASE_DIVISOR`
pub const PHASE_DIVISOR: f64 = 20000.0;

const S1_STEP: f64 = 0.273;
const S2_STEP: f64 = -0.231;
const S3_STEP: f64 = 0.428;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorMode {
    /// Swirling sine pattern; client data only triggers frames
    #[default]
    Procedural,
    /// Client bytes are RGB triples starting at pixel 0
    External,
}

/// Computes the next frame into a borrowed pixel buffer
#[derive(Debug, Clone)]
pub struct FrameGenerator {
    mode: GeneratorMode,
    phase: f64,
    step: f64,
}

impl FrameGenerator {
    pub fn new(mode: GeneratorMode, pixels_per_strand: usize) -> Self {
        Self::with_phase(mode, pixels_per_strand, 0.0)
    }

    pub fn with_phase(mode: GeneratorMode, pixels_per_strand: usize, phase: f64) -> Self {
        FrameGenerator {
            mode,
            phase,
            step: pixels_per_strand as f64 / PHASE_DIVISOR,
        }
    }

    pub fn mode(&self) -> GeneratorMode {
        self.mode
    }

    /// Phase the next frame will be rendered at
    pub fn phase(&self) -> f64 {
        self.phase
    }

    /// Produce one frame from `input` and advance the phase.
    ///
    /// Returns the number of pixels written.
    pub fn generate(&mut self, input: &[u8], buffer: &mut PixelBuffer) -> usize {
        let written = match self.mode {
            GeneratorMode::Procedural => {
                render_procedural(self.phase, buffer);
                buffer.len()
            }
            GeneratorMode::External => apply_external(input, buffer),
        };
        self.phase += self.step;
        written
    }
}

/// Render the sine pattern for phase `x` into every pixel
pub fn render_procedural(x: f64, buffer: &mut PixelBuffer) {
    let mut s1 = x.sin() * 11.0;
    let mut s2 = (x * 0.857 - 0.214).sin() * -13.0;
    let mut s3 = (x * -0.923 + 1.428).sin() * 17.0;

    let colors = std::iter::repeat_with(|| {
        let color = Pixel::from_f64(
            (s1.sin() + 1.0) * 127.5,
            (s2.sin() + 1.0) * 127.5,
            (s3.sin() + 1.0) * 127.5,
        );
        s1 += S1_STEP;
        s2 += S2_STEP;
        s3 += S3_STEP;
        color
    });
    buffer.write_from(0, colors);
}

/// Copy whole RGB triples from `payload` into the buffer.
///
/// A trailing partial triple and anything past the end of the buffer are
/// dropped.
pub fn apply_external(payload: &[u8], buffer: &mut PixelBuffer) -> usize {
    let colors = payload
        .chunks_exact(3)
        .map(|rgb| Pixel::new(rgb[0], rgb[1], rgb[2]));
    buffer.write_from(0, colors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_frame_golden() {
        let mut buffer = PixelBuffer::allocate(1, 25).unwrap();
        let mut generator = FrameGenerator::new(GeneratorMode::Procedural, 25);
        assert_eq!(generator.generate(b"ping", &mut buffer), 25);

        // s1 = sin(0) * 11 = 0, so red starts at (0 + 1) * 127.5 -> 127
        assert_eq!(buffer.get(0), Some(Pixel::new(127, 174, 12)));
        assert_eq!(buffer.get(1), Some(Pixel::new(161, 200, 0)));
        assert_eq!(buffer.get(2), Some(Pixel::new(193, 222, 10)));
        assert_eq!(buffer.dirty(), Some(0..25));
    }

    #[test]
    fn test_phase_advances_per_frame() {
        let mut buffer = PixelBuffer::allocate(1, 25).unwrap();
        let mut generator = FrameGenerator::new(GeneratorMode::Procedural, 25);
        generator.generate(&[], &mut buffer);
        assert!((generator.phase() - 25.0 / 20000.0).abs() < 1e-15);
        generator.generate(&[], &mut buffer);
        assert_eq!(buffer.get(0), Some(Pixel::new(129, 176, 12)));
    }

    #[test]
    fn test_external_writes_triples() {
        let mut buffer = PixelBuffer::allocate(1, 4).unwrap();
        let mut generator = FrameGenerator::new(GeneratorMode::External, 4);
        let written = generator.generate(&[255, 0, 0, 0, 255, 0, 9], &mut buffer);
        assert_eq!(written, 2);
        assert_eq!(buffer.get(0), Some(Pixel::new(255, 0, 0)));
        assert_eq!(buffer.get(1), Some(Pixel::new(0, 255, 0)));
        assert_eq!(buffer.get(2), Some(Pixel::BLACK));
        assert_eq!(buffer.dirty(), Some(0..2));
    }

    #[test]
    fn test_external_empty_and_oversized() {
        let mut buffer = PixelBuffer::allocate(1, 2).unwrap();
        assert_eq!(apply_external(&[], &mut buffer), 0);
        assert_eq!(buffer.dirty(), None);
        assert_eq!(apply_external(&[7; 30], &mut buffer), 2);
        assert_eq!(buffer.get(1), Some(Pixel::new(7, 7, 7)));
    }

    proptest! {
        #[test]
        fn prop_procedural_is_deterministic(
            x0 in -1.0e6f64..1.0e6,
            per in 1usize..200,
            strands in 1usize..4,
        ) {
            let mut a = PixelBuffer::allocate(strands, per).unwrap();
            let mut b = PixelBuffer::allocate(strands, per).unwrap();
            let mut ga = FrameGenerator::with_phase(GeneratorMode::Procedural, per, x0);
            let mut gb = FrameGenerator::with_phase(GeneratorMode::Procedural, per, x0);
            for _ in 0..3 {
                ga.generate(&[], &mut a);
                gb.generate(b"ignored", &mut b);
                prop_assert_eq!(a.as_slice(), b.as_slice());
            }
        }

        #[test]
        fn prop_external_never_panics(
            payload in proptest::collection::vec(any::<u8>(), 0..512),
            len in 1usize..64,
        ) {
            let mut buffer = PixelBuffer::allocate(1, len).unwrap();
            let written = apply_external(&payload, &mut buffer);
            prop_assert_eq!(written, (payload.len() / 3).min(len));
        }
    }
}
