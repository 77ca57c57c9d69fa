use crate::pixel::Pixel;

/// Build a P9813 frame: 32 zero bits, one marked word per pixel, 32 zero bits
pub fn build_p9813_frame(pixels: &[Pixel]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(8 + pixels.len() * 4);
    frame.extend_from_slice(&[0; 4]);
    for pixel in pixels {
        frame.extend_from_slice(&pixel.to_p9813());
    }
    frame.extend_from_slice(&[0; 4]);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let frame = build_p9813_frame(&[Pixel::new(255, 255, 255), Pixel::BLACK]);
        assert_eq!(
            frame,
            vec![0, 0, 0, 0, 0xC0, 255, 255, 255, 0xFF, 0, 0, 0, 0, 0, 0, 0]
        );
    }
}
