/// Build an AWA frame (HyperSerial format).
///
/// Header carries `count - 1`; the trailer holds three Fletcher sums over the
/// pixel bytes.
pub fn build_awa_frame(pixel_data: &[u8], stride: usize) -> Vec<u8> {
    let led_count = (pixel_data.len() / stride).saturating_sub(1);

    let count_hi = (led_count >> 8) as u8;
    let count_lo = led_count as u8;
    let crc = (count_hi ^ count_lo) ^ 0x55;

    let mut frame = Vec::with_capacity(6 + pixel_data.len() + 3);
    frame.extend_from_slice(b"Awa");
    frame.extend_from_slice(&[count_hi, count_lo, crc]);
    frame.extend_from_slice(pixel_data);

    let mut fletcher1: u32 = 0;
    let mut fletcher2: u32 = 0;
    let mut fletcher_ext: u32 = 0;

    for (position, &byte) in pixel_data.iter().enumerate() {
        // position is a 16-bit counter on the receiver
        let position = position as u16 as u32;
        fletcher1 = (fletcher1 + byte as u32) % 255;
        fletcher2 = (fletcher2 + fletcher1) % 255;
        fletcher_ext = (fletcher_ext + (byte as u32 ^ position)) % 255;
    }

    // 'A' would look like the start of a new header
    if fletcher_ext == 0x41 {
        fletcher_ext = 0xaa;
    }

    frame.extend_from_slice(&[fletcher1 as u8, fletcher2 as u8, fletcher_ext as u8]);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_red_pixel() {
        let frame = build_awa_frame(&[255, 0, 0], 3);
        assert_eq!(&frame[..6], &[b'A', b'w', b'a', 0, 0, 0x55]);
        assert_eq!(&frame[6..9], &[255, 0, 0]);
        // 255 % 255 == 0 for every running sum; ext = (255 ^ 0) % 255
        assert_eq!(&frame[9..], &[0, 0, 0]);
    }

    #[test]
    fn test_fletcher_sums() {
        let frame = build_awa_frame(&[1, 2, 3], 3);
        // f1: 1, 3, 6  f2: 1, 4, 10  ext: 1^0=1, 2^1=3 -> 4, 3^2=1 -> 5
        assert_eq!(&frame[9..], &[6, 10, 5]);
    }
}
