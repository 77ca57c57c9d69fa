/// Build an Adalight frame: `Ada`, LED count (big endian), checksum, data
pub fn build_adalight_frame(pixel_data: &[u8], stride: usize) -> Vec<u8> {
    let led_count = pixel_data.len() / stride;

    let count_hi = (led_count >> 8) as u8;
    let count_lo = led_count as u8;
    let checksum = count_hi ^ count_lo ^ 0x55;

    let mut frame = Vec::with_capacity(6 + pixel_data.len());
    frame.extend_from_slice(b"Ada");
    frame.extend_from_slice(&[count_hi, count_lo, checksum]);
    frame.extend_from_slice(pixel_data);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header() {
        let frame = build_adalight_frame(&[0u8; 300 * 3], 3);
        // 300 = 0x012C
        assert_eq!(&frame[..6], &[b'A', b'd', b'a', 0x01, 0x2C, 0x01 ^ 0x2C ^ 0x55]);
    }
}
