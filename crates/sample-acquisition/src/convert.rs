//! Fixed-point to float sample conversion

use ring_buffer::Complex32;

/// Convert interleaved SC16 words (`I, Q, I, Q, ...`) into complex floats.
///
/// Values keep their ADC scale. Converts as many whole pairs as fit in
/// `out` and returns that count; a trailing odd word is ignored.
pub fn convert_sc16(raw: &[i16], out: &mut [Complex32]) -> usize {
    let count = (raw.len() / 2).min(out.len());
    for (sample, pair) in out[..count].iter_mut().zip(raw.chunks_exact(2)) {
        *sample = Complex32::new(f32::from(pair[0]), f32::from(pair[1]));
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_pairs() {
        let raw = [1i16, -2, 300, -400, i16::MIN, i16::MAX];
        let mut out = [Complex32::default(); 3];
        assert_eq!(convert_sc16(&raw, &mut out), 3);
        assert_eq!(out[0], Complex32::new(1.0, -2.0));
        assert_eq!(out[1], Complex32::new(300.0, -400.0));
        assert_eq!(out[2], Complex32::new(-32768.0, 32767.0));
    }

    #[test]
    fn test_bounded_by_output() {
        let raw = [5i16; 10];
        let mut out = [Complex32::default(); 2];
        assert_eq!(convert_sc16(&raw, &mut out), 2);
    }

    #[test]
    fn test_odd_trailing_word_ignored() {
        let raw = [1i16, 2, 3];
        let mut out = [Complex32::default(); 4];
        assert_eq!(convert_sc16(&raw, &mut out), 1);
    }
}
