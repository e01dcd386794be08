//! Accumulation kernels for similarity maps.
//!
//! The matcher adds whole response slabs into a `u8` staging buffer and
//! periodically flushes the staging buffer into an `i16` accumulator. The
//! flush cadence (every `255 / MAX_FEATURE_SIMILARITY` features) guarantees
//! the byte adds can never wrap, so both kernels use plain wrapping adds.
//!
//! With the `simd` feature the byte add runs 16 lanes at a time via the
//! `wide` crate; the scalar fallback is written so the optimizer can
//! auto-vectorize it.

pub(crate) mod scalar;

#[cfg(feature = "simd")]
pub(crate) mod simd;

/// Adds `src` element-wise into `dst`. Both slices must be equally long.
#[inline]
pub(crate) fn accumulate_bytes(dst: &mut [u8], src: &[u8]) {
    #[cfg(feature = "simd")]
    simd::accumulate_bytes(dst, src);

    #[cfg(not(feature = "simd"))]
    scalar::accumulate_bytes(dst, src);
}

/// Adds the staging buffer into the wide accumulator and clears it.
#[inline]
pub(crate) fn flush_staging(acc: &mut [i16], staging: &mut [u8]) {
    scalar::flush_staging(acc, staging);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_is_elementwise_add() {
        let mut dst = vec![1u8; 37];
        let src: Vec<u8> = (0..37).map(|i| (i % 5) as u8).collect();
        accumulate_bytes(&mut dst, &src);
        for (i, &v) in dst.iter().enumerate() {
            assert_eq!(v, 1 + (i % 5) as u8);
        }
    }

    #[test]
    fn flush_adds_and_clears() {
        let mut acc = vec![100i16; 20];
        let mut staging: Vec<u8> = (0..20).map(|i| i as u8).collect();
        flush_staging(&mut acc, &mut staging);
        assert!(staging.iter().all(|&v| v == 0));
        for (i, &v) in acc.iter().enumerate() {
            assert_eq!(v, 100 + i as i16);
        }
    }
}
