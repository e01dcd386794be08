//! Scalar accumulation kernels.

/// Element-wise `dst += src` over byte slices.
#[cfg_attr(feature = "simd", allow(dead_code))]
pub(crate) fn accumulate_bytes(dst: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = d.wrapping_add(s);
    }
}

/// Drains the staging bytes into the `i16` accumulator.
pub(crate) fn flush_staging(acc: &mut [i16], staging: &mut [u8]) {
    debug_assert_eq!(acc.len(), staging.len());
    for (a, s) in acc.iter_mut().zip(staging.iter_mut()) {
        *a += i16::from(*s);
        *s = 0;
    }
}
