//! SIMD byte accumulation using the `wide` crate.

use wide::u8x16;

const LANES: usize = 16;

/// Load 16 bytes into a u8x16.
#[inline]
fn load_u8x16(slice: &[u8]) -> u8x16 {
    let mut lanes = [0u8; LANES];
    lanes.copy_from_slice(&slice[..LANES]);
    u8x16::from(lanes)
}

/// Element-wise `dst += src`, 16 lanes at a time with a scalar tail.
pub(crate) fn accumulate_bytes(dst: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dst.len(), src.len());

    let simd_end = dst.len() / LANES * LANES;
    let mut idx = 0;
    while idx < simd_end {
        let sum = load_u8x16(&dst[idx..]) + load_u8x16(&src[idx..]);
        dst[idx..idx + LANES].copy_from_slice(&sum.to_array());
        idx += LANES;
    }

    while idx < dst.len() {
        dst[idx] = dst[idx].wrapping_add(src[idx]);
        idx += 1;
    }
}
