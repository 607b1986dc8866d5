use rand::prelude::*;
use rand::rngs::StdRng;

/// Bytes per binary descriptor (256 bits).
pub const BINARY_DESCRIPTOR_BYTES: usize = 32;

/// Number of comparison bits in a binary descriptor.
pub const BINARY_DESCRIPTOR_BITS: usize = BINARY_DESCRIPTOR_BYTES * 8;

pub type BinaryDescriptor = [u8; BINARY_DESCRIPTOR_BYTES];

/// Number of differing bits.
#[inline]
pub fn hamming_distance(a: &BinaryDescriptor, b: &BinaryDescriptor) -> u32 {
    a.chunks_exact(8)
        .zip(b.chunks_exact(8))
        .map(|(x, y)| {
            let mut xa = [0u8; 8];
            let mut ya = [0u8; 8];
            xa.copy_from_slice(x);
            ya.copy_from_slice(y);
            (u64::from_le_bytes(xa) ^ u64::from_le_bytes(ya)).count_ones()
        })
        .sum()
}

#[inline]
pub(crate) fn set_bit(desc: &mut BinaryDescriptor, bit: usize) {
    desc[bit / 8] |= 1 << (bit % 8);
}

/// Point pair (x1, y1, x2, y2) relative to a keypoint.
pub(crate) type SamplePair = [f32; 4];

/// Deterministic BRIEF-style comparison pairs, isotropic Gaussian around the
/// keypoint (sigma = patch_size / 5), clamped to the patch radius.
pub(crate) fn gaussian_pairs(count: usize, patch_size: usize, seed: u64) -> Vec<SamplePair> {
    let mut rng = StdRng::seed_from_u64(seed);
    let sigma = patch_size as f32 / 5.0;
    let radius = (patch_size / 2) as f32 - 2.0;

    let mut sample = move || -> (f32, f32) {
        loop {
            // Box-Muller
            let u1: f32 = rng.random_range(f32::EPSILON..1.0);
            let u2: f32 = rng.random();
            let mag = sigma * (-2.0 * u1.ln()).sqrt();
            let (s, c) = (std::f32::consts::TAU * u2).sin_cos();
            let (x, y) = (mag * c, mag * s);
            if x * x + y * y <= radius * radius {
                return (x.round(), y.round());
            }
        }
    };

    let mut pairs = Vec::with_capacity(count);
    while pairs.len() < count {
        let (x1, y1) = sample();
        let (x2, y2) = sample();
        if (x1, y1) != (x2, y2) {
            pairs.push([x1, y1, x2, y2]);
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hamming_counts_differing_bits() {
        let a = [0u8; BINARY_DESCRIPTOR_BYTES];
        let mut b = [0u8; BINARY_DESCRIPTOR_BYTES];
        set_bit(&mut b, 0);
        set_bit(&mut b, 77);
        set_bit(&mut b, 255);
        assert_eq!(hamming_distance(&a, &b), 3);
        assert_eq!(hamming_distance(&b, &b), 0);
    }

    #[test]
    fn pairs_are_deterministic_and_inside_patch() {
        let a = gaussian_pairs(256, 31, 3);
        let b = gaussian_pairs(256, 31, 3);
        assert_eq!(a, b);
        for p in &a {
            assert!(p.iter().all(|v| v.abs() <= 13.5), "pair {p:?} outside patch");
        }
    }
}
