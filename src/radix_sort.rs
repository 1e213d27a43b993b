// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! LSD radix sort over `u64`, the out-of-scope sort primitive
//! `SplitterSelector`'s singleton-gather pass is specified against.

const RADIX_BITS: u32 = 8;
const BUCKETS: usize = 1 << RADIX_BITS;
const PASSES: u32 = 64 / RADIX_BITS;

/// Sorts `values` ascending in place using an 8-bit-digit, 8-pass LSD
/// radix sort. `O(n)` per pass, no comparisons; safe for the 10^6-10^8
/// element arrays the singleton gather produces.
pub fn radix_sort_u64(values: &mut [u64]) {
    if values.len() < 2 {
        return;
    }
    let mut buffer = vec![0u64; values.len()];
    let mut src = values;
    let mut dst = &mut buffer[..];

    for pass in 0..PASSES {
        let shift = pass * RADIX_BITS;
        let mut counts = [0usize; BUCKETS + 1];
        for &v in src.iter() {
            let digit = ((v >> shift) & (BUCKETS as u64 - 1)) as usize;
            counts[digit + 1] += 1;
        }
        for i in 0..BUCKETS {
            counts[i + 1] += counts[i];
        }
        for &v in src.iter() {
            let digit = ((v >> shift) & (BUCKETS as u64 - 1)) as usize;
            dst[counts[digit]] = v;
            counts[digit] += 1;
        }
        std::mem::swap(&mut src, &mut dst);
    }

    // PASSES is even, so `src` already points at the original `values`
    // slice after the final swap; nothing further to copy back.
    debug_assert!(PASSES % 2 == 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_random_looking_values() {
        let mut values: Vec<u64> = vec![
            18_446_744_073_709_551_615,
            0,
            42,
            1,
            u64::from(u32::MAX),
            9_999_999_999,
            3,
            3,
        ];
        let mut expected = values.clone();
        expected.sort_unstable();
        radix_sort_u64(&mut values);
        assert_eq!(values, expected);
    }

    #[test]
    fn empty_and_singleton_are_noops() {
        let mut empty: Vec<u64> = vec![];
        radix_sort_u64(&mut empty);
        assert!(empty.is_empty());

        let mut single = vec![7u64];
        radix_sort_u64(&mut single);
        assert_eq!(single, vec![7]);
    }

    #[test]
    fn preserves_duplicate_counts() {
        let mut values = vec![5u64, 5, 1, 5, 2, 1];
        radix_sort_u64(&mut values);
        assert_eq!(values, vec![1, 1, 2, 5, 5, 5]);
    }

    #[test]
    fn matches_sort_unstable_on_random_input() {
        use rand::{rng, RngCore};
        let mut rng = rng();
        let mut values: Vec<u64> = (0..5_000).map(|_| rng.next_u64()).collect();
        let mut expected = values.clone();
        expected.sort_unstable();
        radix_sort_u64(&mut values);
        assert_eq!(values, expected);
    }
}
