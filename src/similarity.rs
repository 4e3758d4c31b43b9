//! Precomputed mapping from patch distance to vote weight.
use crate::DISTANCE_SCALE;

use num_traits::ToPrimitive;
use std::sync::OnceLock;

/// Control values the table interpolates between, sampled at hundredths of
/// the normalized distance.
const BASE: [f64; 11] = [
    1.0, 0.99, 0.96, 0.83, 0.38, 0.11, 0.02, 0.005, 0.0006, 0.0001, 0.0,
];

static SIMILARITY: OnceLock<Vec<f64>> = OnceLock::new();

/// The distance-to-similarity table, built on first use.
///
/// The table has `DISTANCE_SCALE + 1` entries in `[0, 1]`, monotonically
/// non-increasing, so a patch distance indexes its vote weight directly.
/// `similarity()[0]` is `1.0` and the final entry is `0.0`.
#[must_use]
pub fn similarity() -> &'static [f64] {
    SIMILARITY.get_or_init(build_table)
}

fn build_table() -> Vec<f64> {
    let len = u32::from(DISTANCE_SCALE) + 1;
    (0..len)
        .map(|i| {
            let t = f64::from(i) / f64::from(len);
            let scaled = 100.0 * t;
            let j = scaled.floor();
            let frac = scaled - j;
            let idx = j.to_usize().unwrap_or(usize::MAX);
            let vj = BASE.get(idx).copied().unwrap_or(0.0);
            let vk = idx
                .checked_add(1)
                .and_then(|k| BASE.get(k))
                .copied()
                .unwrap_or(0.0);
            vj + frac * (vk - vj)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_length_and_endpoints() {
        let lut = similarity();
        assert_eq!(lut.len(), usize::from(DISTANCE_SCALE) + 1);
        assert_eq!(lut[0], 1.0);
        assert_eq!(lut[usize::from(DISTANCE_SCALE)], 0.0);
    }

    #[test]
    fn test_table_is_monotone_non_increasing() {
        let lut = similarity();
        for pair in lut.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn test_table_values_in_unit_range() {
        let lut = similarity();
        for &v in lut {
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
