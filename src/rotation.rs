//! Option rotation
//!
//! Produces the cyclic permutations of a question's options that are shown to
//! the model. Rotation `k` presents `options[(i + k) mod len]` at slot `i`, so
//! rotation 0 is the canonical order and every option visits every slot once
//! across the full series.

/// Rotate `options` left by `k` positions.
///
/// `k` may be negative or larger than the list; it is reduced with a
/// non-negative modulo first. An empty list rotates to an empty list.
pub fn rotate<T: Clone>(options: &[T], k: i64) -> Vec<T> {
    let len = options.len();
    if len == 0 {
        return Vec::new();
    }
    let shift = k.rem_euclid(len as i64) as usize;
    (0..len).map(|i| options[(i + shift) % len].clone()).collect()
}

/// All rotations of `options`, identity first.
///
/// Returns `(k, rotated)` pairs for `k` in `0..len`.
pub fn rotation_series<T: Clone>(options: &[T]) -> Vec<(usize, Vec<T>)> {
    (0..options.len())
        .map(|k| (k, rotate(options, k as i64)))
        .collect()
}
