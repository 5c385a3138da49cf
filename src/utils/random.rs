//! Random sampling utilities.

use rand::prelude::*;

/// Build a generator from an optional seed; `None` draws from entropy.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Draw a vector uniformly in `[-0.5, 0.5)^dim` and scale it to unit
/// Euclidean length (divide by the square root of the sum of squares).
///
/// A draw with zero magnitude has no direction and is redrawn.
pub fn draw_unit_vector<R: Rng + ?Sized>(rng: &mut R, dim: usize) -> Vec<f64> {
    if dim == 0 {
        return Vec::new();
    }
    loop {
        let mut v: Vec<f64> = (0..dim).map(|_| rng.gen_range(-0.5..0.5)).collect();
        let magnitude = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if magnitude > 0.0 && magnitude.is_finite() {
            v.iter_mut().for_each(|x| *x /= magnitude);
            return v;
        }
    }
}
