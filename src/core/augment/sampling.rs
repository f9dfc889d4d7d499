//! Small random-draw helpers shared by the transforms.

use rand::Rng;

/// Uniform draw from `[lo, hi)`; returns `lo` for an empty range.
pub fn uniform<R: Rng + ?Sized>(rng: &mut R, lo: f32, hi: f32) -> f32 {
    if hi <= lo {
        lo
    } else {
        rng.gen_range(lo..hi)
    }
}

/// Uniform draw from `[-limit, limit)`
pub fn symmetric<R: Rng + ?Sized>(rng: &mut R, limit: f32) -> f32 {
    uniform(rng, -limit, limit)
}

/// Bernoulli trial that tolerates probabilities outside `[0, 1]`.
pub fn chance<R: Rng + ?Sized>(rng: &mut R, probability: f32) -> bool {
    if probability >= 1.0 {
        return true;
    }
    if probability <= 0.0 {
        return false;
    }
    rng.gen::<f32>() < probability
}

/// Standard normal sample (Box-Muller).
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

/// Pick an odd kernel size in `[lo, hi]`, or `None` if the range has none.
pub fn odd_kernel_size<R: Rng + ?Sized>(rng: &mut R, lo: u32, hi: u32) -> Option<u32> {
    let candidates: Vec<u32> = (lo.max(1)..=hi).filter(|k| k % 2 == 1).collect();
    if candidates.is_empty() {
        return None;
    }
    Some(candidates[rng.gen_range(0..candidates.len())])
}
