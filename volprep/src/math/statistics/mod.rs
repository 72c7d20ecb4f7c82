//! Order statistics and moments over voxel buffers.
//!
//! Order statistics work in place on a scratch buffer (partial sort via
//! quickselect). Moments accumulate in f64.

#[cfg(test)]
mod tests;

/// Mean and population standard deviation (ddof = 0).
///
/// Returns `None` for an empty slice.
pub fn mean_std(values: &[f32]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    Some((mean, variance.sqrt()))
}

/// Median of `data`, averaging the two middle values for even lengths.
///
/// Mutates the input buffer.
pub fn median_f32_mut(data: &mut [f32]) -> f32 {
    debug_assert!(!data.is_empty());
    percentile_f32_mut(data, 50.0)
}

/// `p`-th percentile (0..=100) with linear interpolation between the two
/// nearest ranks, matching numpy's default `percentile`.
///
/// Mutates the input buffer. `data` must be non-empty and NaN-free.
pub fn percentile_f32_mut(data: &mut [f32], p: f64) -> f32 {
    debug_assert!(!data.is_empty());
    debug_assert!((0.0..=100.0).contains(&p));

    let last = data.len() - 1;
    let position = p / 100.0 * last as f64;
    let rank = (position.floor() as usize).min(last);
    let fraction = position - rank as f64;

    let (_, lower, upper_part) = data.select_nth_unstable_by(rank, f32::total_cmp);
    let lower = *lower;
    if fraction <= 0.0 || upper_part.is_empty() {
        return lower;
    }

    let upper = upper_part.iter().copied().fold(f32::INFINITY, f32::min);
    lerp(f64::from(lower), f64::from(upper), fraction) as f32
}

/// Two percentiles of the same data, sharing one scratch copy.
pub fn percentile_pair(values: &[f32], low: f64, high: f64, scratch: &mut Vec<f32>) -> (f32, f32) {
    scratch.clear();
    scratch.extend_from_slice(values);
    let lo = percentile_f32_mut(scratch, low);
    let hi = percentile_f32_mut(scratch, high);
    (lo, hi)
}

/// Linear interpolation in numpy's numerically symmetric form.
#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    let diff = b - a;
    if t >= 0.5 {
        b - diff * (1.0 - t)
    } else {
        a + diff * t
    }
}
