use num_traits::{AsPrimitive, Bounded, Unsigned};

use crate::volume::Volume;

/// Maps `[0, 1]` floats onto the full range of an unsigned integer type.
///
/// Values are scaled by `max + 1` and truncated, so each integer level covers
/// an equal slice of the unit interval. Exactly 1.0 (and anything above)
/// lands on `max`. Negative values land on 0.
pub fn quantize<T>(volume: &Volume<f32>) -> Volume<T>
where
    T: Bounded + Unsigned + AsPrimitive<f64>,
    f64: AsPrimitive<T>,
{
    let levels: f64 = T::max_value().as_() + 1.0;
    let top = levels - 1.0;
    volume.map::<T, _>(|v| {
        let scaled = f64::from(v) * levels;
        let scaled = if scaled >= levels { top } else { scaled.max(0.0) };
        scaled.as_()
    })
}
