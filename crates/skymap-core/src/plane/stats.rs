use std::cmp::Ordering;

use num_traits::Float;

/// Value at quantile `fraction` (0..=1) of `values`, reordering them in place.
pub fn select<T: Float>(values: &mut [T], fraction: f64) -> Option<T> {
    if values.is_empty() {
        return None;
    }
    let k = ((values.len() - 1) as f64 * fraction.clamp(0.0, 1.0)).round() as usize;
    let (_, v, _) = values.select_nth_unstable_by(k, |a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    Some(*v)
}

pub fn median<T: Float>(values: &mut [T]) -> Option<T> {
    select(values, 0.5)
}

/// Weighted median of `(value, weight)` pairs, sorting them in place.
pub fn weighted_median<T: Float>(points: &mut [(T, T)]) -> Option<T> {
    if points.is_empty() {
        return None;
    }
    points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let total = points.iter().fold(T::zero(), |acc, p| acc + p.1);
    if total <= T::zero() {
        return None;
    }
    let half = total / (T::one() + T::one());

    let mut cumulative = T::zero();
    for p in points.iter() {
        cumulative = cumulative + p.1;
        if cumulative >= half {
            return Some(p.0);
        }
    }
    points.last().map(|p| p.0)
}
