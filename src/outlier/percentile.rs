use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Percentile of sorted values by linear interpolation between closest
/// ranks.
///
/// With `h = (n - 1) * p / 100` the result is
/// `x[floor(h)] + (h - floor(h)) * (x[floor(h) + 1] - x[floor(h)])`.
/// Returns `None` for an empty slice, a percentile outside `[0, 100]`, or
/// arithmetic overflow.
pub fn percentile(sorted: &[Decimal], p: Decimal) -> Option<Decimal> {
    if sorted.is_empty() || p < Decimal::ZERO || p > Decimal::ONE_HUNDRED {
        return None;
    }

    let last = sorted.len() - 1;
    let h = Decimal::from(last).checked_mul(p)?.checked_div(Decimal::ONE_HUNDRED)?;
    let lo = h.floor();
    let idx = lo.to_usize()?.min(last);
    let frac = h - lo;

    if idx == last || frac.is_zero() {
        return Some(sorted[idx]);
    }

    let span = sorted[idx + 1].checked_sub(sorted[idx])?;
    sorted[idx].checked_add(frac.checked_mul(span)?)
}

/// Lower and upper cut points for a tail threshold, `p` and `100 - p`.
pub fn tail_bounds(sorted: &[Decimal], threshold: Decimal) -> Option<(Decimal, Decimal)> {
    let lower = percentile(sorted, threshold)?;
    let upper = percentile(sorted, Decimal::ONE_HUNDRED - threshold)?;
    Some((lower, upper))
}
