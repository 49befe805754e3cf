//! One-step-ahead receipt projection from monthly history

use std::collections::HashMap;

use crate::aggregate::MonthlyReceipts;

/// Weight of the most recent month when three or more months are known
pub const RECENT_WEIGHT: f64 = 0.7;
/// Weight of the month before it
pub const PRIOR_WEIGHT: f64 = 0.3;

/// Forecast next month's receipts from a chronological series
///
/// * no history: 0
/// * one month: carried forward
/// * two months: the last value compounded once by the observed growth ratio,
///   or the last value as-is when the first month is not positive
/// * three or more: `0.7 * last + 0.3 * second-to-last`
///
/// The result is never negative.
pub fn project_next(series: &[f64]) -> f64 {
    let projection = match series {
        [] => 0.0,
        [only] => *only,
        [first, second] => {
            if *first > 0.0 {
                second * (second / first)
            } else {
                *second
            }
        }
        [.., prior, last] => RECENT_WEIGHT * last + PRIOR_WEIGHT * prior,
    };

    projection.max(0.0)
}

/// Projection for every entity with dated receipts
pub fn project_receipts(receipts: &MonthlyReceipts) -> HashMap<String, f64> {
    receipts
        .iter()
        .map(|(id, months)| {
            let series: Vec<f64> = months.values().copied().collect();
            (id.to_string(), project_next(&series))
        })
        .collect()
}
